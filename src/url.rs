//! Broker URL scheme: `scheme://[id@]host[:port][/path]`.
//!
//! The optional `id` is a lowercase-hex actor id; when absent the
//! broker draws a random one. The path roots file journals; host and
//! port address remote endpoints.

use crate::error::{Error, Result};
use crate::types::{parse_id, Id, RESERVED_ID};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerUrl {
    /// The URL as given.
    pub url: String,
    pub scheme: String,
    /// Actor id from the `id@` field; `0` when absent.
    pub id: Id,
    pub host: String,
    /// `0` when absent.
    pub port: u16,
    /// Includes the leading `/`; empty when absent.
    pub path: String,
}

impl BrokerUrl {
    pub fn parse(url: &str) -> Result<BrokerUrl> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
        if scheme.is_empty() {
            return Err(Error::InvalidUrl(url.to_string()));
        }

        let (id, rest) = match rest.split_once('@') {
            Some((id_text, tail)) if !id_text.contains('/') => {
                let id = parse_id(id_text).map_err(|_| Error::InvalidUrl(url.to_string()))?;
                (id, tail)
            }
            _ => (RESERVED_ID, rest),
        };

        let (hostport, path) = match rest.find('/') {
            Some(at) => (&rest[..at], &rest[at..]),
            None => (rest, ""),
        };

        let (host, port) = match hostport.split_once(':') {
            Some((host, port_text)) => {
                let port = port_text
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidUrl(url.to_string()))?;
                (host, port)
            }
            None => (hostport, 0),
        };

        Ok(BrokerUrl {
            url: url.to_string(),
            scheme: scheme.to_string(),
            id,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// A URL is addressable when it names an actor or a host.
    pub fn valid(&self) -> bool {
        !self.url.is_empty()
            && !self.scheme.is_empty()
            && (self.id != RESERVED_ID || !self.host.is_empty())
    }

    /// The `host:port` pair for socket addressing.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The `tcp://` URL a peer can call this broker back on.
    pub fn endpoint(&self) -> String {
        if self.id != RESERVED_ID {
            format!("tcp://{:x}@{}:{}", self.id, self.host, self.port)
        } else {
            format!("tcp://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for BrokerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl FromStr for BrokerUrl {
    type Err = Error;

    fn from_str(text: &str) -> Result<BrokerUrl> {
        BrokerUrl::parse(text)
    }
}

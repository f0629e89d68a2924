//! Remote broker proxy: the client half of the transport.
//!
//! Implements the full broker operation set by exchanging one frame
//! pair per call against a served endpoint. Transport failures never
//! escape as errors; each operation degrades to its sentinel (invalid
//! clock, `false`, empty list), leaving retry decisions to the caller.

use crate::broker::{Broker, BrokerWeak, Connection, IdClockMap, SourcesMap};
use crate::clock::Clock;
use crate::entry::{Data, Entry};
use crate::error::Result;
use crate::types::{Id, Source, INVALID_SOURCE};
use crate::url::BrokerUrl;
use std::collections::BTreeSet;
use std::net::TcpStream;
use std::sync::Arc;
use tracing::debug;

use super::message::{read_frame, write_frame, Request, Response};

pub struct RemoteBroker {
    url: BrokerUrl,
    this: BrokerWeak,
}

impl RemoteBroker {
    pub fn open(url: &BrokerUrl) -> Arc<RemoteBroker> {
        let url = url.clone();
        Arc::new_cyclic(|weak| {
            let weak: std::sync::Weak<RemoteBroker> = weak.clone();
            let this: BrokerWeak = weak;
            RemoteBroker { url, this }
        })
    }

    fn call(&self, request: &Request) -> Result<Response> {
        let mut stream = TcpStream::connect(self.url.authority())?;
        write_frame(&mut stream, request)?;
        read_frame(&mut stream)
    }

    /// The `tcp://` URL a peer should use to call the sender back.
    fn callback_url(conn: &Connection) -> String {
        let caller = conn.peer.as_ref().map(|peer| peer.url()).unwrap_or_default();
        match BrokerUrl::parse(&caller) {
            Ok(parsed) => parsed.endpoint(),
            Err(_) => caller,
        }
    }
}

impl Broker for RemoteBroker {
    fn id(&self) -> Id {
        self.url.id
    }

    fn url(&self) -> String {
        self.url.url.clone()
    }

    fn scheme(&self) -> &'static str {
        "tcp"
    }

    fn clock(&self) -> Clock {
        match self.call(&Request::GetClock) {
            Ok(Response::Clock { clock }) => clock,
            _ => Clock::invalid(),
        }
    }

    fn connect(&self, conn: Connection) -> Connection {
        let request = Request::Connect {
            source: conn.source,
            clock: conn.clock.clone(),
            provides: conn.provides.clone(),
            url: Self::callback_url(&conn),
        };
        match self.call(&request) {
            Ok(Response::Connect { source, clock, provides }) if source != INVALID_SOURCE => {
                Connection { peer: self.this.upgrade(), source, clock, provides }
            }
            other => {
                debug!(url = %self.url, ok = other.is_ok(), "connect failed");
                Connection::invalid()
            }
        }
    }

    fn refresh(&self, data: &Connection, sender: Source) -> bool {
        let request = Request::Refresh {
            sender,
            source: data.source,
            clock: data.clock.clone(),
            provides: data.provides.clone(),
        };
        matches!(self.call(&request), Ok(Response::Refresh { ok: true }))
    }

    fn insert(&self, entry: &Entry, sender: Source) -> Clock {
        match self.call(&Request::Insert { sender, entry: entry.clone() }) {
            Ok(Response::Clock { clock }) => clock,
            _ => Clock::invalid(),
        }
    }

    fn query(&self, from: &Clock, sender: Source) -> Vec<Entry> {
        match self.call(&Request::Query { sender, clock: from.clone() }) {
            Ok(Response::Query { entries }) => entries,
            _ => Vec::new(),
        }
    }

    fn relay(&self, data: Data, sender: Source) -> Clock {
        match self.call(&Request::Relay { sender, data }) {
            Ok(Response::Clock { clock }) => clock,
            _ => Clock::invalid(),
        }
    }

    /// Teardown is local to each side; there is no remote disconnect.
    fn disconnect(&self, _source: Source) -> Source {
        INVALID_SOURCE
    }

    fn sources(&self, ignore: Source) -> SourcesMap {
        match self.call(&Request::Sources { sender: ignore }) {
            Ok(Response::Sources { sources }) => sources,
            _ => SourcesMap::new(),
        }
    }

    fn versions(&self) -> IdClockMap {
        let mut out = IdClockMap::new();
        for (_, infos) in self.sources(crate::types::SELF_SOURCE) {
            for (id, info) in infos {
                let known = out.entry(id).or_default();
                *known = known.merge(&info.clock);
            }
        }
        out
    }

    fn connected_sources(&self) -> BTreeSet<Source> {
        BTreeSet::new()
    }
}

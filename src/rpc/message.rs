//! Wire messages and framing for the broker transport.
//!
//! Every broker operation maps to one unary request/response pair. A
//! frame is a 4-byte little-endian length followed by the postcard
//! encoding of one message; frames above `MESSAGE_SIZE_LIMIT` are
//! refused before any decode work.

use crate::broker::{IdInfoMap, SourcesMap};
use crate::clock::Clock;
use crate::entry::{Data, Entry};
use crate::error::{Error, Result};
use crate::types::Source;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Outer bound on any single frame (2 MiB).
pub const MESSAGE_SIZE_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Peer-side connect. `url` names where the caller can be reached
    /// so the acceptor can build the reverse proxy.
    Connect { source: Source, clock: Clock, provides: IdInfoMap, url: String },
    Query { sender: Source, clock: Clock },
    Insert { sender: Source, entry: Entry },
    Refresh { sender: Source, source: Source, clock: Clock, provides: IdInfoMap },
    Relay { sender: Source, data: Data },
    GetClock,
    Sources { sender: Source },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Connect { source: Source, clock: Clock, provides: IdInfoMap },
    Query { entries: Vec<Entry> },
    Clock { clock: Clock },
    Refresh { ok: bool },
    Sources { sources: SourcesMap },
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let bytes = postcard::to_allocvec(message).map_err(|e| Error::Transport(e.to_string()))?;
    if bytes.len() > MESSAGE_SIZE_LIMIT {
        return Err(Error::Transport(format!("frame too large: {} bytes", bytes.len())));
    }
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MESSAGE_SIZE_LIMIT {
        return Err(Error::Transport(format!("frame too large: {len} bytes")));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    postcard::from_bytes(&buf).map_err(|e| Error::Transport(e.to_string()))
}

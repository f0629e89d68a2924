//! Connection records and the provides math that drives routing.
//!
//! A broker advertises the ids it can reach as a map of
//! `id -> ConnectionInfo`; distance zero means the id lives on the
//! advertising node and each forwarding hop adds one. `update_provides`
//! flattens a whole sources table into the single map a peer receives.

use crate::clock::Clock;
use crate::types::{Id, Source, INVALID_SOURCE, SELF_SOURCE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use super::Broker;

/// Reachability of one id through one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Hops to the owning node; zero on the owner itself.
    pub distance: i16,
    /// Freshest clock seen for the id along this path.
    pub clock: Clock,
}

impl ConnectionInfo {
    pub fn new(distance: i16, clock: Clock) -> Self {
        Self { distance, clock }
    }
}

/// Reachable ids with distances and freshest clocks.
pub type IdInfoMap = BTreeMap<Id, ConnectionInfo>;

/// A broker's self-view: local source slot to the ids behind it.
pub type SourcesMap = BTreeMap<Source, IdInfoMap>;

/// Freshest clock per id, folded over every slot.
pub type IdClockMap = BTreeMap<Id, Clock>;

/// One end of a broker-to-broker edge, as exchanged by `connect` and
/// `refresh`. `source` is the slot the *other* side assigned to the
/// sender, so each side can address the right slot on callbacks.
#[derive(Clone, Default)]
pub struct Connection {
    pub peer: Option<Arc<dyn Broker>>,
    pub source: Source,
    pub clock: Clock,
    pub provides: IdInfoMap,
}

impl Connection {
    /// An initiator-side connection to `peer` (source zero selects the
    /// initiator mode of `Broker::connect`).
    pub fn new(peer: Arc<dyn Broker>) -> Self {
        Self { peer: Some(peer), source: SELF_SOURCE, clock: Clock::new(), provides: IdInfoMap::new() }
    }

    /// The sentinel returned when a connect cannot proceed.
    pub fn invalid() -> Self {
        Self { peer: None, source: INVALID_SOURCE, clock: Clock::invalid(), provides: IdInfoMap::new() }
    }

    pub fn valid(&self) -> bool {
        self.peer.is_some() && self.source != INVALID_SOURCE
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.peer.as_ref().map(|p| p.url()))
            .field("source", &self.source)
            .field("clock", &self.clock.to_string())
            .field("provides", &format_id_info(&self.provides))
            .finish()
    }
}

/// Flattens a sources table into one advertisement: every distance
/// grows by one for the hop through this node, and when two slots offer
/// the same id the smaller distance wins, first slot on a tie.
pub fn update_provides(sources: SourcesMap) -> IdInfoMap {
    let mut out = IdInfoMap::new();
    for (_, infos) in sources {
        for (id, mut info) in infos {
            info.distance += 1;
            match out.get(&id) {
                Some(known) if known.distance <= info.distance => {}
                _ => {
                    out.insert(id, info);
                }
            }
        }
    }
    out
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Info{{ .distance = {}, .clock = {} }}", self.distance, self.clock)
    }
}

pub fn format_id_info(infos: &IdInfoMap) -> String {
    let mut out = String::from("{");
    for (i, (id, info)) in infos.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{{{id:x}, {info}}}");
    }
    out.push('}');
    out
}

pub fn format_sources(sources: &SourcesMap) -> String {
    let mut out = String::from("Sources{");
    for (i, (source, infos)) in sources.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{{{source}, {}}}", format_id_info(infos));
    }
    out.push('}');
    out
}

pub fn format_versions(versions: &IdClockMap) -> String {
    let mut out = String::from("Versions{");
    for (i, (id, clock)) in versions.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{{{id:x}, {clock}}}");
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_provides_increments_distances() {
        let mut sources = SourcesMap::new();
        sources.insert(
            0,
            IdInfoMap::from([(0xAA, ConnectionInfo::new(0, Clock::from([(0xAA, 1)])))]),
        );
        sources.insert(
            1,
            IdInfoMap::from([(0xBB, ConnectionInfo::new(1, Clock::new()))]),
        );

        let flat = update_provides(sources);
        assert_eq!(flat[&0xAA].distance, 1);
        assert_eq!(flat[&0xBB].distance, 2);
    }

    #[test]
    fn update_provides_prefers_the_nearest_offer() {
        let mut sources = SourcesMap::new();
        sources.insert(1, IdInfoMap::from([(0xAA, ConnectionInfo::new(3, Clock::new()))]));
        sources.insert(2, IdInfoMap::from([(0xAA, ConnectionInfo::new(1, Clock::new()))]));

        let flat = update_provides(sources);
        assert_eq!(flat[&0xAA].distance, 2);
    }

    #[test]
    fn update_provides_keeps_the_first_slot_on_ties() {
        let near = Clock::from([(0xAA, 5)]);
        let mut sources = SourcesMap::new();
        sources.insert(1, IdInfoMap::from([(0xAA, ConnectionInfo::new(2, near.clone()))]));
        sources.insert(2, IdInfoMap::from([(0xAA, ConnectionInfo::new(2, Clock::new()))]));

        let flat = update_provides(sources);
        assert_eq!(flat[&0xAA].clock, near);
    }

    #[test]
    fn invalid_connection_sentinel() {
        let conn = Connection::invalid();
        assert!(!conn.valid());
        assert_eq!(conn.source, INVALID_SOURCE);
        assert!(!conn.clock.valid());
    }
}

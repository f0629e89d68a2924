//! The connection-table state machine shared by hubs and journals.
//!
//! Slot `0` always belongs to the broker itself: its clock is the merge
//! of every accepted entry stamp and its provides map advertises the
//! ids that live here at distance zero. Slots from `1` up hold peer
//! edges; `connect` appends, `disconnect` tombstones in place, and no
//! index is ever reused, so a `Source` stays a stable handle for the
//! broker's whole lifetime.
//!
//! Locking rule: state lives behind one mutex and the lock is never
//! held across a peer call. Every operation clones what it needs,
//! releases the lock, then talks to peers, so the re-entrant
//! refresh/insert cascades between brokers cannot deadlock and a
//! clock update is a single atomic read-modify-write.

use crate::clock::Clock;
use crate::entry::{Data, Entry};
use crate::types::{Id, Source, INVALID_SOURCE, SELF_SOURCE};
use crate::url::BrokerUrl;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tracing::debug;

use super::connection::{update_provides, Connection, ConnectionInfo, IdClockMap, IdInfoMap, SourcesMap};
use super::{BrokerRef, BrokerWeak};

/// One row of the connection table.
struct Slot {
    /// Back-reference to the peer; `None` on slot 0 and on tombstones.
    peer: Option<BrokerWeak>,
    /// The slot index this broker occupies in the peer's table.
    source: Source,
    clock: Clock,
    provides: IdInfoMap,
}

impl Slot {
    fn own() -> Self {
        Self { peer: None, source: SELF_SOURCE, clock: Clock::new(), provides: IdInfoMap::new() }
    }

    fn peer_ref(&self) -> Option<BrokerRef> {
        self.peer.as_ref().and_then(Weak::upgrade)
    }
}

pub struct Core {
    id: Id,
    url: BrokerUrl,
    /// Weak self, handed to peers inside reply stubs and used to route
    /// relay stamping back through the owning broker's `insert`.
    this: BrokerWeak,
    slots: Mutex<Vec<Slot>>,
}

impl Core {
    pub fn new(id: Id, url: BrokerUrl, this: BrokerWeak) -> Self {
        Self { id, url, this, slots: Mutex::new(vec![Slot::own()]) }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn url(&self) -> String {
        self.url.url.clone()
    }

    pub fn clock(&self) -> Clock {
        self.slots.lock()[0].clock.clone()
    }

    fn this_ref(&self) -> Option<BrokerRef> {
        self.this.upgrade()
    }

    /// Advertise the broker's own id at distance zero. Journals call
    /// this at construction so relays can find the owner before any
    /// entry exists.
    pub(crate) fn seed_own_id(&self) {
        let mut slots = self.slots.lock();
        let id = self.id;
        slots[0].provides.insert(id, ConnectionInfo::new(0, Clock::new()));
    }

    /// Fold previously persisted stamps back into the self clock.
    pub(crate) fn restore_clock(&self, stored: Clock) {
        let mut slots = self.slots.lock();
        slots[0].clock = slots[0].clock.merge(&stored);
    }

    pub fn connect(&self, conn: Connection) -> Connection {
        if conn.source == SELF_SOURCE {
            self.connect_initiator(conn)
        } else {
            self.connect_acceptor(conn)
        }
    }

    /// Initiator half: allocate the slot, register on the peer, then
    /// exchange entries both ways and tell the rest of the mesh.
    fn connect_initiator(&self, conn: Connection) -> Connection {
        let Some(peer) = conn.peer.clone() else {
            debug!("connect: no peer reference");
            return Connection::invalid();
        };

        let s = {
            let mut slots = self.slots.lock();
            slots.push(Slot {
                peer: Some(Arc::downgrade(&peer)),
                source: SELF_SOURCE,
                clock: conn.clock.clone(),
                provides: conn.provides.clone(),
            });
            (slots.len() - 1) as Source
        };

        let reply = Connection {
            peer: self.this_ref(),
            source: s,
            clock: self.clock(),
            provides: update_provides(self.sources(s)),
        };
        let answer = peer.connect(reply);

        {
            let mut slots = self.slots.lock();
            let slot = &mut slots[s as usize];
            slot.source = answer.source;
            slot.clock = answer.clock.clone();
            slot.provides = answer.provides.clone();
        }

        let at_peer = answer.source;
        if let Some(me) = self.this_ref() {
            let ours = me.query(&answer.clock, s);
            let theirs = peer.query(&self.clock(), at_peer);

            if !theirs.is_empty() {
                me.insert_all(&theirs, s);
            }
            if !ours.is_empty() {
                let returned = peer.insert_all(&ours, at_peer);
                if returned.valid() && !returned.is_empty() {
                    let mut slots = self.slots.lock();
                    let slot = &mut slots[s as usize];
                    slot.clock = slot.clock.merge(&returned);
                    for info in slot.provides.values_mut() {
                        info.clock = info.clock.merge(&returned);
                    }
                }
            }
        }

        self.refresh_connections(s);

        Connection {
            peer: Some(peer),
            source: s,
            clock: self.clock(),
            provides: update_provides(self.sources(s)),
        }
    }

    /// Acceptor half: store the edge, carry the local clock into the
    /// reported provides, and answer with this broker's advertisement.
    fn connect_acceptor(&self, conn: Connection) -> Connection {
        let version = self.clock();
        let mut provides = conn.provides.clone();
        for info in provides.values_mut() {
            info.clock = info.clock.merge(&version);
        }

        let s = {
            let mut slots = self.slots.lock();
            slots.push(Slot {
                peer: conn.peer.as_ref().map(Arc::downgrade),
                source: conn.source,
                clock: conn.clock.clone(),
                provides,
            });
            (slots.len() - 1) as Source
        };

        self.refresh_connections(s);

        Connection {
            peer: self.this_ref(),
            source: s,
            clock: version,
            provides: update_provides(self.sources(s)),
        }
    }

    pub fn refresh(&self, data: &Connection, sender: Source) -> bool {
        let changed = {
            let mut slots = self.slots.lock();
            if sender <= 0 || sender as usize >= slots.len() {
                debug!(sender, "refresh: unknown sender");
                return false;
            }
            let slot = &mut slots[sender as usize];
            if slot.source == data.source
                && slot.clock == data.clock
                && slot.provides == data.provides
            {
                // Nothing new; stopping here is what lets a refresh
                // wave die out on cyclic meshes.
                false
            } else {
                slot.source = data.source;
                slot.clock = data.clock.clone();
                slot.provides = data.provides.clone();
                true
            }
        };
        if changed {
            self.refresh_connections(sender);
        }
        true
    }

    /// The single place topology changes leave this node: every live
    /// peer except `ignore` gets the current clock and the
    /// distance-incremented provides, never the raw sources table.
    pub fn refresh_connections(&self, ignore: Source) {
        let targets: Vec<(Source, BrokerRef, Source)> = {
            let slots = self.slots.lock();
            slots
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(i, _)| *i as Source != ignore)
                .filter_map(|(i, slot)| slot.peer_ref().map(|p| (i as Source, p, slot.source)))
                .collect()
        };

        for (i, peer, at_peer) in targets {
            let data = Connection {
                peer: self.this_ref(),
                source: i,
                clock: self.clock(),
                provides: update_provides(self.sources(i)),
            };
            peer.refresh(&data, at_peer);
        }
    }

    pub fn sources(&self, ignore: Source) -> SourcesMap {
        let slots = self.slots.lock();
        let mut out = SourcesMap::new();
        for (i, slot) in slots.iter().enumerate() {
            let source = i as Source;
            if source == SELF_SOURCE {
                if !slot.provides.is_empty() {
                    out.insert(SELF_SOURCE, slot.provides.clone());
                }
                continue;
            }
            if source == ignore || slot.peer_ref().is_none() || slot.provides.is_empty() {
                continue;
            }
            out.insert(source, slot.provides.clone());
        }
        out
    }

    /// Accept an entry and fan it out to every peer slot except the
    /// sender. The cascade stops on its own: a broker whose clock
    /// already dominates the stamp gains nothing and journals refuse
    /// the duplicate outright.
    pub fn insert_fanout(&self, entry: &Entry, source: Source) -> Clock {
        let advanced = {
            let mut slots = self.slots.lock();
            if source < 0 || source as usize >= slots.len() {
                debug!(source, "insert: unknown sender");
                return Clock::invalid();
            }
            let merged = slots[0].clock.merge(&entry.clock);
            let advanced = merged != slots[0].clock;
            slots[0].clock = merged.clone();
            slots[source as usize]
                .provides
                .entry(entry.data.id)
                .or_default()
                .clock = merged;
            advanced
        };

        // A clock that did not move has seen this stamp before; the
        // fan-out wave stops here even on meshes with cycles.
        if !advanced {
            return self.clock();
        }

        let targets: Vec<(usize, BrokerRef, Source)> = {
            let slots = self.slots.lock();
            slots
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(i, _)| *i as Source != source)
                .filter_map(|(i, slot)| slot.peer_ref().map(|p| (i, p, slot.source)))
                .collect()
        };

        for (i, peer, at_peer) in targets {
            let returned = peer.insert(entry, at_peer);
            let mut slots = self.slots.lock();
            if let Some(slot) = slots.get_mut(i) {
                if returned.valid() && !returned.is_empty() {
                    slot.clock = slot.clock.merge(&returned);
                }
                for info in slot.provides.values_mut() {
                    info.clock = info.clock.merge(&entry.clock);
                }
            }
        }

        self.clock()
    }

    /// Hub-style query: hand the question to the first live peer that
    /// advertises anything, excluding the asker.
    pub fn query_delegate(&self, from: &Clock, sender: Source) -> Vec<Entry> {
        let target = {
            let slots = self.slots.lock();
            slots
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(i, slot)| *i as Source != sender && !slot.provides.is_empty())
                .find_map(|(_, slot)| slot.peer_ref().map(|p| (p, slot.source)))
        };
        match target {
            Some((peer, at_peer)) => peer.query(from, at_peer),
            None => Vec::new(),
        }
    }

    pub fn versions(&self) -> IdClockMap {
        let slots = self.slots.lock();
        let mut out = IdClockMap::new();
        for slot in slots.iter() {
            for (id, info) in &slot.provides {
                let known = out.entry(*id).or_default();
                *known = known.merge(&info.clock);
            }
        }
        out
    }

    pub fn connected_sources(&self) -> BTreeSet<Source> {
        let slots = self.slots.lock();
        slots
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, slot)| slot.peer_ref().is_some())
            .map(|(i, _)| i as Source)
            .collect()
    }

    pub fn disconnect(&self, source: Source) -> Source {
        let (peer, at_peer) = {
            let slots = self.slots.lock();
            if source < 0 || source as usize >= slots.len() {
                return INVALID_SOURCE;
            }
            let slot = &slots[source as usize];
            match slot.peer_ref() {
                Some(peer) => (peer, slot.source),
                None => return INVALID_SOURCE,
            }
        };

        // The peer keeps its slot; an empty refresh collapses what it
        // advertises through this edge.
        let empty = Connection {
            peer: None,
            source: SELF_SOURCE,
            clock: Clock::new(),
            provides: IdInfoMap::new(),
        };
        peer.refresh(&empty, at_peer);

        {
            let mut slots = self.slots.lock();
            slots[source as usize].peer = None;
        }

        self.refresh_connections(source);
        source
    }

    /// Route a stampless record toward the nearest advertised owner of
    /// its id. Distance zero means this broker owns it: stamp and
    /// insert here. Ties at the smallest distance go to the first slot
    /// encountered (ascending slot index, then ascending id).
    pub fn relay(&self, data: Data, sender: Source) -> Clock {
        let sources = self.sources(SELF_SOURCE);
        let mut best: Option<(Source, i16)> = None;

        for (source, infos) in &sources {
            if sender > 0 && *source == sender {
                continue;
            }
            if let Some(info) = infos.get(&data.id) {
                if info.distance == 0 {
                    let Some(me) = self.this_ref() else {
                        return Clock::invalid();
                    };
                    let stamp = self.clock().tick(data.id);
                    return me.insert(&Entry::new(stamp, data), SELF_SOURCE);
                }
                if best.map_or(true, |(_, d)| info.distance < d) {
                    best = Some((*source, info.distance));
                }
            }
        }

        let Some((s, _)) = best else {
            debug!(id = data.id, "relay: no route");
            return Clock::invalid();
        };

        let (peer, at_peer) = {
            let slots = self.slots.lock();
            let slot = &slots[s as usize];
            match slot.peer_ref() {
                Some(peer) => (peer, slot.source),
                None => return Clock::invalid(),
            }
        };
        peer.relay(data, at_peer)
    }
}

/// Journal-side query filter: everything `from` does not dominate,
/// ordered by total tick count. That ordering is a linear extension of
/// the causal partial order, so a batch replays cleanly through the
/// per-author gap check on the receiving side.
pub(crate) fn query_filter(entries: Vec<Entry>, from: &Clock) -> Vec<Entry> {
    let mut out: Vec<Entry> = entries
        .into_iter()
        .filter(|e| e.clock.concurrent(from) || from.smaller_than(&e.clock))
        .collect();
    out.sort_by_key(|e| e.clock.ticks());
    out
}

/// Whether a journal may take `entry` given its current clock: the
/// journal's own slot must advance by exactly one when the entry
/// advances it at all.
pub(crate) fn admits(journal_clock: &Clock, own_id: Id, entry: &Entry) -> bool {
    let claimed = entry.clock.get(own_id);
    claimed <= journal_clock.get(own_id) || entry.clock.is_next(journal_clock, own_id)
}

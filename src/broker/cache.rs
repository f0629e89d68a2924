//! In-memory journal: a clock-keyed map of records.

use crate::clock::Clock;
use crate::entry::{Data, Entry};
use crate::types::{random_id, Id, Source, RESERVED_ID};
use crate::url::BrokerUrl;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use super::connection::{Connection, IdClockMap, SourcesMap};
use super::core::{admits, query_filter, Core};
use super::Broker;

pub struct CacheJournal {
    core: Core,
    entries: Mutex<BTreeMap<Clock, Data>>,
}

impl CacheJournal {
    pub fn open(url: &BrokerUrl) -> Arc<CacheJournal> {
        let id = if url.id != RESERVED_ID { url.id } else { random_id() };
        let url = url.clone();
        let journal: Arc<CacheJournal> = Arc::new_cyclic(|weak| {
            let weak: std::sync::Weak<CacheJournal> = weak.clone();
            let this: super::BrokerWeak = weak;
            CacheJournal { core: Core::new(id, url, this), entries: Mutex::new(BTreeMap::new()) }
        });
        journal.core.seed_own_id();
        journal
    }
}

impl Broker for CacheJournal {
    fn id(&self) -> Id {
        self.core.id()
    }

    fn url(&self) -> String {
        self.core.url()
    }

    fn scheme(&self) -> &'static str {
        "cache"
    }

    fn clock(&self) -> Clock {
        self.core.clock()
    }

    fn connect(&self, conn: Connection) -> Connection {
        self.core.connect(conn)
    }

    fn refresh(&self, data: &Connection, sender: Source) -> bool {
        self.core.refresh(data, sender)
    }

    /// Save first; a refused save short-circuits with an empty clock,
    /// so duplicates neither fan out nor move the clock.
    fn insert(&self, entry: &Entry, sender: Source) -> Clock {
        if !self.save(entry) {
            return Clock::new();
        }
        self.core.insert_fanout(entry, sender)
    }

    fn query(&self, from: &Clock, _sender: Source) -> Vec<Entry> {
        query_filter(self.entries(), from)
    }

    fn relay(&self, mut data: Data, sender: Source) -> Clock {
        if data.id == RESERVED_ID {
            data.id = self.core.id();
        }
        self.core.relay(data, sender)
    }

    fn disconnect(&self, source: Source) -> Source {
        self.core.disconnect(source)
    }

    fn sources(&self, ignore: Source) -> SourcesMap {
        self.core.sources(ignore)
    }

    fn versions(&self) -> IdClockMap {
        self.core.versions()
    }

    fn connected_sources(&self) -> BTreeSet<Source> {
        self.core.connected_sources()
    }

    fn save(&self, entry: &Entry) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&entry.clock) {
            debug!(stamp = %entry.clock, "save: duplicate");
            return false;
        }
        if !admits(&self.core.clock(), self.core.id(), entry) {
            debug!(stamp = %entry.clock, "save: gap in own slot");
            return false;
        }
        entries.insert(entry.clock.clone(), entry.data.clone());
        true
    }

    fn entry(&self, clock: &Clock) -> Data {
        self.entries.lock().get(clock).cloned().unwrap_or_else(Data::missing)
    }

    fn entries(&self) -> Vec<Entry> {
        self.entries
            .lock()
            .iter()
            .map(|(clock, data)| Entry::new(clock.clone(), data.clone()))
            .collect()
    }
}

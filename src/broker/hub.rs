//! Hub broker: pure forwarding, no storage.
//!
//! A hub keeps the connection table and the merged clock but persists
//! nothing; queries are handed to the first peer that advertises data.

use crate::clock::Clock;
use crate::entry::{Data, Entry};
use crate::types::{random_id, Id, Source, RESERVED_ID};
use crate::url::BrokerUrl;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::connection::{Connection, IdClockMap, SourcesMap};
use super::core::Core;
use super::Broker;

pub struct Hub {
    core: Core,
}

impl Hub {
    /// Builds a hub from its URL; draws a random id when the URL
    /// carries none.
    pub fn open(url: &BrokerUrl) -> Arc<Hub> {
        let id = if url.id != RESERVED_ID { url.id } else { random_id() };
        let url = url.clone();
        let hub: Arc<Hub> = Arc::new_cyclic(|weak| {
            let weak: std::sync::Weak<Hub> = weak.clone();
            let this: super::BrokerWeak = weak;
            Hub { core: Core::new(id, url, this) }
        });
        hub
    }
}

impl Broker for Hub {
    fn id(&self) -> Id {
        self.core.id()
    }

    fn url(&self) -> String {
        self.core.url()
    }

    fn scheme(&self) -> &'static str {
        "hub"
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

    fn insert(&self, entry: &Entry, sender: Source) -> Clock {
        self.core.insert_fanout(entry, sender)
    }

    fn query(&self, from: &Clock, sender: Source) -> Vec<Entry> {
        self.core.query_delegate(from, sender)
    }

    fn relay(&self, data: Data, sender: Source) -> Clock {
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
}

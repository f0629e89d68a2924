//! Replica nodes and the operations they expose to each other.

pub mod cache;
pub mod connection;
pub mod core;
pub mod file;
pub mod hub;
pub mod store;

pub use cache::CacheJournal;
pub use connection::{
    format_id_info, format_sources, format_versions, update_provides, Connection, ConnectionInfo,
    IdClockMap, IdInfoMap, SourcesMap,
};
pub use file::FileJournal;
pub use hub::Hub;
pub use store::BrokerStore;

use crate::clock::Clock;
use crate::entry::{Data, Entry};
use crate::types::{Amount, Id, Source, SELF_SOURCE};
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

pub type BrokerRef = Arc<dyn Broker>;
pub type BrokerWeak = Weak<dyn Broker>;

/// The operation set every replica exposes: hubs, journals, and remote
/// proxies all answer it, so connection slots hold `Arc<dyn Broker>`
/// without caring what sits behind them.
///
/// Peer-facing operations never fail with an error value. An operation
/// that cannot proceed returns its sentinel (an invalid clock, `false`,
/// or an empty list) and leaves state untouched.
pub trait Broker: Send + Sync {
    fn id(&self) -> Id;
    fn url(&self) -> String;
    fn scheme(&self) -> &'static str;

    /// The merge of every entry stamp this broker has accepted.
    fn clock(&self) -> Clock;

    /// Opens or accepts an edge. A `conn.source` of zero marks the
    /// initiator side; anything else is the acceptor half.
    fn connect(&self, conn: Connection) -> Connection;

    /// Overwrites the sender's slot with fresh topology and propagates.
    fn refresh(&self, data: &Connection, sender: Source) -> bool;

    /// Accepts one entry and fans it out to every peer except the
    /// sender. Returns the resulting clock.
    fn insert(&self, entry: &Entry, sender: Source) -> Clock;

    /// Folds `insert` over a batch, returning the final clock.
    fn insert_all(&self, entries: &[Entry], sender: Source) -> Clock {
        for entry in entries {
            self.insert(entry, sender);
        }
        self.clock()
    }

    /// Every entry reachable from this broker that `from` does not
    /// dominate.
    fn query(&self, from: &Clock, sender: Source) -> Vec<Entry>;

    /// Routes a stampless record toward the nearest owner of its id,
    /// stamping locally when this broker is the owner.
    fn relay(&self, data: Data, sender: Source) -> Clock;

    /// Tombstones a slot. The slot index, provides, and last-seen clock
    /// survive so `versions` never regresses.
    fn disconnect(&self, source: Source) -> Source;

    /// Reachable ids per live slot, skipping `ignore`.
    fn sources(&self, ignore: Source) -> SourcesMap;

    /// Freshest clock per id over every slot, tombstoned ones included.
    fn versions(&self) -> IdClockMap;

    /// Indices of the live peer slots.
    fn connected_sources(&self) -> BTreeSet<Source>;

    // Journal hooks; non-journal brokers keep the defaults.

    /// Persists one entry. `false` refuses it (duplicate or gap) and
    /// stops both fan-out and clock movement at this node.
    fn save(&self, _entry: &Entry) -> bool {
        false
    }

    /// Looks up the record stamped with `clock`, or the missing
    /// sentinel.
    fn entry(&self, _clock: &Clock) -> Data {
        Data::missing()
    }

    /// Every entry this broker holds locally.
    fn entries(&self) -> Vec<Entry> {
        Vec::new()
    }

    // Local edits. Each one stamps `clock().tick(data.id)` and runs the
    // ordinary insert path, so local writes replicate like remote ones.

    fn append(&self, value: Amount) -> bool {
        self.append_data(Data::insert(self.id(), value))
    }

    fn append_data(&self, data: Data) -> bool {
        let stamp = self.clock().tick(data.id);
        self.insert(&Entry::new(stamp, data), SELF_SOURCE).valid()
    }

    fn replace(&self, value: Amount, alters: &Clock) -> bool {
        self.append_data(Data { id: self.id(), value, alters: alters.clone() })
    }

    fn erase(&self, alters: &Clock) -> bool {
        self.append_data(Data { id: self.id(), value: 0, alters: alters.clone() })
    }

    fn contains(&self, clock: &Clock) -> bool {
        self.entry(clock).valid()
    }
}

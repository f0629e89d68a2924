//! Tally, a conflict-free replicated money ledger.
//!
//! Every node (a *broker*) holds an append-only set of entries stamped
//! with per-actor vector clocks and converges on the same balance no
//! matter how messages are ordered, duplicated, or delayed. Brokers
//! form a dynamic mesh: hubs forward, journals persist (in memory or in
//! per-id append-only files), and remote proxies stretch an edge over
//! TCP. The [`ledger`] resolver turns any replica's entry set into one
//! deterministic balance.

pub mod broker;
pub mod clock;
pub mod command;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod rpc;
pub mod text;
pub mod types;
pub mod url;

pub use broker::{
    format_id_info, format_sources, format_versions, update_provides, Broker, BrokerRef,
    BrokerStore, BrokerWeak, CacheJournal, Connection, ConnectionInfo, FileJournal, Hub,
    IdClockMap, IdInfoMap, SourcesMap,
};
pub use clock::Clock;
pub use command::Command;
pub use entry::{Data, Entry};
pub use error::{Error, Result};
pub use rpc::{Endpoint, RemoteBroker};
pub use types::{Amount, Id, Source, Time, INVALID_SOURCE, SELF_SOURCE};
pub use url::BrokerUrl;

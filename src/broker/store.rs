//! URL-keyed broker registry.
//!
//! Schemes map to builders at compile time: `hub` and `cache` are
//! in-memory brokers, `file` is the append-only journal, `tcp` is the
//! remote proxy. Asking twice for the same URL yields the same broker.

use crate::error::{Error, Result};
use crate::rpc::RemoteBroker;
use crate::url::BrokerUrl;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{BrokerRef, CacheJournal, FileJournal, Hub};

#[derive(Default)]
pub struct BrokerStore {
    brokers: Mutex<HashMap<String, BrokerRef>>,
}

impl BrokerStore {
    pub fn new() -> Arc<BrokerStore> {
        Arc::new(BrokerStore::default())
    }

    pub fn get_or_create(&self, url: &str) -> Result<BrokerRef> {
        if let Some(broker) = self.brokers.lock().get(url) {
            return Ok(broker.clone());
        }

        let parsed = BrokerUrl::parse(url)?;
        let broker: BrokerRef = match parsed.scheme.as_str() {
            "hub" => Hub::open(&parsed),
            "cache" => CacheJournal::open(&parsed),
            "file" => FileJournal::open(&parsed)?,
            "tcp" => RemoteBroker::open(&parsed),
            other => return Err(Error::UnknownScheme(other.to_string())),
        };

        let mut brokers = self.brokers.lock();
        Ok(brokers.entry(url.to_string()).or_insert(broker).clone())
    }

    /// Registers an externally built broker under `url`.
    pub fn insert(&self, url: &str, broker: BrokerRef) {
        self.brokers.lock().insert(url.to_string(), broker);
    }

    pub fn len(&self) -> usize {
        self.brokers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.brokers.lock().is_empty()
    }
}

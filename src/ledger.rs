//! Deterministic resolver from an unordered entry set to a balance.
//!
//! Entries are grouped into logical rows: a plain insert opens the row
//! keyed by its own stamp, a superseding entry targets the row keyed by
//! its `alters` clock. Within a row the surviving entry is the one with
//! the dominating stamp; concurrent stamps fall back to the actor id,
//! higher id wins. The fold is invariant under any permutation of the
//! input, so every replica that holds the same entry set reports the
//! same balance.

use crate::clock::Clock;
use crate::entry::Entry;
use crate::types::Amount;
use std::collections::BTreeMap;

/// What to do with an incoming entry given the rows seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ignore,
    Insert,
    Replace,
}

/// Row table: logical row key to the entry currently surviving there.
pub type RowMap = BTreeMap<Clock, Entry>;

/// Decides whether `incoming` supersedes `existing` within one row.
///
/// Insert-type entries never replace anything; their row identity is
/// their own stamp, so a second insert with the same stamp is a
/// duplicate.
pub fn replaces(existing: &Entry, incoming: &Entry) -> Action {
    if incoming.data.alters.is_empty() {
        return Action::Ignore;
    }
    if existing.clock.smaller_than(&incoming.clock) {
        return Action::Replace;
    }
    if incoming.clock.smaller_than(&existing.clock) {
        return Action::Ignore;
    }
    if existing.data.id < incoming.data.id {
        Action::Replace
    } else {
        Action::Ignore
    }
}

/// Classifies `incoming` against `rows`, returning the action and the
/// row key it applies to (empty for `Ignore`).
pub fn evaluate(rows: &RowMap, incoming: &Entry) -> (Action, Clock) {
    let is_insert = incoming.data.alters.is_empty();
    let key = if is_insert { incoming.clock.clone() } else { incoming.data.alters.clone() };

    match rows.get(&key) {
        None => (Action::Insert, key),
        Some(_) if is_insert => (Action::Ignore, Clock::new()),
        Some(existing) => match replaces(existing, incoming) {
            Action::Replace => (Action::Replace, key),
            _ => (Action::Ignore, Clock::new()),
        },
    }
}

/// Folds an entry multiset down to the surviving row set.
pub fn resolve(entries: &[Entry]) -> RowMap {
    let mut rows = RowMap::new();
    for entry in entries {
        match evaluate(&rows, entry) {
            (Action::Ignore, _) => {}
            (Action::Insert, key) | (Action::Replace, key) => {
                rows.insert(key, entry.clone());
            }
        }
    }
    rows
}

/// The sum of surviving row values.
pub fn balance(entries: &[Entry]) -> Amount {
    resolve(entries).values().map(|entry| entry.data.value).sum()
}

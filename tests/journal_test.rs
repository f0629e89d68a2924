//! Journal behavior: clock movement, duplicate and gap refusal, and
//! the append-only file format.

use std::fs;
use std::io::{BufRead, BufReader};
use tally::{
    Broker, BrokerUrl, CacheJournal, Clock, Data, Entry, FileJournal, SELF_SOURCE,
};

fn cache(url: &str) -> std::sync::Arc<CacheJournal> {
    CacheJournal::open(&BrokerUrl::parse(url).unwrap())
}

#[test]
fn fresh_journal_has_an_empty_clock() {
    let journal = cache("cache://aa@");
    assert_eq!(journal.clock(), Clock::new());
    assert!(journal.entries().is_empty());
}

#[test]
fn single_node_append() {
    let journal = cache("cache://aa@");
    assert!(journal.append(1000));
    assert_eq!(journal.clock(), Clock::from([(0xAA, 1)]));
    assert_eq!(tally::ledger::balance(&journal.entries()), 1000);
}

#[test]
fn edits_advance_the_editors_slot() {
    let journal = cache("cache://aa@");
    let id = journal.id();

    assert!(journal.append(1000));
    assert_eq!(journal.clock(), Clock::from([(id, 1)]));

    // An entry written under another actor's id ticks that slot.
    assert!(journal.append_data(Data::insert(0xCC, 200)));
    assert_eq!(journal.clock(), Clock::from([(id, 1), (0xCC, 1)]));

    // Replace and erase stamp the journal's own slot.
    assert!(journal.replace(300, &Clock::from([(id, 1)])));
    assert_eq!(journal.clock(), Clock::from([(id, 2), (0xCC, 1)]));

    assert!(journal.erase(&Clock::from([(id, 1)])));
    assert_eq!(journal.clock(), Clock::from([(id, 3), (0xCC, 1)]));
}

#[test]
fn zeroed_slots_are_ignored() {
    let journal = cache("cache://dd@");
    let stamp: Clock = "{{cc, 1}, {aa, 0}, {bb, 0}}".parse().unwrap();
    let entry = Entry::new(stamp, Data::insert(0xCC, 206));

    assert!(journal.insert(&entry, SELF_SOURCE).valid());

    assert_eq!(journal.clock(), Clock::from([(0xCC, 1)]));
    assert_eq!(journal.clock().get(0xAA), 0);
    assert_eq!(journal.clock().get(0xBB), 0);
    assert_eq!(journal.entry(&Clock::from([(0xCC, 1)])), Data::insert(0xCC, 206));
}

#[test]
fn duplicate_inserts_are_idempotent() {
    let journal = cache("cache://aa@");
    let entry = Entry::new(Clock::from([(0xBB, 1)]), Data::insert(0xBB, 10));

    let first = journal.insert(&entry, SELF_SOURCE);
    assert!(first.valid());
    let clock_after = journal.clock();

    // The duplicate is refused: no clock movement, no second copy.
    let second = journal.insert(&entry, SELF_SOURCE);
    assert!(second.is_empty());
    assert_eq!(journal.clock(), clock_after);
    assert_eq!(journal.entries().len(), 1);
}

#[test]
fn gapped_own_slot_is_refused() {
    let journal = cache("cache://aa@");

    let skipped = Entry::new(Clock::from([(0xAA, 2)]), Data::insert(0xAA, 10));
    assert!(journal.insert(&skipped, SELF_SOURCE).is_empty());
    assert!(journal.entries().is_empty());

    let first = Entry::new(Clock::from([(0xAA, 1)]), Data::insert(0xAA, 10));
    assert!(journal.insert(&first, SELF_SOURCE).valid());
    assert!(journal.insert(&skipped, SELF_SOURCE).valid());
    assert_eq!(journal.entries().len(), 2);
}

#[test]
fn contains_tracks_stored_stamps() {
    let journal = cache("cache://aa@");
    assert!(journal.append(10));
    assert!(journal.contains(&Clock::from([(0xAA, 1)])));
    assert!(!journal.contains(&Clock::from([(0xAA, 2)])));
}

#[test]
fn query_returns_exactly_the_undominated_entries() {
    let journal = cache("cache://aa@");
    assert!(journal.append(10)); // {{aa, 1}}
    assert!(journal.append(20)); // {{aa, 2}}

    let concurrent = Entry::new(
        Clock::from([(0xBB, 1)]),
        Data::insert(0xBB, 5),
    );
    assert!(journal.insert(&concurrent, SELF_SOURCE).valid());

    let from = Clock::from([(0xAA, 1)]);
    let answered = journal.query(&from, SELF_SOURCE);
    let stamps: Vec<Clock> = answered.iter().map(|e| e.clock.clone()).collect();

    // {{aa, 1}} itself is dominated and stays out; the later append and
    // the concurrent entry come back.
    assert_eq!(answered.len(), 2);
    assert!(stamps.contains(&Clock::from([(0xAA, 2)])));
    assert!(stamps.contains(&Clock::from([(0xBB, 1)])));
}

#[test]
fn query_order_is_a_causal_linear_extension() {
    let journal = cache("cache://aa@");
    assert!(journal.append(1));
    assert!(journal.append(2));
    assert!(journal.append(3));

    let answered = journal.query(&Clock::new(), SELF_SOURCE);
    let ticks: Vec<u64> = answered.iter().map(|e| e.clock.ticks()).collect();
    let mut sorted = ticks.clone();
    sorted.sort_unstable();
    assert_eq!(ticks, sorted);
}

#[test]
fn file_journal_line_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let url = BrokerUrl::parse(&format!("file://baadcafe@{}", dir.path().display())).unwrap();
    let journal = FileJournal::open(&url).unwrap();

    assert!(journal.append(10));
    assert!(journal.append(20));

    let path = dir.path().join("00000000baadcafe");
    assert_eq!(journal.filename(), path);

    let lines: Vec<String> = BufReader::new(fs::File::open(&path).unwrap())
        .lines()
        .map(|line| line.unwrap())
        .collect();
    assert_eq!(
        lines,
        vec![
            "{{{baadcafe, 1}}, {baadcafe, 10, {}}}".to_string(),
            "{{{baadcafe, 2}}, {baadcafe, 20, {}}}".to_string(),
        ]
    );
}

#[test]
fn file_journal_seeks_entries_by_stamp() {
    let dir = tempfile::tempdir().unwrap();
    let url = BrokerUrl::parse(&format!("file://aa@{}", dir.path().display())).unwrap();
    let journal = FileJournal::open(&url).unwrap();

    assert!(journal.append(10));
    assert!(journal.append(20));
    let other = Entry::new(Clock::from([(0xBB, 1)]), Data::insert(0xBB, 100));
    assert!(journal.insert(&other, SELF_SOURCE).valid());

    assert_eq!(journal.entry(&Clock::from([(0xAA, 2)])), Data::insert(0xAA, 20));
    assert_eq!(journal.entry(&Clock::from([(0xBB, 1)])), Data::insert(0xBB, 100));
    assert!(!journal.entry(&Clock::from([(0xAA, 9)])).valid());

    assert_eq!(journal.entries().len(), 3);
    assert_eq!(tally::ledger::balance(&journal.entries()), 130);
}

#[test]
fn file_journal_refuses_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let url = BrokerUrl::parse(&format!("file://aa@{}", dir.path().display())).unwrap();
    let journal = FileJournal::open(&url).unwrap();

    let entry = Entry::new(Clock::from([(0xBB, 1)]), Data::insert(0xBB, 100));
    assert!(journal.insert(&entry, SELF_SOURCE).valid());
    assert!(journal.insert(&entry, SELF_SOURCE).is_empty());
    assert_eq!(journal.entries().len(), 1);
}

#[test]
fn file_journal_recovers_its_clock_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = BrokerUrl::parse(&format!("file://aa@{}", dir.path().display())).unwrap();

    {
        let journal = FileJournal::open(&url).unwrap();
        assert!(journal.append(10));
        assert!(journal.append(20));
    }

    let reopened = FileJournal::open(&url).unwrap();
    assert_eq!(reopened.clock(), Clock::from([(0xAA, 2)]));
    assert_eq!(reopened.entries().len(), 2);
    assert_eq!(tally::ledger::balance(&reopened.entries()), 30);

    // New appends continue the line sequence.
    assert!(reopened.append(30));
    assert_eq!(reopened.clock(), Clock::from([(0xAA, 3)]));
    assert_eq!(
        reopened.entry(&Clock::from([(0xAA, 3)])),
        Data::insert(0xAA, 30)
    );
}

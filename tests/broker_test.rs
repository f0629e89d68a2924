//! Hub behavior: connect modes, fan-out, sources, disconnect.

use tally::{
    Broker, BrokerUrl, CacheJournal, Clock, Connection, Data, Hub, IdClockMap, SELF_SOURCE,
    INVALID_SOURCE,
};

fn hub() -> std::sync::Arc<Hub> {
    Hub::open(&BrokerUrl::parse("hub://").unwrap())
}

fn journal(url: &str) -> std::sync::Arc<CacheJournal> {
    CacheJournal::open(&BrokerUrl::parse(url).unwrap())
}

#[test]
fn connect_without_peer_is_refused() {
    let hub = hub();
    let conn = hub.connect(Connection::default());
    assert_eq!(conn.source, INVALID_SOURCE);
    assert!(!conn.valid());
}

#[test]
fn fresh_hub_is_empty() {
    let hub = hub();
    assert_eq!(hub.clock(), Clock::new());
    assert_eq!(hub.versions(), IdClockMap::new());
    assert!(hub.sources(SELF_SOURCE).is_empty());
    assert!(hub.connected_sources().is_empty());
}

#[test]
fn first_connection_takes_source_one() {
    let hub = hub();
    let ja = journal("cache://aa@");

    let conn = hub.connect(Connection::new(ja));
    assert!(conn.valid());
    assert_eq!(conn.source, 1);
    assert_eq!(hub.connected_sources(), [1].into_iter().collect());
}

#[test]
fn hub_append_advances_the_clock() {
    let hub = Hub::open(&BrokerUrl::parse("hub://aa@localhost").unwrap());
    assert_eq!(hub.id(), 0xAA);
    assert!(hub.append(1000));
    assert_eq!(hub.clock(), Clock::from([(0xAA, 1)]));
}

#[test]
fn insert_updates_the_clock() {
    let hub = hub();
    let entry = tally::Entry::new(Clock::from([(0xBB, 1)]), Data::insert(0xBB, 10));
    let returned = hub.insert(&entry, SELF_SOURCE);
    assert_eq!(returned, entry.clock);
    assert_eq!(hub.clock(), entry.clock);
}

#[test]
fn insert_with_unknown_sender_changes_nothing() {
    let hub = hub();
    let entry = tally::Entry::new(Clock::from([(0xBB, 1)]), Data::insert(0xBB, 10));
    assert!(!hub.insert(&entry, 7).valid());
    assert_eq!(hub.clock(), Clock::new());
}

#[test]
fn inserts_fan_out_to_everyone_but_the_sender() {
    let hub = hub();
    let ja = journal("cache://aa@");
    let jb = journal("cache://bb@");

    let a_conn = hub.connect(Connection::new(ja.clone()));
    hub.connect(Connection::new(jb.clone()));

    let entry = tally::Entry::new(Clock::from([(0xCC, 1)]), Data::insert(0xCC, 10));

    // Entering through Ja's slot, only Jb should receive it.
    hub.insert(&entry, a_conn.source);
    assert_eq!(ja.entries().len(), 0);
    assert_eq!(jb.entries().len(), 1);

    // A replay does not advance the hub's clock, so the wave stops.
    hub.insert(&entry, SELF_SOURCE);
    assert_eq!(ja.entries().len(), 0);
    assert_eq!(jb.entries().len(), 1);

    // A fresh local insert reaches both peers.
    let fresh = tally::Entry::new(Clock::from([(0xDD, 1)]), Data::insert(0xDD, 5));
    hub.insert(&fresh, SELF_SOURCE);
    assert_eq!(ja.entries().len(), 1);
    assert_eq!(jb.entries().len(), 2);
}

#[test]
fn connect_pulls_the_peers_history() {
    let hub = hub();
    let ja = journal("cache://aa@");
    assert!(ja.append(10));

    hub.connect(Connection::new(ja.clone()));

    assert_eq!(hub.clock(), Clock::from([(0xAA, 1)]));
    let versions = hub.versions();
    assert_eq!(versions[&0xAA], Clock::from([(0xAA, 1)]));

    let sources = hub.sources(SELF_SOURCE);
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[&1][&0xAA].distance, 1);
}

#[test]
fn two_hub_rendezvous_converges() {
    let hub_a = hub();
    let hub_b = hub();
    let ja = journal("cache://aa@");
    let jb = journal("cache://bb@");

    hub_a.connect(Connection::new(ja.clone()));
    hub_b.connect(Connection::new(jb.clone()));

    assert!(ja.append(10));
    assert!(jb.append(20));

    hub_a.connect(Connection::new(hub_b.clone()));

    let merged = Clock::from([(0xAA, 1), (0xBB, 1)]);
    assert_eq!(hub_a.clock(), merged);
    assert_eq!(hub_b.clock(), merged);
    assert_eq!(ja.clock(), merged);
    assert_eq!(jb.clock(), merged);

    assert_eq!(ja.entries().len(), 2);
    assert_eq!(jb.entries().len(), 2);
    assert_eq!(tally::ledger::balance(&ja.entries()), 30);
    assert_eq!(tally::ledger::balance(&jb.entries()), 30);
}

#[test]
fn disconnect_preserves_versions() {
    let hub_a = hub();
    let hub_b = hub();
    let ja = journal("cache://aa@");
    let jb = journal("cache://bb@");

    hub_a.connect(Connection::new(ja.clone()));
    hub_b.connect(Connection::new(jb.clone()));
    assert!(ja.append(10));
    assert!(jb.append(20));

    let b_conn = hub_a.connect(Connection::new(hub_b.clone()));
    let clock_before = hub_a.clock();

    assert_eq!(hub_a.disconnect(b_conn.source), b_conn.source);

    // The slot is gone from sources but versions keep its history.
    assert!(!hub_a.sources(SELF_SOURCE).contains_key(&b_conn.source));
    assert_eq!(hub_a.clock(), clock_before);
    let versions = hub_a.versions();
    assert_eq!(versions[&0xBB], Clock::from([(0xAA, 1), (0xBB, 1)]));

    // Disconnecting again, or a bad slot, is refused.
    assert_eq!(hub_a.disconnect(b_conn.source), INVALID_SOURCE);
    assert_eq!(hub_a.disconnect(-3), INVALID_SOURCE);
    assert_eq!(hub_a.disconnect(99), INVALID_SOURCE);
}

#[test]
fn refresh_with_unknown_sender_is_refused() {
    let hub = hub();
    assert!(!hub.refresh(&Connection::default(), 0));
    assert!(!hub.refresh(&Connection::default(), 5));
}

#[test]
fn query_delegates_past_the_asker() {
    let hub = hub();
    let ja = journal("cache://aa@");
    assert!(ja.append(10));
    let a_conn = hub.connect(Connection::new(ja.clone()));

    // Asking as Ja itself finds nobody else to answer.
    assert!(hub.query(&Clock::new(), a_conn.source).is_empty());

    // Anyone else gets Ja's history.
    let answered = hub.query(&Clock::new(), SELF_SOURCE);
    assert_eq!(answered.len(), 1);
    assert_eq!(answered[0].data.value, 10);
}

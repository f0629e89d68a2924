//! Append-only file journal.
//!
//! One file per actor id under the configured directory, named as the
//! id padded to 16 hex digits. Each line is one textual-form entry
//! followed by LF, in arrival order, so the `count`-th line of an
//! author's file is that author's `count`-th entry and a clock pair
//! `(id, count)` doubles as a line address. Opening a directory that
//! already holds files folds every stored stamp back into the clock.

use crate::clock::Clock;
use crate::entry::{Data, Entry};
use crate::error::Result;
use crate::types::{random_id, Id, Source, RESERVED_ID};
use crate::url::BrokerUrl;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::connection::{Connection, IdClockMap, SourcesMap};
use super::core::{admits, query_filter, Core};
use super::Broker;

pub struct FileJournal {
    core: Core,
    dir: PathBuf,
    write_lock: Mutex<()>,
}

/// The journal file for `id` under `dir`.
fn journal_file(dir: &Path, id: Id) -> PathBuf {
    dir.join(format!("{id:016x}"))
}

fn is_journal_name(name: &str) -> bool {
    name.len() == 16 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Reads the `line`-th line (1-based) of `path`, if it exists.
fn read_line(path: &Path, line: u64) -> Option<String> {
    if line == 0 {
        return None;
    }
    let file = File::open(path).ok()?;
    BufReader::new(file)
        .lines()
        .nth(line as usize - 1)
        .and_then(|read| read.ok())
}

/// Merge of every stamp stored under `dir`.
fn scan(dir: &Path) -> Result<Clock> {
    let mut clock = Clock::new();
    for dirent in fs::read_dir(dir)? {
        let path = dirent?.path();
        let named_for_id = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_journal_name);
        if !named_for_id || !path.is_file() {
            continue;
        }
        for line in BufReader::new(File::open(&path)?).lines() {
            match line?.parse::<Entry>() {
                Ok(entry) => clock = clock.merge(&entry.clock),
                Err(err) => warn!(?path, %err, "skipping unreadable journal line"),
            }
        }
    }
    Ok(clock)
}

impl FileJournal {
    pub fn open(url: &BrokerUrl) -> Result<Arc<FileJournal>> {
        let dir = PathBuf::from(&url.path);
        if url.path.is_empty() {
            return Err(crate::error::Error::InvalidUrl(format!(
                "file journal needs a path: {}",
                url.url
            )));
        }
        fs::create_dir_all(&dir)?;
        let stored = scan(&dir)?;

        let id = if url.id != RESERVED_ID { url.id } else { random_id() };
        let url = url.clone();
        let journal: Arc<FileJournal> = Arc::new_cyclic(|weak| {
            let weak: std::sync::Weak<FileJournal> = weak.clone();
            let this: super::BrokerWeak = weak;
            FileJournal { core: Core::new(id, url, this), dir, write_lock: Mutex::new(()) }
        });
        journal.core.restore_clock(stored);
        journal.core.seed_own_id();
        Ok(journal)
    }

    pub fn filename(&self) -> PathBuf {
        journal_file(&self.dir, self.core.id())
    }
}

impl Broker for FileJournal {
    fn id(&self) -> Id {
        self.core.id()
    }

    fn url(&self) -> String {
        self.core.url()
    }

    fn scheme(&self) -> &'static str {
        "file"
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

    /// One appended line per accepted entry, flushed before returning.
    fn save(&self, entry: &Entry) -> bool {
        let _guard = self.write_lock.lock();
        if self.entry(&entry.clock).valid() {
            debug!(stamp = %entry.clock, "save: duplicate");
            return false;
        }
        if !admits(&self.core.clock(), self.core.id(), entry) {
            debug!(stamp = %entry.clock, "save: gap in own slot");
            return false;
        }

        let path = journal_file(&self.dir, entry.data.id);
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| {
                writeln!(file, "{entry}")?;
                file.flush()
            });
        match appended {
            Ok(()) => true,
            Err(err) => {
                warn!(?path, %err, "save: append failed");
                false
            }
        }
    }

    /// Seeks each `(id, count)` pair of the queried stamp to the
    /// `count`-th line of that id's file and returns the record iff the
    /// stored stamp matches exactly.
    fn entry(&self, clock: &Clock) -> Data {
        for (id, count) in clock.iter() {
            let Some(line) = read_line(&journal_file(&self.dir, id), count) else {
                break;
            };
            if let Ok(entry) = line.parse::<Entry>() {
                if entry.clock == *clock {
                    return entry.data;
                }
            }
        }
        Data::missing()
    }

    /// Replays the clock: the first `count` lines of each id's file.
    fn entries(&self) -> Vec<Entry> {
        let mut out = Vec::new();
        for (id, count) in self.core.clock().iter() {
            let path = journal_file(&self.dir, id);
            let Ok(file) = File::open(&path) else {
                continue;
            };
            for line in BufReader::new(file).lines().take(count as usize) {
                match line.map_err(crate::error::Error::from).and_then(|l| l.parse::<Entry>()) {
                    Ok(entry) => out.push(entry),
                    Err(err) => warn!(?path, %err, "skipping unreadable journal line"),
                }
            }
        }
        out
    }
}

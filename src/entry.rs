//! The record model: a stamped, immutable ledger entry.
//!
//! `Data` is what an actor writes: its id, a signed amount, and the
//! `alters` clock naming the record it supersedes (empty for a plain
//! insert; an erase is a supersession with amount zero). `Entry` pairs
//! a `Data` with the causal stamp produced at its origin; the stamp is
//! the record's primary key inside a journal.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::text::{Cursor, CLOSE_CURLY, COMMA, OPEN_CURLY};
use crate::types::{Amount, Id, RESERVED_ID};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub id: Id,
    pub value: Amount,
    pub alters: Clock,
}

impl Data {
    /// A plain insert by `id`.
    pub fn insert(id: Id, value: Amount) -> Self {
        Self { id, value, alters: Clock::new() }
    }

    /// Sentinel returned by journal lookups that find nothing.
    pub fn missing() -> Self {
        Self { id: RESERVED_ID, value: 0, alters: Clock::invalid() }
    }

    /// A record is valid unless its `alters` clock is the sentinel.
    pub fn valid(&self) -> bool {
        self.alters.is_empty() || self.alters.valid()
    }

    pub fn read(cur: &mut Cursor) -> Result<Data> {
        cur.expect(OPEN_CURLY)?;
        let id = cur.hex_u64()?;
        cur.expect(COMMA)?;
        let value = cur.dec_i64()?;
        cur.expect(COMMA)?;
        let alters = Clock::read(cur)?;
        cur.expect(CLOSE_CURLY)?;
        Ok(Data { id, value, alters })
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:x}, {}, {}}}", self.id, self.value, self.alters)
    }
}

impl FromStr for Data {
    type Err = Error;

    fn from_str(text: &str) -> Result<Data> {
        let mut cur = Cursor::new(text);
        let data = Data::read(&mut cur)?;
        if !cur.at_end() {
            return Err(Error::Parse(format!("trailing input after data: {text:?}")));
        }
        Ok(data)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub clock: Clock,
    pub data: Data,
}

impl Entry {
    pub fn new(clock: Clock, data: Data) -> Self {
        Self { clock, data }
    }

    pub fn read(cur: &mut Cursor) -> Result<Entry> {
        cur.expect(OPEN_CURLY)?;
        let clock = Clock::read(cur)?;
        cur.expect(COMMA)?;
        let data = Data::read(cur)?;
        cur.expect(CLOSE_CURLY)?;
        Ok(Entry { clock, data })
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}}}", self.clock, self.data)
    }
}

impl FromStr for Entry {
    type Err = Error;

    fn from_str(text: &str) -> Result<Entry> {
        let mut cur = Cursor::new(text);
        let entry = Entry::read(&mut cur)?;
        if !cur.at_end() {
            return Err(Error::Parse(format!("trailing input after entry: {text:?}")));
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_empty_data() {
        assert_eq!(Data::default().to_string(), "{0, 0, {}}");
    }

    #[test]
    fn missing_sentinel_is_invalid() {
        assert!(!Data::missing().valid());
        assert!(Data::insert(0xAA, 10).valid());
        let replace = Data { id: 0xAA, value: 5, alters: Clock::from([(0xFF, 1)]) };
        assert!(replace.valid());
    }

    #[test]
    fn data_round_trip() {
        for data in [
            Data::insert(0xAA, 1000),
            Data::insert(0xBAAD_CAFE, -250),
            Data { id: 0xFF, value: 0, alters: Clock::from([(0xFF, 1)]) },
            Data { id: 0xAA, value: 50, alters: Clock::from([(0xAA, 1), (0xFF, 2)]) },
        ] {
            assert_eq!(data.to_string().parse::<Data>().unwrap(), data);
        }
    }

    #[test]
    fn entry_round_trip() {
        let entry = Entry::new(
            Clock::from([(0xBAAD_CAFE, 1)]),
            Data::insert(0xBAAD_CAFE, 10),
        );
        let text = entry.to_string();
        assert_eq!(text, "{{{baadcafe, 1}}, {baadcafe, 10, {}}}");
        assert_eq!(text.parse::<Entry>().unwrap(), entry);
    }

    #[test]
    fn entry_parse_accepts_whitespace() {
        let entry: Entry = " { { {aa, 1} } , { aa , 10 , { } } } ".parse().unwrap();
        assert_eq!(entry.clock, Clock::from([(0xAA, 1)]));
        assert_eq!(entry.data, Data::insert(0xAA, 10));
    }

    #[test]
    fn entry_parse_rejects_malformed_input() {
        assert!("{{aa, 1}, {aa, 10, {}}}".parse::<Entry>().is_err());
        assert!("{{{aa, 1}}, {aa, 10}}".parse::<Entry>().is_err());
        assert!("{{{aa, 1}}, {aa, 10, {}}} tail".parse::<Entry>().is_err());
    }
}

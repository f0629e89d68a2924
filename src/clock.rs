//! Per-actor vector clock.
//!
//! A clock maps actor ids to tick counts and forms a join-semilattice
//! under pointwise maximum. Two clocks compare as smaller/greater when
//! one dominates the other and as concurrent otherwise. Zero-count
//! slots carry no information and are stripped at construction, with
//! one exception: the reserved id `0` is kept so `{{0, 0}}` can serve
//! as the invalid-clock sentinel.

use crate::error::{Error, Result};
use crate::text::{Cursor, CLOSE_CURLY, COMMA, OPEN_CURLY};
use crate::types::{Id, Time, RESERVED_ID};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Clock(BTreeMap<Id, Time>);

impl Clock {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The `{{0, 0}}` sentinel. Never produced by merge or tick.
    pub fn invalid() -> Self {
        let mut slots = BTreeMap::new();
        slots.insert(RESERVED_ID, 0);
        Self(slots)
    }

    /// A clock contains the reserved id only when it is the sentinel.
    pub fn valid(&self) -> bool {
        !self.0.contains_key(&RESERVED_ID)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The tick count for `id`; absent slots read as zero.
    pub fn get(&self, id: Id) -> Time {
        self.0.get(&id).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, Time)> + '_ {
        self.0.iter().map(|(id, time)| (*id, *time))
    }

    /// Pointwise maximum. Commutative, associative, idempotent.
    /// Zero-count slots in `other` are treated as absent.
    pub fn merge(&self, other: &Clock) -> Clock {
        let mut out = self.0.clone();
        for (&id, &time) in &other.0 {
            if time == 0 && id != RESERVED_ID {
                continue;
            }
            let slot = out.entry(id).or_insert(0);
            if time > *slot {
                *slot = time;
            }
        }
        Clock(out)
    }

    /// Self with `id`'s slot advanced by one (inserted at one if absent).
    pub fn tick(&self, id: Id) -> Clock {
        let mut out = self.0.clone();
        *out.entry(id).or_insert(0) += 1;
        Clock(out)
    }

    /// Strict domination: `self` differs from `other` and merging adds
    /// nothing to `other`.
    pub fn smaller_than(&self, other: &Clock) -> bool {
        *self != *other && self.merge(other) == *other
    }

    /// Neither clock dominates the other.
    pub fn concurrent(&self, other: &Clock) -> bool {
        *self != *other && !self.smaller_than(other) && !other.smaller_than(self)
    }

    /// True when this clock advances `other`'s slot for `id` by exactly
    /// one. Journals use this for gap detection on their own slot.
    pub fn is_next(&self, other: &Clock, id: Id) -> bool {
        match self.0.get(&id) {
            None => false,
            Some(&mine) => match other.0.get(&id) {
                None => mine == 1,
                Some(&theirs) => mine == theirs + 1,
            },
        }
    }

    /// Total tick count across all slots. Any ordering by this value is
    /// a linear extension of the causal order: a dominated clock always
    /// carries strictly fewer ticks.
    pub fn ticks(&self) -> u64 {
        self.0.values().sum()
    }

    /// Reads one clock off the cursor, stripping zero-count slots.
    pub fn read(cur: &mut Cursor) -> Result<Clock> {
        cur.expect(OPEN_CURLY)?;
        let mut slots = BTreeMap::new();
        if cur.peek() == Some(OPEN_CURLY) {
            loop {
                cur.expect(OPEN_CURLY)?;
                let id = cur.hex_u64()?;
                cur.expect(COMMA)?;
                let time = cur.dec_u64()?;
                cur.expect(CLOSE_CURLY)?;
                if time != 0 || id == RESERVED_ID {
                    slots.insert(id, time);
                }
                if !cur.accept(COMMA) {
                    break;
                }
            }
        }
        cur.expect(CLOSE_CURLY)?;
        Ok(Clock(slots))
    }
}

impl<const N: usize> From<[(Id, Time); N]> for Clock {
    fn from(pairs: [(Id, Time); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .filter(|&(id, time)| time != 0 || id == RESERVED_ID)
                .collect(),
        )
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (id, time)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{{{id:x}, {time}}}")?;
        }
        write!(f, "}}")
    }
}

impl FromStr for Clock {
    type Err = Error;

    fn from_str(text: &str) -> Result<Clock> {
        let mut cur = Cursor::new(text);
        let clock = Clock::read(&mut cur)?;
        if !cur.at_end() {
            return Err(Error::Parse(format!("trailing input after clock: {text:?}")));
        }
        Ok(clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_pointwise_max() {
        let a = Clock::from([(0xAA, 2), (0xBB, 1)]);
        let b = Clock::from([(0xAA, 1), (0xCC, 3)]);
        let merged = Clock::from([(0xAA, 2), (0xBB, 1), (0xCC, 3)]);
        assert_eq!(a.merge(&b), merged);
        assert_eq!(b.merge(&a), merged);
        assert_eq!(merged.merge(&merged), merged);
    }

    #[test]
    fn tick_advances_one_slot() {
        let a = Clock::new().tick(0xAA);
        assert_eq!(a, Clock::from([(0xAA, 1)]));
        assert_eq!(a.tick(0xAA), Clock::from([(0xAA, 2)]));
        assert_eq!(a.tick(0xBB), Clock::from([(0xAA, 1), (0xBB, 1)]));
    }

    #[test]
    fn domination_and_concurrency() {
        let a = Clock::from([(0xAA, 1)]);
        let b = Clock::from([(0xAA, 1), (0xBB, 1)]);
        let c = Clock::from([(0xAA, 2)]);

        assert!(a.smaller_than(&b));
        assert!(!b.smaller_than(&a));
        assert!(!a.smaller_than(&a));
        assert!(b.concurrent(&c));
        assert!(c.concurrent(&b));
        assert!(!a.concurrent(&a));
    }

    #[test]
    fn zero_slots_are_stripped_at_construction() {
        let clock = Clock::from([(0xAA, 1), (0xBAAD, 0), (0xCAFE, 0)]);
        assert_eq!(clock, Clock::from([(0xAA, 1)]));
        assert_eq!(clock.len(), 1);
    }

    #[test]
    fn zero_slots_are_ignored_by_merge() {
        let zeroed: Clock = "{{cc, 1}, {aa, 0}, {bb, 0}}".parse().unwrap();
        let merged = Clock::new().merge(&zeroed);
        assert_eq!(merged, Clock::from([(0xCC, 1)]));
        assert_eq!(merged.get(0xAA), 0);
        assert_eq!(merged.get(0xBB), 0);
    }

    #[test]
    fn invalid_sentinel() {
        assert!(Clock::new().valid());
        assert!(!Clock::invalid().valid());
        assert_eq!(Clock::invalid().to_string(), "{{0, 0}}");
    }

    #[test]
    fn is_next_detects_gaps() {
        let journal = Clock::from([(0xAA, 1)]);
        assert!(Clock::from([(0xAA, 2)]).is_next(&journal, 0xAA));
        assert!(!Clock::from([(0xAA, 3)]).is_next(&journal, 0xAA));
        assert!(Clock::from([(0xBB, 1)]).is_next(&journal, 0xBB));
        assert!(!Clock::from([(0xBB, 2)]).is_next(&journal, 0xBB));
        assert!(!Clock::new().is_next(&journal, 0xAA));
    }

    #[test]
    fn display_round_trip() {
        for clock in [
            Clock::new(),
            Clock::from([(0xAA, 1)]),
            Clock::from([(0xAA, 1), (0xBB, 7)]),
            Clock::from([(0xBAAD_CAFE, 42), (0xFF, 3)]),
        ] {
            let text = clock.to_string();
            assert_eq!(text.parse::<Clock>().unwrap(), clock);
        }
    }

    #[test]
    fn parse_accepts_whitespace_anywhere() {
        let clock: Clock = " { { aa , 1 } , { bb , 2 } } ".parse().unwrap();
        assert_eq!(clock, Clock::from([(0xAA, 1), (0xBB, 2)]));
        let empty: Clock = "{ }".parse().unwrap();
        assert_eq!(empty, Clock::new());
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!("".parse::<Clock>().is_err());
        assert!("{{aa}}".parse::<Clock>().is_err());
        assert!("{{aa, 1}".parse::<Clock>().is_err());
        assert!("{{xyz, 1}}".parse::<Clock>().is_err());
        assert!("{{aa, one}}".parse::<Clock>().is_err());
    }
}

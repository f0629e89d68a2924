//! Core identifier types and sentinels shared by every module.

use crate::error::{Error, Result};

/// Actor identifier. Drawn at random when a broker URL carries none.
/// Printed lowercase-hex everywhere; `0` is reserved as "unset".
pub type Id = u64;

/// Per-actor logical counter. Strictly increasing, one tick per entry.
pub type Time = u64;

/// Signed monetary amount carried by an entry.
pub type Amount = i64;

/// Broker-local connection handle: an index into the connection table.
/// Signed so the invalid sentinel fits; slot `0` is always "self".
pub type Source = i32;

/// The reserved "unset" actor id.
pub const RESERVED_ID: Id = 0;

/// Connection-table slot of the broker itself.
pub const SELF_SOURCE: Source = 0;

/// Sentinel for "no such connection".
pub const INVALID_SOURCE: Source = -1;

/// Draws a random non-reserved actor id.
pub fn random_id() -> Id {
    loop {
        let id: Id = rand::random();
        if id != RESERVED_ID {
            return id;
        }
    }
}

/// Parses a lowercase-hex actor id, e.g. `baadcafe`.
pub fn parse_id(text: &str) -> Result<Id> {
    Id::from_str_radix(text, 16).map_err(|_| Error::Parse(format!("bad hex id: {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_ids() {
        assert_eq!(parse_id("aa").unwrap(), 0xAA);
        assert_eq!(parse_id("baadcafe").unwrap(), 0xBAAD_CAFE);
        assert!(parse_id("xyz").is_err());
        assert!(parse_id("").is_err());
    }

    #[test]
    fn random_ids_are_never_reserved() {
        for _ in 0..64 {
            assert_ne!(random_id(), RESERVED_ID);
        }
    }
}

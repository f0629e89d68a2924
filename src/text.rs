//! Byte cursor for the textual record grammar.
//!
//! The grammar is brace-delimited with whitespace permitted around any
//! terminal:
//!
//! ```text
//! Clock  = '{' [ Pair (',' Pair)* ] '}'
//! Pair   = '{' hex-id ',' dec-time '}'
//! Data   = '{' hex-id ',' dec-amount ',' Clock '}'
//! Entry  = '{' Clock ',' Data '}'
//! ```

use crate::error::{Error, Result};

pub const OPEN_CURLY: u8 = b'{';
pub const CLOSE_CURLY: u8 = b'}';
pub const COMMA: u8 = b',';

/// Forward-only scanner over one textual record.
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { bytes: text.as_bytes(), pos: 0 }
    }

    pub fn skip_spaces(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// The next non-space byte, without consuming it.
    pub fn peek(&mut self) -> Option<u8> {
        self.skip_spaces();
        self.bytes.get(self.pos).copied()
    }

    /// Consumes `expected` (skipping leading spaces) or fails.
    pub fn expect(&mut self, expected: u8) -> Result<()> {
        self.skip_spaces();
        match self.bytes.get(self.pos) {
            Some(&b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            other => Err(Error::Parse(format!(
                "expected {:?} at byte {}, found {:?}",
                expected as char,
                self.pos,
                other.map(|b| *b as char)
            ))),
        }
    }

    /// Consumes `expected` if it is the next non-space byte.
    pub fn accept(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn hex_u64(&mut self) -> Result<u64> {
        self.skip_spaces();
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_hexdigit() {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(Error::Parse(format!("expected hex number at byte {start}")));
        }
        let digits = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| Error::Parse("non-utf8 input".into()))?;
        u64::from_str_radix(digits, 16)
            .map_err(|_| Error::Parse(format!("hex number out of range: {digits}")))
    }

    pub fn dec_u64(&mut self) -> Result<u64> {
        self.skip_spaces();
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(Error::Parse(format!("expected number at byte {start}")));
        }
        let digits = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| Error::Parse("non-utf8 input".into()))?;
        digits
            .parse::<u64>()
            .map_err(|_| Error::Parse(format!("number out of range: {digits}")))
    }

    pub fn dec_i64(&mut self) -> Result<i64> {
        self.skip_spaces();
        let negative = self.accept(b'-');
        let magnitude = self.dec_u64()?;
        if negative {
            Ok(-(magnitude as i64))
        } else {
            Ok(magnitude as i64)
        }
    }

    /// True once only trailing whitespace remains.
    pub fn at_end(&mut self) -> bool {
        self.skip_spaces();
        self.pos == self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_spaces_around_terminals() {
        let mut cur = Cursor::new("  {  aa , 12 }  ");
        cur.expect(OPEN_CURLY).unwrap();
        assert_eq!(cur.hex_u64().unwrap(), 0xAA);
        cur.expect(COMMA).unwrap();
        assert_eq!(cur.dec_u64().unwrap(), 12);
        cur.expect(CLOSE_CURLY).unwrap();
        assert!(cur.at_end());
    }

    #[test]
    fn negative_amounts() {
        let mut cur = Cursor::new("-250");
        assert_eq!(cur.dec_i64().unwrap(), -250);
    }

    #[test]
    fn rejects_missing_terminals() {
        let mut cur = Cursor::new("aa, 1}");
        assert!(cur.expect(OPEN_CURLY).is_err());
    }
}

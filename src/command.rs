//! REPL command grammar.
//!
//! One command per line: `connect <url>`, `disconnect <source>`,
//! `add <amount> [<clock>]`, `relay <hex-id> <amount> [<clock>]`,
//! `sources`, `list`, `quit`. The optional clock argument turns an add
//! into a replace of the named record.

use crate::clock::Clock;
use crate::entry::Data;
use crate::error::{Error, Result};
use crate::text::Cursor;
use crate::types::{Amount, Source, RESERVED_ID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect { url: String },
    Disconnect { source: Source },
    /// `data.id` is the reserved id until the executing broker fills
    /// in its own.
    Add { data: Data },
    Relay { data: Data },
    Sources,
    List,
    Quit,
}

/// Parses one input line; `None` for blank lines.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (trimmed, ""),
    };

    let command = match name {
        "connect" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                return Err(Error::Parse("usage: connect <url>".into()));
            }
            Command::Connect { url: rest.to_string() }
        }
        "disconnect" => {
            let source = rest
                .parse::<Source>()
                .map_err(|_| Error::Parse("usage: disconnect <source>".into()))?;
            Command::Disconnect { source }
        }
        "add" => {
            let mut cur = Cursor::new(rest);
            let (value, alters) = value_and_optional_clock(&mut cur)?;
            Command::Add { data: Data { id: RESERVED_ID, value, alters } }
        }
        "relay" => {
            let mut cur = Cursor::new(rest);
            let id = cur.hex_u64()?;
            let (value, alters) = value_and_optional_clock(&mut cur)?;
            Command::Relay { data: Data { id, value, alters } }
        }
        "sources" => Command::Sources,
        "list" => Command::List,
        "quit" => Command::Quit,
        unknown => return Err(Error::Parse(format!("unknown command: {unknown}"))),
    };
    Ok(Some(command))
}

fn value_and_optional_clock(cur: &mut Cursor) -> Result<(Amount, Clock)> {
    let value = cur.dec_i64()?;
    if cur.at_end() {
        return Ok((value, Clock::new()));
    }
    let clock = Clock::read(cur)?;
    if !cur.at_end() {
        return Err(Error::Parse("trailing input after clock".into()));
    }
    Ok((value, clock))
}

pub fn help() -> &'static str {
    "  connect <url>                      Connect to another broker: 'connect 0.0.0.0:5000'.
  disconnect <source>                Drop a connection by its source number: 'disconnect 1'.
  add <amount> [<clock>]             Append locally, or replace the record stamped <clock>: 'add 100 {{aaff, 1}}'.
  relay <hex-id> <amount> [<clock>]  Route an addition to the id's owner: 'relay aaff 10'.
  sources                            Print this broker's data sources.
  list                               List commands.
  quit                               Quit.
"
}

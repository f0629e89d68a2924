//! Crate-wide error type.
//!
//! Broker operations themselves never fail with an `Err`; the protocol
//! surfaces problems as sentinel return values (invalid clock, `false`,
//! empty list). This type covers everything around the protocol: the
//! textual grammar, URLs, journal storage, and the wire transport.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed textual record (clock, data, entry, or command).
    #[error("parse error: {0}")]
    Parse(String),

    /// Broker URL that does not match `scheme://[id@]host[:port][/path]`.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// URL scheme with no registered builder.
    #[error("unknown scheme: {0}")]
    UnknownScheme(String),

    /// Journal storage failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wire transport failure; callers see the invalid-clock sentinel.
    #[error("transport: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;

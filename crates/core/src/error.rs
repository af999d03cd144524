//! The unified error hierarchy for Bramble
//!
//! Every fallible operation in the workspace returns `bramble_core::Result`.
//! We use `thiserror` for `Display`/`std::error::Error`, matching the rest
//! of the codebase's error-handling convention.
//!
//! ## Error categories
//!
//! These map directly onto the propagation policy described for the
//! dispatcher: `Validation`/`WrongType`/`NotFound`/`OutOfBounds`/`Cancelled`
//! become RESP error replies to the client; `Io` from AOF append is logged
//! and swallowed; `Io` from snapshot operations and `Fatal` propagate to the
//! caller (and, for `Fatal` during restore, to process startup).

use std::io;
use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all Bramble operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed arguments, unknown flag, bad numeric literal, wrong arity,
    /// mutually exclusive flags, or a negative count/offset where a
    /// non-negative one is required.
    #[error("ERR {0}")]
    Validation(String),

    /// Operation attempted against a key whose existing `TypedValue` tag
    /// disagrees with the operation's required tag.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// A key or member required by the operation was not present.
    #[error("ERR no such key: {0}")]
    NotFound(String),

    /// An index or rank fell outside the addressable range for the value.
    #[error("ERR index out of range: {0}")]
    OutOfBounds(String),

    /// I/O failure while appending to, reading, or syncing a durability
    /// artifact (AOF file or snapshot).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The operation's context was cancelled before it could complete.
    #[error("ERR operation cancelled")]
    Cancelled,

    /// A durability artifact (manifest or state file) was corrupt or
    /// otherwise unparseable. Always fatal to startup.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl Error {
    /// True for the error kinds that are safe to surface directly to a
    /// client as a RESP error reply, rather than being an internal/fatal
    /// condition.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::WrongType
                | Error::NotFound(_)
                | Error::OutOfBounds(_)
                | Error::Cancelled
        )
    }

    /// The short code tag RESP clients expect at the start of an error
    /// message (e.g. `WRONGTYPE`, `ERR`).
    pub fn resp_prefix(&self) -> &'static str {
        match self {
            Error::WrongType => "WRONGTYPE",
            _ => "ERR",
        }
    }

    /// Shorthand for a validation error built from a `Display`-able message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

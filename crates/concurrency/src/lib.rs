//! Per-key reader-writer locking for the keyspace engine.
//!
//! One lock per `(db, key)` pair, stored in a sharded concurrent map so two
//! unrelated keys never contend on each other. A `LockContext` scopes the
//! locks a single command (or transaction-like batch of commands) holds,
//! and makes re-acquisition from the same context idempotent rather than
//! self-deadlocking.

#![warn(missing_docs)]

mod manager;

pub use manager::{LockContext, LockManager};

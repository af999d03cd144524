//! Core types shared across the Bramble workspace
//!
//! This crate defines the foundations every other crate builds on:
//! - `Error`/`Result`: the unified error hierarchy (see `error`)
//! - `Clock`: a mockable time source for deterministic expiry tests
//! - `Key`: a database-scoped byte-string key
//!
//! The typed value container (`TypedValue`, spec component C4) lives in
//! `bramble-storage` instead of here, because it embeds the sorted-set core
//! (`bramble-zset`, component C3) as one of its variants — putting it in
//! this crate would make `bramble-core` depend on `bramble-zset`, which
//! itself only needs `bramble-core` for `Error`. `bramble-core` depends on
//! nothing else in the workspace.

#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use key::{DbIndex, Key};

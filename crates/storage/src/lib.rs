//! The keyspace engine: typed values, per-key entries, expiry, eviction,
//! and the sampled-cohort background scanners, built on the lock manager
//! from `bramble-concurrency` and the sorted-set core from `bramble-zset`.

#![warn(missing_docs)]

pub mod entry;
pub mod eviction;
pub mod expiry;
pub mod keyspace;
pub mod value;

pub use entry::Entry;
pub use eviction::{run_eviction_tick, EvictionConfig, EvictionPolicy};
pub use expiry::run_expiry_tick;
pub use keyspace::{CohortEntry, ExpiryFlags, Keyspace};
pub use value::TypedValue;

//! The persistence engine (component C6): AOF (preamble + command log +
//! sync strategy + rewrite) and point-in-time snapshotting, plus the
//! process-wide mode coordination the two share.
//!
//! Snapshot and AOF are alternatives, not layered — `bramble-engine` wires
//! up whichever `restore_aof`/`restore_snapshot` configuration selects,
//! snapshot taking priority per spec.md §4.6.2.

#![warn(missing_docs)]

pub mod aof;
pub mod mode;
pub mod snapshot;
pub mod state;

pub use aof::{AofWriter, SyncStrategy};
pub use mode::{PersistenceCoordinator, PersistenceMode};
pub use snapshot::{SnapshotEngine, SnapshotOutcome};
pub use state::{from_stored_value, to_stored_value, StateSnapshot, StoredValue};

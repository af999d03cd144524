//! The command engine: the dispatch registry (component C7), the per-type
//! command handlers it routes to, and the `Database` that wires the
//! keyspace engine to the persistence engine and runs commands through
//! both.

#![warn(missing_docs)]

pub mod background;
pub mod commands;
pub mod database;
pub mod dispatch;

pub use background::{BackgroundConfig, BackgroundScanner};
pub use database::{Database, DatabaseOptions};
pub use dispatch::{unknown_command_error, Command, HandlerContext, KeySpec};

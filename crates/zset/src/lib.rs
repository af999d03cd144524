//! The sorted-set algorithmic core: an ordered `(score, member)` store with
//! score/lex range queries and weighted, aggregated set algebra.
//!
//! This crate has no notion of keys, databases, or persistence — it is pure
//! data structure and algorithm, consumed by `bramble-storage` as one
//! `TypedValue` variant and manipulated by the sorted-set command handlers
//! in `bramble-engine`.

#![warn(missing_docs)]

pub mod algebra;
pub mod bound;
pub mod set;

pub use algebra::{diff, inter, resolve_weights, union, Aggregate};
pub use bound::{LexBound, LexRange, Limit, ScoreBound, ScoreRange};
pub use set::{AddFlags, SortedSet};

//! The RESP wire codec: decodes client requests into argument vectors and
//! encodes replies back into RESP2 or RESP3 frames.
//!
//! This crate knows nothing about the keyspace or command dispatch — it is
//! pure framing, consumed by `bramble-engine`'s connection loop and by
//! `bramble-durability`'s AOF command log (which stores entries in the same
//! multibulk form a client would have sent).

#![warn(missing_docs)]

pub mod command;
pub mod reply;

pub use command::{decode_command, encode_request};
pub use reply::{encode_reply, format_double, Encoding, Reply};

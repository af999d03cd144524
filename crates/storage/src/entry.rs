//! A single keyspace entry: its typed value plus expiry and access metadata.

use std::time::Instant;

use crate::value::TypedValue;

/// One live key's data, as stored in a [`crate::keyspace::Keyspace`]
/// database map.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The payload.
    pub value: TypedValue,
    /// Absolute expiry instant; `None` means the key never expires.
    pub expire_at: Option<Instant>,
    /// The instant of the most recent successful read or write touching
    /// this key. Drives LRU eviction.
    pub last_access: Instant,
    /// A monotone counter of accesses. Drives LFU eviction.
    pub access_count: u64,
}

impl Entry {
    /// Wrap a fresh value with no expiry, access metadata stamped at `now`.
    pub fn new(value: TypedValue, now: Instant) -> Self {
        Entry {
            value,
            expire_at: None,
            last_access: now,
            access_count: 1,
        }
    }

    /// Whether this entry's expiry has passed as of `now`. An entry whose
    /// `expire_at` is exactly `now` counts as expired (spec: `expire_at <=
    /// now` is non-existent).
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expire_at, Some(at) if at <= now)
    }

    /// Record an access, bumping `last_access` and `access_count`.
    pub fn touch(&mut self, now: Instant) {
        self.last_access = now;
        self.access_count = self.access_count.saturating_add(1);
    }
}

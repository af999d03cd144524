//! The serializable mirror of `TypedValue` and the full-keyspace snapshot
//! shape shared by the AOF preamble and the snapshot engine.
//!
//! `bramble-storage::TypedValue` deliberately carries no `serde` impl — the
//! keyspace engine has no business knowing about on-disk formats. This
//! module owns the boundary: convert to/from a plain `serde`-derived enum
//! here, at the one place that needs it.

use std::collections::VecDeque;

use bramble_storage::{Keyspace, TypedValue};
use bramble_core::DbIndex;
use bramble_zset::SortedSet;
use serde::{Deserialize, Serialize};

/// On-disk mirror of [`TypedValue`]. Field order matches the variant it
/// mirrors; the sorted set is stored as an explicit `(member, score)` list
/// since `SortedSet` has no internal notion of serialization either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoredValue {
    /// Mirrors `TypedValue::Str`.
    Str(Vec<u8>),
    /// Mirrors `TypedValue::List`.
    List(VecDeque<Vec<u8>>),
    /// Mirrors `TypedValue::Set`.
    Set(Vec<Vec<u8>>),
    /// Mirrors `TypedValue::Hash`.
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
    /// Mirrors `TypedValue::SortedSet`, as an explicit member/score list.
    SortedSet(Vec<(Vec<u8>, f64)>),
}

/// One key's durable state: its value and its expiry, expressed as
/// milliseconds since the Unix epoch (an `Instant` cannot be serialized).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// The key's raw bytes.
    pub key: Vec<u8>,
    /// The key's value.
    pub value: StoredValue,
    /// The key's expiry, if any, in epoch milliseconds.
    pub expire_at_millis: Option<i64>,
}

/// One database's worth of stored entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDatabase {
    /// The database index.
    pub database: u16,
    /// Every live key in that database at capture time.
    pub entries: Vec<StoredEntry>,
}

/// The full keyspace, as written to the AOF preamble or a snapshot's
/// `state.bin`.
pub type StateSnapshot = Vec<StoredDatabase>;

/// Convert a live value into its durable mirror.
pub fn to_stored_value(value: &TypedValue) -> StoredValue {
    match value {
        TypedValue::Str(b) => StoredValue::Str(b.clone()),
        TypedValue::List(l) => StoredValue::List(l.clone()),
        TypedValue::Set(s) => StoredValue::Set(s.iter().cloned().collect()),
        TypedValue::Hash(h) => StoredValue::Hash(h.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        TypedValue::SortedSet(z) => {
            StoredValue::SortedSet(z.iter().map(|(m, s)| (m.to_vec(), s)).collect())
        }
    }
}

/// Rebuild a live value from its durable mirror.
pub fn from_stored_value(stored: StoredValue) -> TypedValue {
    match stored {
        StoredValue::Str(b) => TypedValue::Str(b),
        StoredValue::List(l) => TypedValue::List(l),
        StoredValue::Set(items) => TypedValue::Set(items.into_iter().collect()),
        StoredValue::Hash(items) => TypedValue::Hash(items.into_iter().collect()),
        StoredValue::SortedSet(items) => {
            let mut z = SortedSet::new();
            for (member, score) in items {
                z.set_score(member, score);
            }
            TypedValue::SortedSet(z)
        }
    }
}

/// Capture every unexpired key across every database into a durable
/// snapshot, grouped by database the way the AOF preamble and `state.bin`
/// both expect.
pub fn capture(keyspace: &Keyspace) -> StateSnapshot {
    let mut by_db: Vec<StoredDatabase> = (0..keyspace.num_databases())
        .map(|i| StoredDatabase {
            database: i,
            entries: Vec::new(),
        })
        .collect();
    for (db, key, value, expire_at_millis) in keyspace.export_state() {
        by_db[db.0 as usize].entries.push(StoredEntry {
            key,
            value: to_stored_value(&value),
            expire_at_millis,
        });
    }
    by_db
}

/// Install every entry in `snapshot` into `keyspace`, dropping keys already
/// expired as of now (`Keyspace::install_entry` performs that check).
pub fn restore(keyspace: &Keyspace, snapshot: StateSnapshot) {
    for db in snapshot {
        for entry in db.entries {
            keyspace.install_entry(
                DbIndex(db.database),
                entry.key,
                from_stored_value(entry.value),
                entry.expire_at_millis,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bramble_core::SystemClock;
    use std::sync::Arc;

    #[test]
    fn capture_then_restore_round_trips_values() {
        let ks = Keyspace::new(2, Arc::new(SystemClock));
        ks.set_value(DbIndex(0), b"str", TypedValue::Str(b"v".to_vec()));
        ks.get_or_create_mut(DbIndex(0), b"list", TypedValue::empty_list, |v| {
            v.as_list_mut()?.push_back(b"a".to_vec());
            Ok(())
        })
        .unwrap();
        ks.get_or_create_mut(DbIndex(1), b"zset", TypedValue::empty_sorted_set, |v| {
            v.as_sorted_set_mut()?.set_score(b"m".to_vec(), 1.5);
            Ok(())
        })
        .unwrap();

        let snapshot = capture(&ks);
        let json = serde_json::to_vec(&snapshot).unwrap();
        let parsed: StateSnapshot = serde_json::from_slice(&json).unwrap();

        let restored = Keyspace::new(2, Arc::new(SystemClock));
        restore(&restored, parsed);

        assert_eq!(
            restored.get_value(DbIndex(0), b"str").unwrap().as_str().unwrap(),
            b"v"
        );
        assert_eq!(restored.get_value(DbIndex(0), b"list").unwrap().as_list().unwrap().len(), 1);
        assert_eq!(
            restored
                .get_value(DbIndex(1), b"zset")
                .unwrap()
                .as_sorted_set()
                .unwrap()
                .score(b"m"),
            Some(1.5)
        );
    }

    #[test]
    fn capture_drops_expired_keys() {
        let ks = Keyspace::new(1, Arc::new(SystemClock));
        ks.set_value(DbIndex(0), b"gone", TypedValue::Str(b"x".to_vec()));
        let now = ks.clock().now();
        ks.set_expiry(DbIndex(0), b"gone", now, Default::default()).unwrap();
        let snapshot = capture(&ks);
        assert!(snapshot.iter().all(|d| d.entries.is_empty()));
    }
}

//! Keys and database indices
//!
//! Per spec: a key is a UTF-8 byte string, unique within a database; a
//! database is an integer index in `[0, N)`. `Key` bundles the two so the
//! keyspace engine and lock manager can use one hashable/orderable type
//! instead of threading `(DbIndex, Vec<u8>)` tuples everywhere.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A database namespace index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DbIndex(pub u16);

impl DbIndex {
    /// The default database, index 0.
    pub const DEFAULT: DbIndex = DbIndex(0);
}

impl fmt::Display for DbIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for DbIndex {
    fn from(v: u16) -> Self {
        DbIndex(v)
    }
}

/// A key scoped to a database: raw bytes plus the database it lives in.
///
/// `Key` is `Clone`-cheap relative to the data it addresses (it does not
/// carry the value), and orders by `(db, bytes)` so a `BTreeMap<Key, _>`
/// would group all keys in a database together and sort lexicographically
/// within it — useful for prefix scans even though the primary store here
/// is a hashed map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    /// Which database this key belongs to.
    pub db: DbIndex,
    /// The raw key bytes.
    pub bytes: Vec<u8>,
}

impl Key {
    /// Construct a key from a database index and byte-convertible value.
    pub fn new(db: DbIndex, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            db,
            bytes: bytes.into(),
        }
    }

    /// View the key bytes as a UTF-8 string, if valid.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.db.cmp(&other.db).then_with(|| self.bytes.cmp(&other.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_in_different_dbs_are_not_equal_even_with_same_bytes() {
        let a = Key::new(DbIndex(0), "k");
        let b = Key::new(DbIndex(1), "k");
        assert_ne!(a, b);
    }

    #[test]
    fn ordering_groups_by_db_first() {
        let a = Key::new(DbIndex(0), "zzz");
        let b = Key::new(DbIndex(1), "aaa");
        assert!(a < b);
    }

    #[test]
    fn as_str_roundtrips_utf8() {
        let k = Key::new(DbIndex::DEFAULT, "hello");
        assert_eq!(k.as_str(), Some("hello"));
    }

    #[test]
    fn as_str_rejects_invalid_utf8() {
        let k = Key::new(DbIndex::DEFAULT, vec![0xFF, 0xFE]);
        assert_eq!(k.as_str(), None);
    }
}

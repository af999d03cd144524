//! The typed value container (component C4): a tagged variant over the five
//! value kinds a key can hold, plus the "assert the tag, else WRONGTYPE"
//! contract every command handler builds on.

use std::collections::{HashSet, VecDeque};

use bramble_core::{Error, Result};
use bramble_zset::SortedSet;
use rustc_hash::{FxHashMap, FxHashSet};

/// The payload stored under a key. The tag is fixed for the key's lifetime:
/// a command that requires one tag against a key holding another fails with
/// [`Error::WrongType`] rather than silently coercing.
#[derive(Debug, Clone)]
pub enum TypedValue {
    /// A raw byte string. Numeric commands (`INCR`, `INCRBYFLOAT`, ...)
    /// reinterpret the bytes as a decimal literal.
    Str(Vec<u8>),
    /// An ordered sequence, addressed by position from either end.
    List(VecDeque<Vec<u8>>),
    /// An unordered collection of unique members.
    Set(FxHashSet<Vec<u8>>),
    /// A field-to-value mapping; insertion order is not significant.
    Hash(FxHashMap<Vec<u8>, Vec<u8>>),
    /// A `(score, member)`-ordered collection with unique members.
    SortedSet(SortedSet),
}

impl TypedValue {
    /// An empty string value, the default for `SET`-family auto-creates.
    pub fn empty_str() -> Self {
        TypedValue::Str(Vec::new())
    }

    /// An empty list, the default for `LPUSH`/`RPUSH` on a missing key.
    pub fn empty_list() -> Self {
        TypedValue::List(VecDeque::new())
    }

    /// An empty set, the default for `SADD` on a missing key.
    pub fn empty_set() -> Self {
        TypedValue::Set(HashSet::default())
    }

    /// An empty hash, the default for `HSET` on a missing key.
    pub fn empty_hash() -> Self {
        TypedValue::Hash(FxHashMap::default())
    }

    /// An empty sorted set, the default for `ZADD` on a missing key.
    pub fn empty_sorted_set() -> Self {
        TypedValue::SortedSet(SortedSet::new())
    }

    /// The `TYPE`/`OBJECT ENCODING` tag Redis clients expect.
    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::Str(_) => "string",
            TypedValue::List(_) => "list",
            TypedValue::Set(_) => "set",
            TypedValue::Hash(_) => "hash",
            TypedValue::SortedSet(_) => "zset",
        }
    }

    /// View as a string, or `WRONGTYPE`.
    pub fn as_str(&self) -> Result<&[u8]> {
        match self {
            TypedValue::Str(b) => Ok(b),
            _ => Err(Error::WrongType),
        }
    }

    /// Mutable string view, or `WRONGTYPE`.
    pub fn as_str_mut(&mut self) -> Result<&mut Vec<u8>> {
        match self {
            TypedValue::Str(b) => Ok(b),
            _ => Err(Error::WrongType),
        }
    }

    /// View as a list, or `WRONGTYPE`.
    pub fn as_list(&self) -> Result<&VecDeque<Vec<u8>>> {
        match self {
            TypedValue::List(l) => Ok(l),
            _ => Err(Error::WrongType),
        }
    }

    /// Mutable list view, or `WRONGTYPE`.
    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Vec<u8>>> {
        match self {
            TypedValue::List(l) => Ok(l),
            _ => Err(Error::WrongType),
        }
    }

    /// View as a set, or `WRONGTYPE`.
    pub fn as_set(&self) -> Result<&FxHashSet<Vec<u8>>> {
        match self {
            TypedValue::Set(s) => Ok(s),
            _ => Err(Error::WrongType),
        }
    }

    /// Mutable set view, or `WRONGTYPE`.
    pub fn as_set_mut(&mut self) -> Result<&mut FxHashSet<Vec<u8>>> {
        match self {
            TypedValue::Set(s) => Ok(s),
            _ => Err(Error::WrongType),
        }
    }

    /// View as a hash, or `WRONGTYPE`.
    pub fn as_hash(&self) -> Result<&FxHashMap<Vec<u8>, Vec<u8>>> {
        match self {
            TypedValue::Hash(h) => Ok(h),
            _ => Err(Error::WrongType),
        }
    }

    /// Mutable hash view, or `WRONGTYPE`.
    pub fn as_hash_mut(&mut self) -> Result<&mut FxHashMap<Vec<u8>, Vec<u8>>> {
        match self {
            TypedValue::Hash(h) => Ok(h),
            _ => Err(Error::WrongType),
        }
    }

    /// View as a sorted set, or `WRONGTYPE`.
    pub fn as_sorted_set(&self) -> Result<&SortedSet> {
        match self {
            TypedValue::SortedSet(z) => Ok(z),
            _ => Err(Error::WrongType),
        }
    }

    /// Mutable sorted-set view, or `WRONGTYPE`.
    pub fn as_sorted_set_mut(&mut self) -> Result<&mut SortedSet> {
        match self {
            TypedValue::SortedSet(z) => Ok(z),
            _ => Err(Error::WrongType),
        }
    }
}

//! The keyspace engine (component C5): per-database key maps, per-key
//! locking, expiry, and the sampled-cohort primitives the eviction and
//! expiry scanners build on.

use std::sync::Arc;
use std::time::Instant;

use bramble_concurrency::{LockContext, LockManager};
use bramble_core::{Clock, DbIndex, Error, Key, Result};
use dashmap::DashMap;
use rand::seq::IteratorRandom;

use crate::entry::Entry;
use crate::value::TypedValue;

/// Flags accepted by the `EXPIRE`/`PEXPIRE`/`EXPIREAT`/`PEXPIREAT` family.
/// At most one may be set; the dispatcher layer rejects unknown tokens
/// before they reach here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryFlags {
    /// Set expiry only if the key currently has none.
    pub nx: bool,
    /// Set expiry only if the key already has one.
    pub xx: bool,
    /// Set expiry only if strictly later than the current one.
    pub gt: bool,
    /// Set expiry only if strictly earlier than the current one (a
    /// no-expiry key counts as expiring at `+inf`).
    pub lt: bool,
}

impl ExpiryFlags {
    /// Reject more than one flag being set.
    pub fn validate(&self) -> Result<()> {
        let set = [self.nx, self.xx, self.gt, self.lt]
            .iter()
            .filter(|b| **b)
            .count();
        if set > 1 {
            return Err(Error::validation(
                "NX and XX, GT or LT options at the same time are not compatible",
            ));
        }
        Ok(())
    }
}

/// A snapshot of one key's eviction-relevant metadata, used by the sampled
/// eviction and expiry scanners without holding the map entry open.
#[derive(Debug, Clone)]
pub struct CohortEntry {
    /// The key's raw bytes.
    pub key: Vec<u8>,
    /// When last touched.
    pub last_access: Instant,
    /// Access count, for LFU comparisons.
    pub access_count: u64,
    /// Its expiry, if any.
    pub expire_at: Option<Instant>,
}

/// Owns every database's live entries and the lock manager guarding them.
pub struct Keyspace {
    databases: Vec<DashMap<Vec<u8>, Entry>>,
    locks: LockManager,
    clock: Arc<dyn Clock>,
}

impl Keyspace {
    /// Build a keyspace with `databases` independent namespaces.
    pub fn new(databases: u16, clock: Arc<dyn Clock>) -> Self {
        Keyspace {
            databases: (0..databases).map(|_| DashMap::new()).collect(),
            locks: LockManager::new(),
            clock,
        }
    }

    /// The clock this keyspace stamps access metadata with.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// How many databases this keyspace was configured with.
    pub fn num_databases(&self) -> u16 {
        self.databases.len() as u16
    }

    /// Open a new per-command lock-acquisition scope.
    pub fn lock_context(&self) -> LockContext<'_> {
        self.locks.context()
    }

    fn db(&self, db: DbIndex) -> &DashMap<Vec<u8>, Entry> {
        &self.databases[db.0 as usize]
    }

    fn reap_if_expired(&self, db: DbIndex, key: &[u8]) {
        let now = self.clock.now();
        let expired = self
            .db(db)
            .get(key)
            .map(|e| e.is_expired(now))
            .unwrap_or(false);
        if expired {
            self.db(db).remove(key);
        }
    }

    /// Whether `key` is present and unexpired.
    pub fn key_exists(&self, db: DbIndex, key: &[u8]) -> bool {
        self.reap_if_expired(db, key);
        self.db(db).contains_key(key)
    }

    /// Acquire the write lock on `key` within `ctx`.
    pub fn key_lock(&self, ctx: &mut LockContext<'_>, db: DbIndex, key: &[u8]) {
        ctx.write_lock(&Key::new(db, key.to_vec()));
    }

    /// Acquire the read lock on `key` within `ctx`.
    pub fn key_rlock(&self, ctx: &mut LockContext<'_>, db: DbIndex, key: &[u8]) {
        ctx.read_lock(&Key::new(db, key.to_vec()));
    }

    /// Release any lock `ctx` holds on `key`.
    pub fn unlock(&self, ctx: &mut LockContext<'_>, db: DbIndex, key: &[u8]) {
        ctx.unlock(&Key::new(db, key.to_vec()));
    }

    /// Release any read lock `ctx` holds on `key` (same underlying release
    /// as [`Self::unlock`]; kept as a distinct name to mirror the spec's
    /// paired `key_lock`/`key_rlock`, `unlock`/`runlock` vocabulary).
    pub fn runlock(&self, ctx: &mut LockContext<'_>, db: DbIndex, key: &[u8]) {
        self.unlock(ctx, db, key);
    }

    /// Atomically create a placeholder entry if `key` is absent (holding
    /// an empty string value until the caller's `set_value` fixes the real
    /// type) and take its write lock.
    pub fn create_key_and_lock(&self, ctx: &mut LockContext<'_>, db: DbIndex, key: &[u8]) {
        self.key_lock(ctx, db, key);
        self.reap_if_expired(db, key);
        let now = self.clock.now();
        self.db(db)
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(TypedValue::empty_str(), now));
    }

    /// A clone of `key`'s value, or `None` if absent or expired. Touches
    /// access metadata on a hit.
    pub fn get_value(&self, db: DbIndex, key: &[u8]) -> Option<TypedValue> {
        self.reap_if_expired(db, key);
        let now = self.clock.now();
        self.db(db).get_mut(key).map(|mut e| {
            e.touch(now);
            e.value.clone()
        })
    }

    /// Install `value` under `key`, replacing any prior value and clearing
    /// its type but not its expiry (callers that want to clear TTL on
    /// overwrite do so explicitly, matching `SET`'s default "keep no TTL
    /// unless KEEPTTL" contract being handled at the command layer).
    pub fn set_value(&self, db: DbIndex, key: &[u8], value: TypedValue) {
        let now = self.clock.now();
        self.db(db)
            .entry(key.to_vec())
            .and_modify(|e| {
                e.value = value.clone();
                e.touch(now);
            })
            .or_insert_with(|| Entry::new(value, now));
    }

    /// Read-only access to `key`'s full entry (value plus metadata).
    pub fn with_entry<F, R>(&self, db: DbIndex, key: &[u8], f: F) -> R
    where
        F: FnOnce(Option<&Entry>) -> R,
    {
        self.reap_if_expired(db, key);
        match self.db(db).get(key) {
            Some(e) => f(Some(&e)),
            None => f(None),
        }
    }

    /// Mutable access to `key`'s full entry, touching access metadata when
    /// the key exists.
    pub fn with_entry_mut<F, R>(&self, db: DbIndex, key: &[u8], f: F) -> R
    where
        F: FnOnce(Option<&mut Entry>) -> R,
    {
        self.reap_if_expired(db, key);
        let now = self.clock.now();
        match self.db(db).get_mut(key) {
            Some(mut e) => {
                e.touch(now);
                f(Some(&mut e))
            }
            None => f(None),
        }
    }

    /// Mutable access to `key`'s value, auto-creating it with `default()`
    /// when absent — the pattern every auto-creating write command
    /// (`LPUSH`, `SADD`, `HSET`, `ZADD`, `SET`) uses.
    pub fn get_or_create_mut<D, F, R>(&self, db: DbIndex, key: &[u8], default: D, f: F) -> Result<R>
    where
        D: FnOnce() -> TypedValue,
        F: FnOnce(&mut TypedValue) -> Result<R>,
    {
        self.reap_if_expired(db, key);
        let now = self.clock.now();
        let mut entry = self
            .db(db)
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(default(), now));
        entry.touch(now);
        f(&mut entry.value)
    }

    /// Set `key`'s expiry to the absolute instant `when`, subject to
    /// `flags`. Returns `true` iff the expiry was changed; `false` for a
    /// missing key or a flag-vetoed update.
    pub fn set_expiry(&self, db: DbIndex, key: &[u8], when: Instant, flags: ExpiryFlags) -> Result<bool> {
        flags.validate()?;
        Ok(self.with_entry_mut(db, key, |entry| {
            let Some(entry) = entry else {
                return false;
            };
            let current = entry.expire_at;
            if flags.nx && current.is_some() {
                return false;
            }
            if flags.xx && current.is_none() {
                return false;
            }
            if flags.gt {
                match current {
                    Some(c) if when > c => {}
                    _ => return false,
                }
            }
            if flags.lt {
                match current {
                    Some(c) if when < c => {}
                    None => {}
                    _ => return false,
                }
            }
            entry.expire_at = Some(when);
            true
        }))
    }

    /// `key`'s current expiry, if any (and if the key exists).
    pub fn get_expiry(&self, db: DbIndex, key: &[u8]) -> Option<Instant> {
        self.with_entry(db, key, |e| e.and_then(|e| e.expire_at))
    }

    /// `PERSIST`: clear `key`'s expiry. Returns `true` iff it had one.
    pub fn persist(&self, db: DbIndex, key: &[u8]) -> bool {
        self.with_entry_mut(db, key, |entry| match entry {
            Some(e) if e.expire_at.is_some() => {
                e.expire_at = None;
                true
            }
            _ => false,
        })
    }

    /// Remove `key` outright. Returns `true` iff it was present.
    pub fn delete_key(&self, db: DbIndex, key: &[u8]) -> bool {
        self.db(db).remove(key).is_some()
    }

    /// Count of unexpired keys in `db` (`DBSIZE`).
    pub fn dbsize(&self, db: DbIndex) -> usize {
        let now = self.clock.now();
        self.db(db).iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Drop every key in `db` (`FLUSHDB`).
    pub fn flushdb(&self, db: DbIndex) {
        self.db(db).clear();
    }

    /// A uniformly random unexpired key from `db`, if any (`RANDOMKEY`).
    pub fn randomkey(&self, db: DbIndex) -> Option<Vec<u8>> {
        let now = self.clock.now();
        self.db(db)
            .iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.key().clone())
            .choose(&mut rand::thread_rng())
    }

    /// A rough approximation of the bytes this database's values occupy;
    /// the eviction trigger compares this against the configured ceiling.
    /// Not an exact accounting of heap usage (allocator overhead,
    /// `DashMap` bucket overhead, etc. are not modeled) — a ceiling derived
    /// from this count should leave headroom.
    pub fn approx_memory_bytes(&self, db: DbIndex) -> usize {
        self.db(db).iter().map(|e| approx_entry_bytes(&e)).sum()
    }

    /// Sum of [`Self::approx_memory_bytes`] across every database.
    pub fn approx_total_memory_bytes(&self) -> usize {
        (0..self.num_databases())
            .map(|i| self.approx_memory_bytes(DbIndex(i)))
            .sum()
    }

    /// Sample up to `n` entries from `db` for the eviction/expiry
    /// scanners. When `volatile_only` is set, only keys carrying an
    /// expiry are eligible.
    pub fn sample_cohort(&self, db: DbIndex, n: usize, volatile_only: bool) -> Vec<CohortEntry> {
        self.db(db)
            .iter()
            .filter(|e| !volatile_only || e.expire_at.is_some())
            .map(|e| CohortEntry {
                key: e.key().clone(),
                last_access: e.last_access,
                access_count: e.access_count,
                expire_at: e.expire_at,
            })
            .choose_multiple(&mut rand::thread_rng(), n)
    }

    /// Export every unexpired `(db, key, value, expire_at)` triple,
    /// expire_at converted to milliseconds since the Unix epoch so it can
    /// be serialized by the durability layer (an `Instant` cannot be).
    /// Used by both the AOF preamble writer and the snapshot engine.
    pub fn export_state(&self) -> Vec<(DbIndex, Vec<u8>, TypedValue, Option<i64>)> {
        let now = self.clock.now();
        let now_millis = self.clock.now_millis();
        let mut out = Vec::new();
        for (idx, db) in self.databases.iter().enumerate() {
            for entry in db.iter() {
                if entry.is_expired(now) {
                    continue;
                }
                let expire_at_millis = entry
                    .expire_at
                    .map(|at| now_millis + instant_delta_millis(at, now));
                out.push((DbIndex(idx as u16), entry.key().clone(), entry.value.clone(), expire_at_millis));
            }
        }
        out
    }

    /// Install a `(value, expire_at)` pair restored from durable state,
    /// converting a wall-clock expiry back into this process's `Instant`
    /// space. Entries already expired as of now are silently dropped,
    /// matching the restore-time filtering both AOF and snapshot restore
    /// perform.
    pub fn install_entry(&self, db: DbIndex, key: Vec<u8>, value: TypedValue, expire_at_millis: Option<i64>) {
        let now = self.clock.now();
        let now_millis = self.clock.now_millis();
        if matches!(expire_at_millis, Some(ms) if ms <= now_millis) {
            return;
        }
        let expire_at = expire_at_millis.map(|ms| {
            now + std::time::Duration::from_millis((ms - now_millis).max(0) as u64)
        });
        self.db(db).insert(
            key,
            Entry {
                value,
                expire_at,
                last_access: now,
                access_count: 1,
            },
        );
    }
}

fn instant_delta_millis(at: Instant, now: Instant) -> i64 {
    if at >= now {
        at.duration_since(now).as_millis() as i64
    } else {
        -(now.duration_since(at).as_millis() as i64)
    }
}

fn approx_entry_bytes(entry: &Entry) -> usize {
    use crate::value::TypedValue::*;
    let payload = match &entry.value {
        Str(b) => b.len(),
        List(l) => l.iter().map(|b| b.len()).sum(),
        Set(s) => s.iter().map(|b| b.len()).sum(),
        Hash(h) => h.iter().map(|(k, v)| k.len() + v.len()).sum(),
        SortedSet(z) => z.len() * 24,
    };
    payload + 48 // fixed overhead estimate per entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use bramble_core::SystemClock;
    use std::time::Duration;

    fn keyspace() -> Keyspace {
        Keyspace::new(4, Arc::new(SystemClock))
    }

    #[test]
    fn get_or_create_installs_default_then_mutates() {
        let ks = keyspace();
        ks.get_or_create_mut(
            DbIndex(0),
            b"list",
            TypedValue::empty_list,
            |v| {
                v.as_list_mut()?.push_back(b"a".to_vec());
                Ok(())
            },
        )
        .unwrap();
        let v = ks.get_value(DbIndex(0), b"list").unwrap();
        assert_eq!(v.as_list().unwrap().len(), 1);
    }

    #[test]
    fn expired_key_reads_as_absent() {
        let ks = keyspace();
        ks.set_value(DbIndex(0), b"k", TypedValue::Str(b"v".into()));
        let now = ks.clock().now();
        ks.set_expiry(DbIndex(0), b"k", now, ExpiryFlags::default()).unwrap();
        assert!(!ks.key_exists(DbIndex(0), b"k"));
        assert!(ks.get_value(DbIndex(0), b"k").is_none());
    }

    #[test]
    fn lt_flag_treats_missing_expiry_as_infinite_scenario_s4() {
        let ks = keyspace();
        ks.set_value(DbIndex(0), b"k", TypedValue::Str(b"v".into()));
        let now = ks.clock().now();

        let flags = ExpiryFlags {
            lt: true,
            ..Default::default()
        };
        assert!(ks
            .set_expiry(DbIndex(0), b"k", now + Duration::from_secs(100), flags)
            .unwrap());
        assert_eq!(ks.get_expiry(DbIndex(0), b"k"), Some(now + Duration::from_secs(100)));

        assert!(!ks
            .set_expiry(DbIndex(0), b"k", now + Duration::from_secs(200), flags)
            .unwrap());
        assert_eq!(ks.get_expiry(DbIndex(0), b"k"), Some(now + Duration::from_secs(100)));

        assert!(ks
            .set_expiry(DbIndex(0), b"k", now + Duration::from_secs(50), flags)
            .unwrap());
        assert_eq!(ks.get_expiry(DbIndex(0), b"k"), Some(now + Duration::from_secs(50)));
    }

    #[test]
    fn nx_xx_mutually_exclusive_is_rejected() {
        let flags = ExpiryFlags {
            nx: true,
            xx: true,
            ..Default::default()
        };
        assert!(flags.validate().is_err());
    }

    #[test]
    fn dbsize_excludes_expired_keys() {
        let ks = keyspace();
        ks.set_value(DbIndex(0), b"a", TypedValue::Str(b"1".into()));
        ks.set_value(DbIndex(0), b"b", TypedValue::Str(b"2".into()));
        let now = ks.clock().now();
        ks.set_expiry(DbIndex(0), b"b", now, ExpiryFlags::default()).unwrap();
        assert_eq!(ks.dbsize(DbIndex(0)), 1);
    }

    #[test]
    fn flushdb_clears_only_that_database() {
        let ks = keyspace();
        ks.set_value(DbIndex(0), b"a", TypedValue::Str(b"1".into()));
        ks.set_value(DbIndex(1), b"b", TypedValue::Str(b"2".into()));
        ks.flushdb(DbIndex(0));
        assert!(!ks.key_exists(DbIndex(0), b"a"));
        assert!(ks.key_exists(DbIndex(1), b"b"));
    }
}

//! The background expiry scanner: proactively reaps keys whose `expire_at`
//! has passed, rather than relying solely on lazy reaping at access time.

use bramble_core::DbIndex;

use crate::keyspace::Keyspace;

/// Run one expiry-scanning pass across every database. Returns the number
/// of keys reaped.
pub fn run_expiry_tick(keyspace: &Keyspace, sample: usize) -> usize {
    let now = keyspace.clock().now();
    let mut reaped = 0usize;
    for db_idx in 0..keyspace.num_databases() {
        let db = DbIndex(db_idx);
        let cohort = keyspace.sample_cohort(db, sample, true);
        for entry in cohort {
            if matches!(entry.expire_at, Some(at) if at <= now) && keyspace.delete_key(db, &entry.key) {
                reaped += 1;
            }
        }
    }
    reaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyspace::ExpiryFlags;
    use crate::value::TypedValue;
    use bramble_core::SystemClock;
    use std::sync::Arc;

    #[test]
    fn scanner_reaps_expired_keys() {
        let ks = Keyspace::new(1, Arc::new(SystemClock));
        ks.set_value(DbIndex(0), b"k", TypedValue::Str(b"v".into()));
        let now = ks.clock().now();
        ks.set_expiry(DbIndex(0), b"k", now, ExpiryFlags::default()).unwrap();
        let reaped = run_expiry_tick(&ks, 20);
        assert_eq!(reaped, 1);
    }

    #[test]
    fn scanner_ignores_unexpired_keys() {
        let ks = Keyspace::new(1, Arc::new(SystemClock));
        ks.set_value(DbIndex(0), b"k", TypedValue::Str(b"v".into()));
        let reaped = run_expiry_tick(&ks, 20);
        assert_eq!(reaped, 0);
        assert!(ks.key_exists(DbIndex(0), b"k"));
    }
}

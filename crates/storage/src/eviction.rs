//! Memory-pressure eviction policies and the sampled-cohort scanner tick.
//!
//! Every policy but `NoEviction` works the same way: when memory exceeds
//! the configured ceiling, sample a cohort of live keys and evict whichever
//! one the policy ranks worst, repeating (bounded by a per-tick budget) until
//! memory falls back under the ceiling or the budget is exhausted.

use std::time::Duration;

use bramble_core::{DbIndex, Error, Result};
use rand::seq::IteratorRandom;

use crate::keyspace::{CohortEntry, Keyspace};

/// The eviction strategy a server is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Never evict; the memory ceiling is purely informational.
    NoEviction,
    /// Evict the least-recently-used key from any key.
    AllKeysLru,
    /// Evict the least-recently-used key among keys with an expiry.
    VolatileLru,
    /// Evict the least-frequently-used key from any key.
    AllKeysLfu,
    /// Evict the least-frequently-used key among keys with an expiry.
    VolatileLfu,
    /// Evict a uniformly random key from any key.
    AllKeysRandom,
    /// Evict a uniformly random key among keys with an expiry.
    VolatileRandom,
}

impl EvictionPolicy {
    /// Parse a `maxmemory-policy`-style configuration token.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "noeviction" => Ok(EvictionPolicy::NoEviction),
            "allkeys-lru" => Ok(EvictionPolicy::AllKeysLru),
            "volatile-lru" => Ok(EvictionPolicy::VolatileLru),
            "allkeys-lfu" => Ok(EvictionPolicy::AllKeysLfu),
            "volatile-lfu" => Ok(EvictionPolicy::VolatileLfu),
            "allkeys-random" => Ok(EvictionPolicy::AllKeysRandom),
            "volatile-random" => Ok(EvictionPolicy::VolatileRandom),
            other => Err(Error::validation(format!("unknown eviction policy: {other}"))),
        }
    }

    fn volatile_only(&self) -> bool {
        matches!(
            self,
            EvictionPolicy::VolatileLru | EvictionPolicy::VolatileLfu | EvictionPolicy::VolatileRandom
        )
    }

    fn pick(&self, cohort: &[CohortEntry]) -> Option<usize> {
        if cohort.is_empty() {
            return None;
        }
        match self {
            EvictionPolicy::NoEviction => None,
            EvictionPolicy::AllKeysLru | EvictionPolicy::VolatileLru => cohort
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(i, _)| i),
            EvictionPolicy::AllKeysLfu | EvictionPolicy::VolatileLfu => cohort
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.access_count)
                .map(|(i, _)| i),
            EvictionPolicy::AllKeysRandom | EvictionPolicy::VolatileRandom => {
                (0..cohort.len()).choose(&mut rand::thread_rng())
            }
        }
    }
}

/// Eviction engine configuration, loaded from `max_memory`,
/// `eviction_policy`, `eviction_sample`, `eviction_interval`.
#[derive(Debug, Clone, Copy)]
pub struct EvictionConfig {
    /// The ranking policy.
    pub policy: EvictionPolicy,
    /// Memory ceiling, in bytes; `0` disables the check.
    pub max_memory: usize,
    /// Cohort size sampled per eviction attempt.
    pub sample: usize,
    /// How often the background scanner wakes.
    pub interval: Duration,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        EvictionConfig {
            policy: EvictionPolicy::NoEviction,
            max_memory: 0,
            sample: 20,
            interval: Duration::from_millis(100),
        }
    }
}

/// Per-tick eviction budget: caps how many keys a single scanner wake-up
/// will evict, so a sudden burst of writes doesn't turn eviction into a
/// multi-second pause.
const TICK_BUDGET: usize = 64;

/// Run one eviction pass across every database, evicting until memory
/// falls under `config.max_memory` or the tick budget is exhausted.
/// Returns the number of keys evicted.
pub fn run_eviction_tick(keyspace: &Keyspace, config: &EvictionConfig) -> usize {
    if config.policy == EvictionPolicy::NoEviction || config.max_memory == 0 {
        return 0;
    }
    let mut evicted = 0usize;
    for db_idx in 0..keyspace.num_databases() {
        let db = DbIndex(db_idx);
        while evicted < TICK_BUDGET && keyspace.approx_memory_bytes(db) > config.max_memory {
            let cohort = keyspace.sample_cohort(db, config.sample, config.policy.volatile_only());
            let Some(victim_idx) = config.policy.pick(&cohort) else {
                break;
            };
            if keyspace.delete_key(db, &cohort[victim_idx].key) {
                evicted += 1;
            } else {
                break;
            }
        }
        if evicted >= TICK_BUDGET {
            break;
        }
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use bramble_core::SystemClock;
    use crate::value::TypedValue;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn keyspace() -> Keyspace {
        Keyspace::new(1, Arc::new(SystemClock))
    }

    #[test]
    fn noeviction_never_evicts() {
        let ks = keyspace();
        ks.set_value(DbIndex(0), b"a", TypedValue::Str(vec![0u8; 1000]));
        let config = EvictionConfig {
            policy: EvictionPolicy::NoEviction,
            max_memory: 1,
            ..Default::default()
        };
        assert_eq!(run_eviction_tick(&ks, &config), 0);
    }

    #[test]
    fn allkeys_lru_evicts_oldest_access() {
        let ks = keyspace();
        for i in 0..5 {
            ks.set_value(DbIndex(0), format!("k{i}").as_bytes(), TypedValue::Str(vec![0u8; 200]));
            std::thread::sleep(StdDuration::from_millis(1));
        }
        let config = EvictionConfig {
            policy: EvictionPolicy::AllKeysLru,
            max_memory: 10,
            sample: 5,
            ..Default::default()
        };
        let evicted = run_eviction_tick(&ks, &config);
        assert!(evicted > 0);
        assert!(!ks.key_exists(DbIndex(0), b"k0"));
    }

    #[test]
    fn volatile_policy_never_touches_persistent_keys() {
        let ks = keyspace();
        ks.set_value(DbIndex(0), b"persistent", TypedValue::Str(vec![0u8; 500]));
        let config = EvictionConfig {
            policy: EvictionPolicy::VolatileLru,
            max_memory: 1,
            sample: 5,
            ..Default::default()
        };
        run_eviction_tick(&ks, &config);
        assert!(ks.key_exists(DbIndex(0), b"persistent"));
    }

    #[test]
    fn parse_rejects_unknown_policy() {
        assert!(EvictionPolicy::parse("bogus").is_err());
    }
}

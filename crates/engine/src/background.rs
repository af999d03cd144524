//! The background scanner: a single thread that periodically runs the
//! expiry sweep, the eviction sweep, and the snapshot ticker against a
//! shared [`Database`](crate::database::Database).
//!
//! Mirrors `bramble-durability`'s AOF everysec syncer: an `Arc<AtomicBool>`
//! shutdown flag and a joined thread, rather than a general task queue —
//! there's exactly one periodic job here, not an open-ended work queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bramble_storage::{run_eviction_tick, run_expiry_tick, EvictionConfig};
use tracing::{debug, info, warn};

use crate::database::Database;

/// Background-scanner configuration, derived from `config.eviction_sample`,
/// `config.eviction_interval`, and `config.snapshot_interval`.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundConfig {
    /// Eviction policy/ceiling/sample/interval.
    pub eviction: EvictionConfig,
    /// How many keys the expiry sweep samples per database per tick.
    pub expiry_sample: usize,
    /// How often the scanner wakes to run expiry and eviction sweeps.
    pub scan_interval: Duration,
    /// How often the scanner asks the snapshot engine whether it's time.
    pub snapshot_interval: Duration,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        BackgroundConfig {
            eviction: EvictionConfig::default(),
            expiry_sample: 20,
            scan_interval: Duration::from_millis(100),
            snapshot_interval: Duration::from_secs(1),
        }
    }
}

/// Owns the background scanner thread for one [`Database`]. Dropping this
/// stops the thread and joins it.
pub struct BackgroundScanner {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundScanner {
    /// Spawn the scanner thread against `database`, running until this
    /// value is dropped.
    pub fn spawn(database: Arc<Database>, config: BackgroundConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();
        let handle = std::thread::spawn(move || {
            info!("starting background scanner");
            let mut since_snapshot_check = Duration::ZERO;
            while !thread_shutdown.load(Ordering::Acquire) {
                std::thread::sleep(config.scan_interval);

                let expired = run_expiry_tick(database.keyspace(), config.expiry_sample);
                let evicted = run_eviction_tick(database.keyspace(), &config.eviction);
                if expired > 0 || evicted > 0 {
                    debug!(expired, evicted, "background scanner tick");
                }

                since_snapshot_check += config.scan_interval;
                if since_snapshot_check >= config.snapshot_interval {
                    since_snapshot_check = Duration::ZERO;
                    match database
                        .snapshot_engine()
                        .maybe_snapshot(database.coordinator(), database.keyspace())
                    {
                        Ok(outcome) => debug!(?outcome, "snapshot ticker ran"),
                        Err(err) => warn!(%err, "snapshot ticker failed"),
                    }
                }
            }
            info!("background scanner stopped");
        });

        BackgroundScanner {
            shutdown,
            handle: Some(handle),
        }
    }
}

impl Drop for BackgroundScanner {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

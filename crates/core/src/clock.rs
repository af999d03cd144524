//! A mockable time source
//!
//! Expiry arithmetic (`EXPIRE`, TTL queries, the eviction scanner) needs a
//! single notion of "now" that tests can pin to a fixed instant, the same
//! way the teacher's storage layer isolates `Instant::now()` behind a test
//! seam. Production code uses `SystemClock`; tests use `ManualClock`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A source of monotonic time.
///
/// `now()` must be non-decreasing across calls from the same `Clock`
/// instance. Implementations must be `Send + Sync`: the clock is shared
/// across worker tasks and background scanners.
pub trait Clock: Send + Sync {
    /// The current instant, per this clock.
    fn now(&self) -> Instant;

    /// The current wall-clock time, in milliseconds since the Unix epoch.
    /// Used for on-disk timestamps (snapshot directory names, AOF
    /// preamble metadata) where an `Instant` can't be serialized.
    fn now_millis(&self) -> i64;
}

/// The real wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as i64
    }
}

/// A clock that returns a fixed, explicitly-advanced instant.
///
/// Every `now()` call returns the same value until `advance` is called,
/// making expiry arithmetic deterministic in tests: a key set to expire in
/// 10s either has or hasn't, with no flakiness from wall-clock drift.
#[derive(Clone)]
pub struct ManualClock {
    epoch: Instant,
    offset_millis: Arc<AtomicU64>,
    wall_millis_at_epoch: i64,
}

impl ManualClock {
    /// Create a clock pinned at "now" (captured once, at construction).
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_millis: Arc::new(AtomicU64::new(0)),
            wall_millis_at_epoch: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system time before Unix epoch")
                .as_millis() as i64,
        }
    }

    /// Move the clock forward by `d`. Subsequent `now()`/`now_millis()`
    /// calls reflect the advance.
    pub fn advance(&self, d: Duration) {
        self.offset_millis
            .fetch_add(d.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.epoch + Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
    }

    fn now_millis(&self) -> i64 {
        self.wall_millis_at_epoch + self.offset_millis.load(Ordering::SeqCst) as i64
    }
}

//! Point-in-time snapshotting (spec.md §4.6.2): a manifest-guarded,
//! hash-deduplicated alternative to AOF for a lower-overhead durability
//! path.
//!
//! Layout under `<data_dir>/snapshots/`:
//! - `manifest.bin` — JSON `{latest_snapshot_msec, latest_snapshot_hash}`.
//! - `<msec>/state.bin` — JSON state captured at that snapshot.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bramble_core::{Error, Result};
use bramble_storage::Keyspace;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::mode::PersistenceCoordinator;
use crate::state::{self, StateSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Manifest {
    latest_snapshot_msec: i64,
    latest_snapshot_hash: [u8; 16],
}

#[derive(Debug, Serialize)]
struct HashedState<'a> {
    state: &'a StateSnapshot,
    latest_snapshot_msec: i64,
}

#[derive(Debug, Deserialize)]
struct StateFile {
    state: StateSnapshot,
    #[allow(dead_code)]
    latest_snapshot_msec: i64,
}

/// The result of a snapshot attempt or restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// A new snapshot was written at this epoch-millisecond timestamp.
    Created(i64),
    /// No state had changed since the last snapshot; nothing written.
    NothingToSnapshot,
    /// State was restored from the snapshot at this timestamp.
    Restored(i64),
    /// No snapshot manifest (or an empty one) was found to restore from.
    NoSnapshot,
}

/// Owns the snapshot directory and trigger bookkeeping for one `data_dir`.
pub struct SnapshotEngine {
    dir: PathBuf,
    manifest_path: PathBuf,
    change_count: AtomicU64,
    threshold: u64,
    writing: Mutex<()>,
}

impl SnapshotEngine {
    /// Open (creating if absent) the snapshots directory under `data_dir`.
    /// `threshold` is `config.snapshot_threshold`: a snapshot only fires
    /// once at least this many changes have accumulated since the last one.
    pub fn open(data_dir: &Path, threshold: u64) -> Result<Self> {
        let dir = data_dir.join("snapshots");
        fs::create_dir_all(&dir)?;
        let manifest_path = dir.join("manifest.bin");
        Ok(SnapshotEngine {
            dir,
            manifest_path,
            change_count: AtomicU64::new(0),
            threshold,
            writing: Mutex::new(()),
        })
    }

    /// Record that a mutating command applied. Called by the dispatcher
    /// alongside the AOF append.
    pub fn note_change(&self) {
        self.change_count.fetch_add(1, Ordering::Relaxed);
    }

    fn read_manifest(&self) -> Result<Manifest> {
        if !self.manifest_path.exists() {
            return Ok(Manifest::default());
        }
        let mut bytes = Vec::new();
        File::open(&self.manifest_path)?.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Ok(Manifest::default());
        }
        serde_json::from_slice(&bytes).map_err(|e| Error::Fatal(format!("corrupt snapshot manifest: {e}")))
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let json = serde_json::to_vec(manifest)
            .map_err(|e| Error::Fatal(format!("manifest serialization failed: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.manifest_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        Ok(())
    }

    /// Called by the snapshot ticker: only actually snapshots when
    /// `change_count` has reached `threshold`.
    pub fn maybe_snapshot(&self, coordinator: &PersistenceCoordinator, keyspace: &Keyspace) -> Result<SnapshotOutcome> {
        if self.change_count.load(Ordering::Relaxed) < self.threshold {
            return Ok(SnapshotOutcome::NothingToSnapshot);
        }
        self.take_snapshot(coordinator, keyspace)
    }

    /// Unconditionally attempt a snapshot: compute the state hash, compare
    /// against the manifest, and only write a new snapshot (and manifest)
    /// if the hash differs (spec.md Testable Property 5 / scenario S5).
    pub fn take_snapshot(&self, coordinator: &PersistenceCoordinator, keyspace: &Keyspace) -> Result<SnapshotOutcome> {
        let _guard = self.writing.lock();
        coordinator.begin_snapshot();
        let result = self.take_snapshot_locked(keyspace);
        coordinator.finish_snapshot();
        result
    }

    fn take_snapshot_locked(&self, keyspace: &Keyspace) -> Result<SnapshotOutcome> {
        let manifest = self.read_manifest()?;
        let now_millis = keyspace.clock().now_millis();
        let snapshot = state::capture(keyspace);
        let hashed = HashedState {
            state: &snapshot,
            latest_snapshot_msec: manifest.latest_snapshot_msec,
        };
        let json = serde_json::to_vec(&hashed)
            .map_err(|e| Error::Fatal(format!("snapshot serialization failed: {e}")))?;
        let digest = md5::compute(&json).0;
        if digest == manifest.latest_snapshot_hash {
            debug!("nothing new to snapshot");
            return Ok(SnapshotOutcome::NothingToSnapshot);
        }

        let snapshot_dir = self.dir.join(now_millis.to_string());
        fs::create_dir_all(&snapshot_dir)?;
        let mut file = File::create(snapshot_dir.join("state.bin"))?;
        let state_json = serde_json::to_vec(&hashed)
            .map_err(|e| Error::Fatal(format!("snapshot serialization failed: {e}")))?;
        file.write_all(&state_json)?;
        file.sync_all()?;

        self.write_manifest(&Manifest {
            latest_snapshot_msec: now_millis,
            latest_snapshot_hash: digest,
        })?;
        self.change_count.store(0, Ordering::Relaxed);
        info!(msec = now_millis, "wrote snapshot");
        Ok(SnapshotOutcome::Created(now_millis))
    }

    /// Restore from the latest snapshot, if one exists.
    pub fn restore(&self, keyspace: &Keyspace) -> Result<SnapshotOutcome> {
        let manifest = self.read_manifest()?;
        if manifest.latest_snapshot_msec == 0 {
            return Ok(SnapshotOutcome::NoSnapshot);
        }
        let state_path = self
            .dir
            .join(manifest.latest_snapshot_msec.to_string())
            .join("state.bin");
        if !state_path.exists() {
            return Ok(SnapshotOutcome::NoSnapshot);
        }
        let mut bytes = Vec::new();
        File::open(&state_path)?.read_to_end(&mut bytes)?;
        let parsed: StateFile =
            serde_json::from_slice(&bytes).map_err(|e| Error::Fatal(format!("corrupt snapshot state: {e}")))?;
        state::restore(keyspace, parsed.state);
        info!(msec = manifest.latest_snapshot_msec, "restored from snapshot");
        Ok(SnapshotOutcome::Restored(manifest.latest_snapshot_msec))
    }
}

//! Append-only file durability: a JSON preamble followed by a RESP command
//! log, per spec.md §4.6.1.
//!
//! ## Layout
//!
//! - `<data_dir>/aof/preamble.bin` — JSON `{database: {key: {value, expire_at}}}`
//!   (here: a [`crate::state::StateSnapshot`]), rewritten wholesale on
//!   every rewrite.
//! - `<data_dir>/aof/log.aof` — RESP frames, one per mutating command,
//!   appended as they happen.
//!
//! ## Sync strategies
//!
//! - `Always`: fsync after every append. Blocks the command path until the
//!   fsync returns.
//! - `EverySec`: a background thread fsyncs once per second; writes in
//!   between are visible only in kernel buffers.
//! - `No`: never explicitly fsync; left to the OS.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bramble_core::{Error, Result};
use bramble_storage::Keyspace;
use bramble_wire::{decode_command, encode_request};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::mode::PersistenceCoordinator;
use crate::state;

const EVERYSEC_TICK: Duration = Duration::from_secs(1);

/// Which AOF sync discipline to apply (`config.aof_sync_strategy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append.
    Always,
    /// A background thread fsyncs once per second.
    EverySec,
    /// Never explicitly fsync.
    No,
}

impl SyncStrategy {
    /// Parse the config token (`"always"`, `"everysec"`, `"no"`).
    pub fn parse(token: &str) -> Result<Self> {
        match token.to_ascii_lowercase().as_str() {
            "always" => Ok(SyncStrategy::Always),
            "everysec" => Ok(SyncStrategy::EverySec),
            "no" => Ok(SyncStrategy::No),
            other => Err(Error::validation(format!("unknown aof_sync_strategy: {other}"))),
        }
    }
}

struct LogFile {
    path: PathBuf,
    file: File,
}

/// Owns the AOF preamble and command log for one `data_dir`.
pub struct AofWriter {
    preamble_path: PathBuf,
    log: Mutex<LogFile>,
    strategy: SyncStrategy,
    everysec_shutdown: Arc<AtomicBool>,
    everysec_thread: Option<JoinHandle<()>>,
}

impl AofWriter {
    /// Open (creating if absent) the AOF directory under `data_dir`.
    pub fn open(data_dir: &Path, strategy: SyncStrategy) -> Result<Self> {
        let dir = data_dir.join("aof");
        fs::create_dir_all(&dir)?;
        let preamble_path = dir.join("preamble.bin");
        if !preamble_path.exists() {
            OpenOptions::new().create(true).write(true).open(&preamble_path)?;
        }
        let log_path = dir.join("log.aof");
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

        let everysec_shutdown = Arc::new(AtomicBool::new(false));
        let everysec_thread = if strategy == SyncStrategy::EverySec {
            let shutdown = everysec_shutdown.clone();
            let log_path_for_thread = log_path.clone();
            Some(std::thread::spawn(move || {
                info!(path = %log_path_for_thread.display(), "starting AOF everysec syncer");
                while !shutdown.load(Ordering::Acquire) {
                    std::thread::sleep(EVERYSEC_TICK);
                    if let Ok(f) = OpenOptions::new().append(true).open(&log_path_for_thread) {
                        if let Err(err) = f.sync_all() {
                            warn!(%err, "everysec fsync failed");
                        } else {
                            debug!("everysec fsync completed");
                        }
                    }
                }
                info!("AOF everysec syncer stopped");
            }))
        } else {
            None
        };

        Ok(AofWriter {
            preamble_path,
            log: Mutex::new(LogFile { path: log_path, file }),
            strategy,
            everysec_shutdown,
            everysec_thread,
        })
    }

    /// Write a fresh preamble from `keyspace`'s current state, truncating
    /// and fsyncing the preamble file. Holds the file open across the whole
    /// truncate/write/sync sequence, so no reader ever observes a
    /// truncated-but-not-yet-rewritten preamble.
    pub fn write_preamble(&self, keyspace: &Keyspace) -> Result<()> {
        let snapshot = state::capture(keyspace);
        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| Error::Fatal(format!("preamble serialization failed: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.preamble_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        debug!(bytes = json.len(), "wrote AOF preamble");
        Ok(())
    }

    /// Append one mutating command to the log, encoded exactly as a client
    /// would have sent it. Subject to `coordinator`: if a rewrite or
    /// snapshot is in progress, blocks until it finishes so the log tail
    /// stays coherent with whichever preamble is being written.
    pub fn append_command(&self, coordinator: &PersistenceCoordinator, argv: &[Vec<u8>]) -> Result<()> {
        coordinator.wait_for_normal();
        let mut frame = Vec::new();
        encode_request(argv, &mut frame);
        let mut guard = self.log.lock();
        guard.file.write_all(&frame)?;
        match self.strategy {
            SyncStrategy::Always => guard.file.sync_all()?,
            SyncStrategy::EverySec | SyncStrategy::No => {}
        }
        Ok(())
    }

    /// Compact the log: write a fresh preamble capturing current state,
    /// then truncate the command log to zero length. Guarded by
    /// `coordinator` so concurrent appends defer for the duration.
    pub fn rewrite(&self, coordinator: &PersistenceCoordinator, keyspace: &Keyspace) -> Result<()> {
        coordinator.begin_rewrite();
        let result = (|| {
            self.write_preamble(keyspace)?;
            let guard = self.log.lock();
            guard.file.set_len(0)?;
            guard.file.sync_all()?;
            info!("AOF log rewritten");
            Ok(())
        })();
        coordinator.finish_rewrite();
        result
    }

    /// Restore the keyspace from this AOF: install the preamble's state,
    /// then replay every logged command through `replay`, in log order.
    /// `replay` is handed `(database-agnostic) argv`; the database a
    /// command applies to is whatever `SELECT` last set, matching a real
    /// client session — callers without `SELECT` handling may assume
    /// database 0 throughout.
    pub fn restore(&self, keyspace: &Keyspace, mut replay: impl FnMut(&[Vec<u8>]) -> Result<()>) -> Result<()> {
        let mut preamble_bytes = Vec::new();
        File::open(&self.preamble_path)?.read_to_end(&mut preamble_bytes)?;
        if !preamble_bytes.is_empty() {
            let snapshot: state::StateSnapshot = serde_json::from_slice(&preamble_bytes)
                .map_err(|e| Error::Fatal(format!("corrupt AOF preamble: {e}")))?;
            state::restore(keyspace, snapshot);
        }

        let log_path = self.log.lock().path.clone();
        let mut log_bytes = Vec::new();
        File::open(&log_path)?.read_to_end(&mut log_bytes)?;
        let mut cursor = 0usize;
        while cursor < log_bytes.len() {
            match decode_command(&log_bytes[cursor..])? {
                Some((argv, consumed)) => {
                    if !argv.is_empty() {
                        replay(&argv)?;
                    }
                    cursor += consumed;
                }
                None => {
                    warn!("AOF log ends mid-command; ignoring trailing partial write");
                    break;
                }
            }
        }
        info!(path = %log_path.display(), "AOF restore complete");
        Ok(())
    }
}

impl Drop for AofWriter {
    fn drop(&mut self) {
        self.everysec_shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.everysec_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bramble_core::{DbIndex, SystemClock};
    use bramble_storage::TypedValue;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn sync_strategy_parses_known_tokens() {
        assert_eq!(SyncStrategy::parse("always").unwrap(), SyncStrategy::Always);
        assert_eq!(SyncStrategy::parse("EVERYSEC").unwrap(), SyncStrategy::EverySec);
        assert_eq!(SyncStrategy::parse("no").unwrap(), SyncStrategy::No);
        assert!(SyncStrategy::parse("bogus").is_err());
    }

    #[test]
    fn append_then_restore_replays_commands_scenario_s1() {
        let dir = tempdir().unwrap();
        let clock: Arc<dyn bramble_core::Clock> = Arc::new(SystemClock);

        let ks = Keyspace::new(1, clock.clone());
        ks.set_value(DbIndex(0), b"k1", TypedValue::Str(b"v1".to_vec()));
        ks.set_value(DbIndex(0), b"k3", TypedValue::Str(b"v3".to_vec()));

        let aof = AofWriter::open(dir.path(), SyncStrategy::Always).unwrap();
        let coord = PersistenceCoordinator::new();
        aof.write_preamble(&ks).unwrap();
        for (k, v) in [("k4", "v4"), ("k5", "v5"), ("k6", "v6")] {
            aof.append_command(&coord, &[b"SET".to_vec(), k.as_bytes().to_vec(), v.as_bytes().to_vec()])
                .unwrap();
        }
        aof.rewrite(&coord, &ks).unwrap();
        for (k, v) in [("k7", "v7"), ("k8", "v8")] {
            aof.append_command(&coord, &[b"SET".to_vec(), k.as_bytes().to_vec(), v.as_bytes().to_vec()])
                .unwrap();
        }

        let restored = Keyspace::new(1, clock);
        let mut replayed = Vec::new();
        aof.restore(&restored, |argv| {
            replayed.push(argv.to_vec());
            if argv[0] == b"SET" {
                restored.set_value(DbIndex(0), &argv[1], TypedValue::Str(argv[2].clone()));
            }
            Ok(())
        })
        .unwrap();

        assert!(restored.key_exists(DbIndex(0), b"k1"));
        assert!(restored.key_exists(DbIndex(0), b"k3"));
        assert!(restored.key_exists(DbIndex(0), b"k7"));
        assert!(restored.key_exists(DbIndex(0), b"k8"));
        assert_eq!(replayed.len(), 2);
    }
}

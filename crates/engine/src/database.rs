//! The top-level `Database`: wires the keyspace engine to the persistence
//! engine and runs every command through the dispatcher's lock/handler/log
//! sequence.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bramble_core::{Clock, DbIndex, Error, Result, SystemClock};
use bramble_durability::{AofWriter, PersistenceCoordinator, SnapshotEngine, SnapshotOutcome, SyncStrategy};
use bramble_storage::Keyspace;
use bramble_wire::Reply;
use tracing::{debug, warn};

use crate::dispatch;

/// Everything `Database::open` needs, usually built from `bramble-cli`'s
/// parsed configuration.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Directory the AOF and snapshot files live under.
    pub data_dir: PathBuf,
    /// Number of logical databases (`SELECT 0..databases`).
    pub databases: u16,
    /// AOF fsync discipline.
    pub aof_sync_strategy: SyncStrategy,
    /// Replay the AOF on open.
    pub restore_aof: bool,
    /// Restore from the latest snapshot on open.
    pub restore_snapshot: bool,
    /// Changes needed before the background ticker snapshots again.
    pub snapshot_threshold: u64,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        DatabaseOptions {
            data_dir: PathBuf::from("./data"),
            databases: 16,
            aof_sync_strategy: SyncStrategy::EverySec,
            restore_aof: true,
            restore_snapshot: true,
            snapshot_threshold: 100,
        }
    }
}

/// The keyspace plus the durability machinery that observes every write
/// applied against it. One `Database` is shared (behind an `Arc`) across
/// every client connection and the background scanners.
pub struct Database {
    data_dir: PathBuf,
    keyspace: Keyspace,
    aof: AofWriter,
    snapshot: SnapshotEngine,
    coordinator: PersistenceCoordinator,
}

impl Database {
    /// Open (or create) the database at `options.data_dir`, restoring prior
    /// state per `options.restore_snapshot`/`options.restore_aof`. Snapshot
    /// restore takes priority: if it finds a snapshot, the AOF (which would
    /// otherwise redescribe overlapping history) is not replayed.
    pub fn open(options: DatabaseOptions) -> Result<Self> {
        std::fs::create_dir_all(&options.data_dir)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let keyspace = Keyspace::new(options.databases, clock);
        let aof = AofWriter::open(&options.data_dir, options.aof_sync_strategy)?;
        let snapshot = SnapshotEngine::open(&options.data_dir, options.snapshot_threshold)?;
        let coordinator = PersistenceCoordinator::new();

        let db = Database {
            data_dir: options.data_dir.clone(),
            keyspace,
            aof,
            snapshot,
            coordinator,
        };

        let mut restored = false;
        if options.restore_snapshot {
            if let SnapshotOutcome::Restored(_) = db.snapshot.restore(&db.keyspace)? {
                restored = true;
            }
        }
        if !restored && options.restore_aof {
            let current_db = Cell::new(DbIndex::DEFAULT);
            db.aof.restore(&db.keyspace, |argv| db.replay_command(&current_db, argv))?;
        }

        Ok(db)
    }

    /// The directory this database was opened against.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The underlying keyspace, for the background scanners.
    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// The snapshot engine, for the background ticker.
    pub fn snapshot_engine(&self) -> &SnapshotEngine {
        &self.snapshot
    }

    /// The persistence mode coordinator, for the background ticker to hand
    /// to `snapshot_engine().take_snapshot`/`maybe_snapshot`.
    pub fn coordinator(&self) -> &PersistenceCoordinator {
        &self.coordinator
    }

    /// Run one command to completion: look it up, acquire its keys' locks,
    /// invoke its handler, and — if it's a mutation — append it to the AOF
    /// and mark a snapshot-worthy change.
    pub fn execute(&self, db: DbIndex, argv: &[Vec<u8>]) -> Result<Reply> {
        if argv.is_empty() {
            return Err(Error::validation("empty command"));
        }
        let (reply, is_write) = self.dispatch(db, argv)?;
        if is_write {
            if let Err(err) = self.aof.append_command(&self.coordinator, argv) {
                warn!(%err, "AOF append failed, continuing without durability for this write");
            }
            self.snapshot.note_change();
        }
        Ok(reply)
    }

    /// Apply one command read back from the AOF log, without re-appending
    /// it. `SELECT` is dispatched like any other command (so an
    /// out-of-range index is rejected the same way it would be for a live
    /// client), but since the AOF stream has no connection to carry
    /// "current database" state across commands, this replay cursor tracks
    /// it in `current_db` and updates it right after a successful `SELECT`.
    fn replay_command(&self, current_db: &Cell<DbIndex>, argv: &[Vec<u8>]) -> Result<()> {
        self.dispatch(current_db.get(), argv)?;
        if argv[0].eq_ignore_ascii_case(b"SELECT") {
            let index: u16 = std::str::from_utf8(&argv[1])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::validation("value is not an integer or out of range"))?;
            current_db.set(DbIndex(index));
        }
        Ok(())
    }

    /// Look up, lock, and invoke. Returns whether the command is a
    /// mutation, so callers can decide whether to log it.
    fn dispatch(&self, db: DbIndex, argv: &[Vec<u8>]) -> Result<(Reply, bool)> {
        let command = dispatch::lookup(&argv[0]).ok_or_else(|| dispatch::unknown_command_error(argv))?;
        let key_spec = (command.key_extraction_fn)(argv)?;
        let is_write = !key_spec.write_keys.is_empty() || command.name == "FLUSHDB";

        let mut locks = self.keyspace.lock_context();
        for key in &key_spec.read_keys {
            self.keyspace.key_rlock(&mut locks, db, key);
        }
        for key in &key_spec.write_keys {
            self.keyspace.key_lock(&mut locks, db, key);
        }

        let mut ctx = dispatch::HandlerContext {
            db,
            keyspace: &self.keyspace,
            locks: &mut locks,
        };
        let result = (command.handler_fn)(&mut ctx, argv);
        if let Err(err) = &result {
            debug!(command = command.name, %err, "command failed");
        }
        Ok((result?, is_write))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(dir: &Path) -> DatabaseOptions {
        DatabaseOptions {
            data_dir: dir.to_path_buf(),
            databases: 4,
            aof_sync_strategy: SyncStrategy::Always,
            restore_aof: true,
            restore_snapshot: true,
            snapshot_threshold: 1000,
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let db = Database::open(options(dir.path())).unwrap();
        db.execute(DbIndex(0), &[b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()])
            .unwrap();
        let reply = db.execute(DbIndex(0), &[b"GET".to_vec(), b"k".to_vec()]).unwrap();
        assert!(matches!(reply, Reply::Bulk(Some(ref v)) if v == b"v"));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let dir = tempdir().unwrap();
        let db = Database::open(options(dir.path())).unwrap();
        let err = db.execute(DbIndex(0), &[b"NOTACOMMAND".to_vec()]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn writes_survive_reopen_via_aof_scenario_s1() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(options(dir.path())).unwrap();
            db.execute(DbIndex(0), &[b"SET".to_vec(), b"k1".to_vec(), b"v1".to_vec()])
                .unwrap();
            db.execute(DbIndex(1), &[b"SET".to_vec(), b"k2".to_vec(), b"v2".to_vec()])
                .unwrap();
        }
        let reopened = Database::open(options(dir.path())).unwrap();
        let r1 = reopened.execute(DbIndex(0), &[b"GET".to_vec(), b"k1".to_vec()]).unwrap();
        assert!(matches!(r1, Reply::Bulk(Some(ref v)) if v == b"v1"));
        let r2 = reopened.execute(DbIndex(1), &[b"GET".to_vec(), b"k2".to_vec()]).unwrap();
        assert!(matches!(r2, Reply::Bulk(Some(ref v)) if v == b"v2"));
    }

    #[test]
    fn flushdb_is_logged_even_with_no_keys() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(options(dir.path())).unwrap();
            db.execute(DbIndex(0), &[b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()])
                .unwrap();
            db.execute(DbIndex(0), &[b"FLUSHDB".to_vec()]).unwrap();
        }
        let reopened = Database::open(options(dir.path())).unwrap();
        assert_eq!(reopened.keyspace().dbsize(DbIndex(0)), 0);
    }
}

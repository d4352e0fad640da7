//! Storage layer for teamwork
//!
//! All state lives under `.teamwork/` in the workspace root.
//!
//! # Directory Structure
//!
//! ```text
//! .teamwork/
//!   state.json            # Projects, members and tasks snapshot
//!   approvals.jsonl       # Append-only approval log rows
//!   state.lock            # Exclusive lock held by mutating commands
//!   actor                 # Persisted actor identity
//!   notifications.jsonl   # Default notification sink
//!   activity.jsonl        # Default activity sink
//! ```

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::approval::ApprovalLog;
use crate::error::{Error, Result};
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::store::{MemoryStore, StateSnapshot, STATE_SCHEMA_VERSION};

/// Name of the state directory inside the workspace root
pub const STATE_DIR: &str = ".teamwork";

const STATE_FILE: &str = "state.json";
const APPROVALS_FILE: &str = "approvals.jsonl";
const LOCK_FILE: &str = "state.lock";

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    pub fn approvals_file(&self) -> PathBuf {
        self.state_dir().join(APPROVALS_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    pub fn is_initialized(&self) -> bool {
        self.state_file().exists()
    }

    /// Create `.teamwork/` with an empty snapshot. Returns false if it
    /// already existed.
    pub fn init(&self) -> Result<bool> {
        if self.is_initialized() {
            return Ok(false);
        }
        fs::create_dir_all(self.state_dir())?;
        self.write_json(&self.state_file(), &StateSnapshot::empty())?;
        Ok(true)
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized(self.root.clone()))
        }
    }

    pub fn lock(&self) -> Result<FileLock> {
        FileLock::acquire(self.lock_file(), DEFAULT_LOCK_TIMEOUT_MS)
    }

    /// Read the snapshot and approval log into a fresh [`MemoryStore`].
    pub fn load(&self) -> Result<MemoryStore> {
        self.ensure_initialized()?;
        let snapshot: StateSnapshot = self.read_json(&self.state_file())?;
        if snapshot.schema_version != STATE_SCHEMA_VERSION {
            return Err(Error::State(format!(
                "unsupported state schema '{}' (expected {STATE_SCHEMA_VERSION})",
                snapshot.schema_version
            )));
        }
        let logs: Vec<ApprovalLog> =
            self.read_jsonl_prefix(&self.approvals_file(), snapshot.approval_rows)?;
        tracing::debug!(
            tasks = snapshot.tasks.len(),
            logs = logs.len(),
            "state loaded"
        );
        Ok(MemoryStore::from_parts(snapshot, logs))
    }

    /// Persist new approval rows, then the snapshot.
    ///
    /// Writing the snapshot is the commit point: it records how many approval
    /// rows it covers, so rows appended by a commit whose snapshot write
    /// failed are ignored on load and dropped by the next commit.
    pub fn commit(&self, store: &mut MemoryStore) -> Result<()> {
        let approvals = self.approvals_file();
        let on_disk = count_jsonl_lines(&approvals)?;
        if on_disk > store.persisted_log_count() {
            tracing::warn!(
                uncommitted = on_disk - store.persisted_log_count(),
                "dropping approval rows from an incomplete commit"
            );
            self.write_jsonl(&approvals, store.logs())?;
        } else {
            for log in store.pending_logs() {
                self.append_jsonl(&approvals, log)?;
            }
        }
        self.write_json(&self.state_file(), &store.snapshot())?;
        store.mark_logs_persisted();
        tracing::debug!(tasks = store.task_count(), "state committed");
        Ok(())
    }

    /// Lock, load, and hand back a transaction to mutate and commit.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        self.ensure_initialized()?;
        let lock = self.lock()?;
        let store = self.load()?;
        Ok(Transaction {
            storage: self,
            _lock: lock,
            store,
        })
    }

    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(data)?;
        lock::write_atomic(path, &json)
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Append one record as a JSON line. Callers hold the state lock.
    pub fn append_jsonl<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(record)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{json}")?;
        file.sync_all()?;
        Ok(())
    }

    /// Replace a JSONL file with `records`, atomically.
    pub fn write_jsonl<T: Serialize>(&self, path: &Path, records: &[T]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        lock::write_atomic(path, &buf)
    }

    pub fn read_jsonl<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        self.read_jsonl_prefix(path, None)
    }

    /// Read at most `limit` records; lines past the limit are not parsed.
    fn read_jsonl_prefix<T: DeserializeOwned>(
        &self,
        path: &Path,
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            if limit.is_some_and(|limit| records.len() >= limit) {
                tracing::warn!(path = %path.display(), "ignoring uncommitted JSONL rows");
                break;
            }
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

fn count_jsonl_lines(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in reader.lines() {
        if !line?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

/// Locked load/commit scope. Dropping without [`Transaction::commit`]
/// discards every change.
pub struct Transaction<'a> {
    storage: &'a Storage,
    _lock: FileLock,
    pub store: MemoryStore,
}

impl Transaction<'_> {
    pub fn commit(mut self) -> Result<()> {
        self.storage.commit(&mut self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalAction, ApprovalLog};
    use crate::store::Repository;
    use crate::task::Task;
    use chrono::Utc;

    #[test]
    fn load_requires_init() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::new(dir.path());
        let err = storage.load().expect_err("not initialized");
        assert!(matches!(err, Error::NotInitialized(_)));

        assert!(storage.init().expect("init"));
        assert!(!storage.init().expect("second init"));
        assert_eq!(storage.load().expect("load").task_count(), 0);
    }

    #[test]
    fn commit_appends_only_new_logs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::new(dir.path());
        storage.init().expect("init");

        let mut tx = storage.begin().expect("begin");
        tx.store.save_task(Task::new("tsk-1", "prj-1", "Draft", "alice"));
        tx.store.save_log(ApprovalLog::new(
            "tsk-1",
            "prj-1",
            ApprovalAction::Submit,
            "alice",
            None,
            Utc::now(),
        ));
        tx.commit().expect("commit");

        let mut tx = storage.begin().expect("begin again");
        assert_eq!(tx.store.logs_for_task("tsk-1").len(), 1);
        assert!(tx.store.pending_logs().is_empty());
        tx.commit().expect("commit again");

        let rows: Vec<ApprovalLog> = storage
            .read_jsonl(&storage.approvals_file())
            .expect("read approvals");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn dropped_transaction_leaves_state_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::new(dir.path());
        storage.init().expect("init");

        {
            let mut tx = storage.begin().expect("begin");
            tx.store.save_task(Task::new("tsk-1", "prj-1", "Draft", "alice"));
        }

        assert_eq!(storage.load().expect("load").task_count(), 0);
    }

    #[test]
    fn rows_from_an_incomplete_commit_are_ignored_and_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::new(dir.path());
        storage.init().expect("init");
        let log = |action| ApprovalLog::new("tsk-1", "prj-1", action, "alice", None, Utc::now());

        let mut tx = storage.begin().expect("begin");
        tx.store.save_task(Task::new("tsk-1", "prj-1", "Draft", "alice"));
        tx.store.save_log(log(ApprovalAction::Submit));
        tx.commit().expect("commit");

        // An APPROVE row reached the log but its snapshot never did.
        let stray = log(ApprovalAction::Approve);
        storage
            .append_jsonl(&storage.approvals_file(), &stray)
            .expect("append stray row");

        let loaded = storage.load().expect("load");
        assert_eq!(loaded.logs_for_task("tsk-1").len(), 1);
        assert!(loaded.find_log(&stray.id).is_none());

        let mut tx = storage.begin().expect("begin again");
        tx.store.save_log(log(ApprovalAction::Reject));
        tx.commit().expect("commit again");

        let rows: Vec<ApprovalLog> = storage
            .read_jsonl(&storage.approvals_file())
            .expect("read approvals");
        let actions: Vec<ApprovalAction> = rows.iter().map(|row| row.action).collect();
        assert_eq!(actions, vec![ApprovalAction::Submit, ApprovalAction::Reject]);
        assert_eq!(storage.load().expect("reload").logs().len(), 2);
    }
}

//! Journal persistence backends
//!
//! A `JournalStore` holds the step journals for orchestration runs,
//! keyed by run id. Two backends are provided: an in-memory store for
//! tests and embedded use, and a file-backed store that keeps one JSON
//! file per run and survives process restarts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::journal::StepRecord;

/// Error type for journal store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No step at index {index} in run {run_id}")]
    StepNotFound { run_id: String, index: u64 },

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for journal store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a journal store
pub type SharedJournalStore = Arc<dyn JournalStore>;

/// Persistence contract for run journals.
///
/// `append` must be durable before it returns: the ordering guarantee
/// of the substrate (step N recorded before step N+1 begins) rests on
/// it.
pub trait JournalStore: Send + Sync {
    /// Load all recorded steps for a run, in step order. A run with no
    /// journal yields an empty vec.
    fn load(&self, run_id: &str) -> StoreResult<Vec<StepRecord>>;

    /// Append one step record to a run's journal.
    fn append(&self, run_id: &str, record: &StepRecord) -> StoreResult<()>;

    /// Mark a previously appended step (a delay) as completed.
    fn mark_completed(&self, run_id: &str, index: u64) -> StoreResult<()>;

    /// Delete a run's journal entirely.
    fn remove(&self, run_id: &str) -> StoreResult<()>;
}

/// In-memory journal store.
#[derive(Default)]
pub struct MemoryJournalStore {
    runs: Mutex<HashMap<String, Vec<StepRecord>>>,
}

impl MemoryJournalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedJournalStore {
        Arc::new(self)
    }
}

impl JournalStore for MemoryJournalStore {
    fn load(&self, run_id: &str) -> StoreResult<Vec<StepRecord>> {
        let runs = self.runs.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(runs.get(run_id).cloned().unwrap_or_default())
    }

    fn append(&self, run_id: &str, record: &StepRecord) -> StoreResult<()> {
        let mut runs = self.runs.lock().map_err(|_| StoreError::LockPoisoned)?;
        runs.entry(run_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn mark_completed(&self, run_id: &str, index: u64) -> StoreResult<()> {
        let mut runs = self.runs.lock().map_err(|_| StoreError::LockPoisoned)?;
        let steps = runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::StepNotFound {
                run_id: run_id.to_string(),
                index,
            })?;
        let step = steps
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or_else(|| StoreError::StepNotFound {
                run_id: run_id.to_string(),
                index,
            })?;
        step.completed = true;
        Ok(())
    }

    fn remove(&self, run_id: &str) -> StoreResult<()> {
        let mut runs = self.runs.lock().map_err(|_| StoreError::LockPoisoned)?;
        runs.remove(run_id);
        Ok(())
    }
}

/// File-backed journal store: one JSON file per run under a directory.
///
/// Writes go to a temp file first and are renamed into place, so a
/// crash mid-write leaves the previous journal intact. Journals are
/// small (dozens of steps), so whole-file rewrites are fine.
pub struct FileJournalStore {
    dir: PathBuf,
    // Serializes rewrites; a run is single-writer but several runs may
    // share this store.
    write_lock: Mutex<()>,
}

impl FileJournalStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedJournalStore {
        Arc::new(self)
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        // Run ids are alert ids; keep the filename safe regardless.
        let safe: String = run_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.journal.json"))
    }

    fn read_steps(&self, run_id: &str) -> StoreResult<Vec<StepRecord>> {
        let path = self.run_path(run_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_steps(&self, run_id: &str, steps: &[StepRecord]) -> StoreResult<()> {
        let path = self.run_path(run_id);
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(steps)?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl JournalStore for FileJournalStore {
    fn load(&self, run_id: &str) -> StoreResult<Vec<StepRecord>> {
        self.read_steps(run_id)
    }

    fn append(&self, run_id: &str, record: &StepRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut steps = self.read_steps(run_id)?;
        steps.push(record.clone());
        self.write_steps(run_id, &steps)
    }

    fn mark_completed(&self, run_id: &str, index: u64) -> StoreResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut steps = self.read_steps(run_id)?;
        let step = steps
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or_else(|| StoreError::StepNotFound {
                run_id: run_id.to_string(),
                index,
            })?;
        step.completed = true;
        self.write_steps(run_id, &steps)
    }

    fn remove(&self, run_id: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let path = self.run_path(run_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{input_hash, StepKind};
    use chrono::Utc;

    fn record(index: u64) -> StepRecord {
        StepRecord {
            index,
            kind: StepKind::Activity,
            name: format!("step-{index}"),
            input_hash: input_hash(&index),
            payload: serde_json::json!(index),
            completed: true,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_memory_store_append_and_load() {
        let store = MemoryJournalStore::new();
        assert!(store.load("run-1").unwrap().is_empty());

        store.append("run-1", &record(0)).unwrap();
        store.append("run-1", &record(1)).unwrap();

        let steps = store.load("run-1").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].name, "step-1");
        // Other runs unaffected
        assert!(store.load("run-2").unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_mark_completed() {
        let store = MemoryJournalStore::new();
        let mut delay = record(0);
        delay.completed = false;
        store.append("run-1", &delay).unwrap();

        store.mark_completed("run-1", 0).unwrap();
        assert!(store.load("run-1").unwrap()[0].completed);

        let err = store.mark_completed("run-1", 7).unwrap_err();
        assert!(matches!(err, StoreError::StepNotFound { index: 7, .. }));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = FileJournalStore::open(dir.path()).unwrap();
            store.append("alert-42", &record(0)).unwrap();
            store.append("alert-42", &record(1)).unwrap();
        }

        let reopened = FileJournalStore::open(dir.path()).unwrap();
        let steps = reopened.load("alert-42").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].index, 0);
    }

    #[test]
    fn test_file_store_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJournalStore::open(dir.path()).unwrap();

        store.append("alert-1", &record(0)).unwrap();
        store.remove("alert-1").unwrap();
        assert!(store.load("alert-1").unwrap().is_empty());
        // Removing again is fine
        store.remove("alert-1").unwrap();
    }

    #[test]
    fn test_file_store_sanitizes_run_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJournalStore::open(dir.path()).unwrap();

        store.append("../escape/attempt", &record(0)).unwrap();
        let steps = store.load("../escape/attempt").unwrap();
        assert_eq!(steps.len(), 1);
        // Nothing written outside the store directory
        assert!(!dir.path().parent().unwrap().join("escape").exists());
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use tracing::warn;

use crate::error::Result;

/// Per-job last-processed sequence numbers, persisted across restarts.
///
/// Every update rewrites the whole file — acceptable at expected event
/// rates. A corrupt or unreadable file resets the mapping to empty: the
/// pipeline re-receives from seq 0 and relies on worker dedup, so nothing is
/// applied twice, but the reset is loud in the logs.
pub struct CursorStore {
    path: PathBuf,
    state: Mutex<HashMap<String, u64>>,
}

impl CursorStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, u64>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e,
                          "cursor file corrupt, starting from empty cursors");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e,
                      "cursor file unreadable, starting from empty cursors");
                HashMap::new()
            }
        };
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Highest fully-processed seq for a job; 0 when the job is unknown.
    pub fn get(&self, job_id: &str) -> u64 {
        self.guard().get(job_id).copied().unwrap_or(0)
    }

    /// Unconditional set — the caller has already verified monotonicity.
    pub fn update(&self, job_id: &str, seq: u64) -> Result<()> {
        let mut state = self.guard();
        state.insert(job_id.to_string(), seq);
        self.persist(&state)
    }

    /// Snapshot of the whole mapping, e.g. for the bridge's resume frame.
    pub fn all_cursors(&self) -> HashMap<String, u64> {
        self.guard().clone()
    }

    fn persist(&self, state: &HashMap<String, u64>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::open(dir.path().join("cursors.json"));
        assert_eq!(store.get("job1"), 0);
    }

    #[test]
    fn update_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::open(dir.path().join("cursors.json"));
        store.update("job1", 5).unwrap();
        assert_eq!(store.get("job1"), 5);
    }

    #[test]
    fn cursors_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursors.json");

        let store1 = CursorStore::open(&path);
        store1.update("job1", 10).unwrap();
        store1.update("job2", 20).unwrap();

        let store2 = CursorStore::open(&path);
        assert_eq!(store2.get("job1"), 10);
        assert_eq!(store2.get("job2"), 20);
    }

    #[test]
    fn all_cursors_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::open(dir.path().join("cursors.json"));
        store.update("a", 1).unwrap();
        store.update("b", 2).unwrap();

        let snapshot = store.all_cursors();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a"], 1);
        assert_eq!(snapshot["b"], 2);
    }

    #[test]
    fn corrupt_file_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();

        let store = CursorStore::open(&path);
        assert_eq!(store.get("anything"), 0);
    }
}

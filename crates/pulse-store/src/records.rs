use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use pulse_core::types::FeedbackRecord;
use serde_json::Value;

use crate::error::Result;

/// Append-only store of analyzed feedback records.
///
/// The backing file is a top-level JSON array with 2-space indentation. One
/// process-wide mutex serializes every read and read-modify-write; the file
/// is rewritten whole on each append. Linear scans are fine at this scale.
pub struct RecordStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn append(&self, record: &FeedbackRecord) -> Result<()> {
        self.append_many(std::slice::from_ref(record))
    }

    /// Append several records in a single read-modify-write cycle.
    pub fn append_many(&self, records: &[FeedbackRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.ensure()?;

        let _guard = self.guard();
        let mut arr = self.read_raw()?;
        for record in records {
            arr.push(serde_json::to_value(record)?);
        }
        fs::write(&self.path, serde_json::to_string_pretty(&arr)?)?;
        Ok(())
    }

    /// All records, in the order they were written.
    pub fn read_all(&self) -> Result<Vec<FeedbackRecord>> {
        self.ensure()?;
        let _guard = self.guard();
        let raw = self.read_raw()?;
        let mut records = Vec::with_capacity(raw.len());
        for value in raw {
            records.push(serde_json::from_value(value)?);
        }
        Ok(records)
    }

    fn read_raw(&self) -> Result<Vec<Value>> {
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    /// Lazily create the parent directory and an empty array file.
    fn ensure(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        if !self.path.exists() {
            fs::write(&self.path, "[]")?;
        }
        Ok(())
    }

    // A poisoned lock means a writer panicked mid-append; the file itself is
    // still either the old or the new array, so carry on.
    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pulse_core::types::Sentiment;

    fn record(id: &str, summary: &str) -> FeedbackRecord {
        FeedbackRecord {
            id: id.to_string(),
            text: "some feedback".to_string(),
            user_id: Some("u1".to_string()),
            sentiment: Sentiment::Positive,
            key_topics: vec!["service".to_string()],
            action_required: false,
            summary: summary.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("feedback.json"));

        store.append(&record("r1", "first")).unwrap();
        store.append(&record("r2", "second")).unwrap();

        let all = store.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "r1");
        assert_eq!(all[1].summary, "second");
    }

    #[test]
    fn append_many_single_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("feedback.json"));

        let records: Vec<_> = (0..5).map(|i| record(&format!("r{i}"), "bulk")).collect();
        store.append_many(&records).unwrap();

        assert_eq!(store.read_all().unwrap().len(), 5);
    }

    #[test]
    fn creates_parent_dirs_and_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("nested/deeper/feedback.json"));

        assert!(store.read_all().unwrap().is_empty());
        let raw = fs::read_to_string(dir.path().join("nested/deeper/feedback.json")).unwrap();
        assert_eq!(raw, "[]");
    }

    #[test]
    fn file_uses_two_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        let store = RecordStore::new(&path);

        store.append(&record("r1", "indent check")).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n  {"));
    }

    #[test]
    fn created_at_is_normalized_to_utc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        // Seed a record carrying a non-UTC offset, as an older writer might.
        fs::write(
            &path,
            r#"[{
                "id": "r1",
                "text": "t",
                "userId": null,
                "sentiment": "neutral",
                "keyTopics": [],
                "actionRequired": false,
                "summary": "s",
                "createdAt": "2026-01-01T14:00:00+02:00"
            }]"#,
        )
        .unwrap();

        let store = RecordStore::new(&path);
        let all = store.read_all().unwrap();
        assert_eq!(
            all[0].created_at,
            Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
        );
    }
}

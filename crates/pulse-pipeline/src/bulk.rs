use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulse_analyzer::Analyzer;
use pulse_core::types::{Analysis, FeedbackRecord};
use pulse_store::RecordStore;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 50;
pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 10;

/// Effective knobs for one bulk run.
#[derive(Debug, Clone, Copy)]
pub struct BulkOptions {
    pub rate_limit_rpm: f64,
    pub batch_size: usize,
    pub max_concurrency: usize,
}

impl BulkOptions {
    /// Build options with out-of-range values clamped into bounds.
    pub fn clamped(rate_limit_rpm: f64, batch_size: usize, max_concurrency: usize) -> Self {
        Self {
            rate_limit_rpm,
            batch_size: batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
            max_concurrency: max_concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
        }
    }

    /// Seconds between staggered batch starts, derived from the RPM budget.
    pub fn delay_seconds(&self) -> f64 {
        if self.rate_limit_rpm > 0.0 {
            (60.0 / self.rate_limit_rpm).max(0.1)
        } else {
            2.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemSuccess {
    pub index: usize,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub index: usize,
    pub error: String,
}

/// Result envelope returned to the bulk-upload caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub total: usize,
    pub success: Vec<ItemSuccess>,
    pub failed: Vec<ItemFailure>,
    pub batches: usize,
    pub rate_limit_rpm: f64,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub delay_seconds: f64,
}

#[derive(Debug, Clone)]
struct ItemMeta {
    index: usize,
    id: Option<String>,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PreparedBatch {
    number: usize,
    texts: Vec<String>,
    metas: Vec<ItemMeta>,
}

enum BatchOutcome {
    Success {
        batch: PreparedBatch,
        analyses: Vec<Analysis>,
    },
    Failure {
        batch: PreparedBatch,
        error: String,
    },
}

/// Batch-parallel enrichment of an uploaded item list.
///
/// Prepare groups items into batches; Dispatch runs one task per batch with
/// `delay_seconds × batch_number` staggered starts under a concurrency
/// semaphore; Collect pairs metadata with analyses by position and persists
/// everything in a single read-modify-write.
pub struct BulkEngine {
    analyzer: Analyzer,
    records: Arc<RecordStore>,
}

impl BulkEngine {
    pub fn new(analyzer: Analyzer, records: Arc<RecordStore>) -> Self {
        Self { analyzer, records }
    }

    pub async fn run(&self, items: &[Value], options: BulkOptions) -> BulkReport {
        let delay_seconds = options.delay_seconds();

        // Phase 1 — prepare.
        let (batches, prep_failures) = prepare(items, options.batch_size);
        let batch_count = batches.len();
        info!(
            items = items.len(),
            batches = batch_count,
            batch_size = options.batch_size,
            max_concurrency = options.max_concurrency,
            "bulk enrichment started"
        );

        // Phase 2 — dispatch.
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency));
        let mut handles = Vec::with_capacity(batch_count);
        for batch in batches {
            let analyzer = self.analyzer.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let stagger = Duration::from_secs_f64(delay_seconds * batch.number as f64);
                tokio::time::sleep(stagger).await;
                let _permit = semaphore.acquire().await.ok();
                match analyzer.analyze_batch(&batch.texts).await {
                    Ok(analyses) => BatchOutcome::Success { batch, analyses },
                    Err(e) => BatchOutcome::Failure {
                        batch,
                        error: e.to_string(),
                    },
                }
            }));
        }

        // Phase 3 — collect, in input order.
        let mut success: Vec<ItemSuccess> = Vec::new();
        let mut failed = prep_failures;
        let mut records = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(BatchOutcome::Success { batch, analyses }) => {
                    for ((meta, analysis), text) in
                        batch.metas.into_iter().zip(analyses).zip(batch.texts)
                    {
                        let id = meta
                            .id
                            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                        success.push(ItemSuccess {
                            index: meta.index,
                            id: id.clone(),
                        });
                        records.push(FeedbackRecord::from_analysis(
                            id,
                            text,
                            meta.user_id,
                            analysis,
                            meta.created_at,
                        ));
                    }
                }
                Ok(BatchOutcome::Failure { batch, error }) => {
                    warn!(batch = batch.number, error = %error, "batch analysis failed");
                    for meta in batch.metas {
                        failed.push(ItemFailure {
                            index: meta.index,
                            error: format!("Batch error: {error}"),
                        });
                    }
                }
                Err(e) => warn!(error = %e, "batch task aborted"),
            }
        }

        if let Err(e) = self.records.append_many(&records) {
            warn!(error = %e, "failed to persist bulk records");
            // One read-modify-write means no partial outcome: everything
            // that was about to succeed failed instead.
            let message = e.to_string();
            for item in success.drain(..) {
                failed.push(ItemFailure {
                    index: item.index,
                    error: message.clone(),
                });
            }
        }

        let report = BulkReport {
            total: success.len() + failed.len(),
            success,
            failed,
            batches: batch_count,
            rate_limit_rpm: options.rate_limit_rpm,
            batch_size: options.batch_size,
            max_concurrency: options.max_concurrency,
            delay_seconds,
        };
        info!(
            total = report.total,
            success = report.success.len(),
            failed = report.failed.len(),
            "bulk enrichment finished"
        );
        report
    }
}

/// Walk the raw items once: extract text/user/id/timestamp, route empty
/// texts into the failure list, seal a batch every `batch_size` items.
fn prepare(items: &[Value], batch_size: usize) -> (Vec<PreparedBatch>, Vec<ItemFailure>) {
    let mut batches = Vec::new();
    let mut failures = Vec::new();
    let mut texts: Vec<String> = Vec::new();
    let mut metas: Vec<ItemMeta> = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let text = item
            .get("text")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if text.is_empty() {
            failures.push(ItemFailure {
                index,
                error: "Missing text".to_string(),
            });
            continue;
        }

        texts.push(text.to_string());
        metas.push(ItemMeta {
            index,
            id: field_str(item, &["id"]),
            user_id: field_str(item, &["userId", "user_id", "user"]),
            created_at: parse_created_at(item),
        });

        if texts.len() == batch_size {
            batches.push(PreparedBatch {
                number: batches.len(),
                texts: std::mem::take(&mut texts),
                metas: std::mem::take(&mut metas),
            });
        }
    }
    if !texts.is_empty() {
        batches.push(PreparedBatch {
            number: batches.len(),
            texts,
            metas,
        });
    }

    (batches, failures)
}

/// First non-empty string among the aliases.
fn field_str(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        item.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    })
}

/// ISO timestamp with or without offset; anything else means "now".
fn parse_created_at(item: &Value) -> DateTime<Utc> {
    ["createdAt", "created_at"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .and_then(|raw| {
            raw.parse::<DateTime<Utc>>()
                .ok()
                .or_else(|| raw.parse::<chrono::NaiveDateTime>().ok().map(|n| n.and_utc()))
        })
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pulse_analyzer::{PredictorError, StructuredPredictor};
    use serde_json::json;

    /// Fake predictor: batch size comes from the schema's `minItems`; a
    /// prompt containing "detonate" simulates an API failure.
    struct FakePredictor;

    #[async_trait]
    impl StructuredPredictor for FakePredictor {
        fn name(&self) -> &str {
            "fake"
        }

        async fn predict(&self, prompt: &str, schema: &Value) -> Result<Value, PredictorError> {
            if prompt.contains("detonate") {
                return Err(PredictorError::Api {
                    status: 502,
                    message: "upstream exploded".to_string(),
                });
            }

            let analysis = json!({
                "sentiment": "positive",
                "key_topics": ["bulk"],
                "action_required": false,
                "summary": "A canned summary of the feedback item.",
            });

            match schema["properties"]["analyses"]["minItems"].as_u64() {
                Some(n) => {
                    let analyses: Vec<Value> = (0..n).map(|_| analysis.clone()).collect();
                    Ok(json!({ "analyses": analyses }))
                }
                None => Ok(analysis),
            }
        }
    }

    fn engine(dir: &tempfile::TempDir) -> (BulkEngine, Arc<RecordStore>) {
        let records = Arc::new(RecordStore::new(dir.path().join("feedback.json")));
        let analyzer = Analyzer::new(Arc::new(FakePredictor));
        (BulkEngine::new(analyzer, records.clone()), records)
    }

    fn text_items(count: usize) -> Vec<Value> {
        (0..count)
            .map(|i| json!({ "text": format!("Feedback {i}"), "userId": format!("user{i}") }))
            .collect()
    }

    fn fast_options(batch_size: usize, max_concurrency: usize) -> BulkOptions {
        // 600 RPM floors the stagger at 0.1s so tests stay quick.
        BulkOptions::clamped(600.0, batch_size, max_concurrency)
    }

    #[test]
    fn delay_seconds_derivation() {
        assert_eq!(BulkOptions::clamped(30.0, 10, 4).delay_seconds(), 2.0);
        assert_eq!(BulkOptions::clamped(20.0, 10, 4).delay_seconds(), 3.0);
        assert_eq!(BulkOptions::clamped(60.0, 10, 4).delay_seconds(), 1.0);
        // Floor at 0.1s for very high budgets, 2s when misconfigured.
        assert_eq!(BulkOptions::clamped(1000.0, 10, 4).delay_seconds(), 0.1);
        assert_eq!(BulkOptions::clamped(0.0, 10, 4).delay_seconds(), 2.0);
    }

    #[test]
    fn options_are_clamped_into_bounds() {
        let options = BulkOptions::clamped(30.0, 0, 99);
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.max_concurrency, 10);

        let options = BulkOptions::clamped(30.0, 500, 0);
        assert_eq!(options.batch_size, 50);
        assert_eq!(options.max_concurrency, 1);
    }

    #[test]
    fn prepare_seals_batches_at_size() {
        let items = text_items(25);
        let (batches, failures) = prepare(&items, 10);
        assert!(failures.is_empty());
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].texts.len(), 10);
        assert_eq!(batches[2].texts.len(), 5);
        assert_eq!(batches[2].number, 2);
    }

    #[tokio::test]
    async fn twenty_five_items_three_batches_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, records) = engine(&dir);

        let report = engine.run(&text_items(25), fast_options(10, 4)).await;

        assert_eq!(report.total, 25);
        assert_eq!(report.batches, 3);
        assert_eq!(report.success.len(), 25);
        assert!(report.failed.is_empty());
        assert_eq!(report.batch_size, 10);
        assert_eq!(records.read_all().unwrap().len(), 25);
    }

    #[tokio::test]
    async fn missing_text_items_fail_without_stopping_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, records) = engine(&dir);

        let items = vec![
            json!({ "text": "", "userId": "u1" }),
            json!({ "text": "hello", "userId": "u2" }),
            json!({ "userId": "u3" }),
        ];
        let report = engine.run(&items, fast_options(10, 4)).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.success.len(), 1);
        assert_eq!(report.failed.len(), 2);
        for failure in &report.failed {
            assert!(failure.error.contains("Missing text"));
        }
        assert_eq!(records.read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_failure_marks_only_that_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, records) = engine(&dir);

        // Two batches of two; the second contains the trigger word.
        let items = vec![
            json!({ "text": "fine one" }),
            json!({ "text": "fine two" }),
            json!({ "text": "please detonate" }),
            json!({ "text": "collateral" }),
        ];
        let report = engine.run(&items, fast_options(2, 4)).await;

        assert_eq!(report.total, 4);
        assert_eq!(report.success.len(), 2);
        assert_eq!(report.failed.len(), 2);
        for failure in &report.failed {
            assert!(failure.error.starts_with("Batch error:"));
            assert!(failure.error.contains("upstream exploded"));
        }
        assert_eq!(records.read_all().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn user_id_aliases_and_explicit_ids_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, records) = engine(&dir);

        let items = vec![
            json!({ "text": "Text 1", "userId": "user1", "id": "custom-id-123" }),
            json!({ "text": "Text 2", "user_id": "user2" }),
            json!({ "text": "Text 3", "user": "user3" }),
        ];
        let report = engine.run(&items, fast_options(10, 4)).await;

        assert_eq!(report.success.len(), 3);
        assert_eq!(report.success[0].id, "custom-id-123");

        let persisted = records.read_all().unwrap();
        let users: Vec<_> = persisted
            .iter()
            .map(|r| r.user_id.clone().unwrap_or_default())
            .collect();
        assert_eq!(users, vec!["user1", "user2", "user3"]);
    }

    #[tokio::test]
    async fn created_at_parses_iso_or_defaults_to_now() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, records) = engine(&dir);

        let items = vec![
            json!({ "text": "dated", "createdAt": "2026-01-05T10:30:00Z" }),
            json!({ "text": "undated", "created_at": "not-a-date" }),
        ];
        engine.run(&items, fast_options(10, 4)).await;

        let persisted = records.read_all().unwrap();
        assert_eq!(
            persisted[0].created_at.to_rfc3339(),
            "2026-01-05T10:30:00+00:00"
        );
        let age = Utc::now() - persisted[1].created_at;
        assert!(age.num_seconds() < 5);
    }
}

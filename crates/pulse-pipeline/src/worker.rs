use std::sync::Arc;

use chrono::Utc;
use pulse_core::types::FeedbackRecord;
use pulse_protocol::{EventType, UpstreamEvent};
use pulse_store::{CursorStore, RecordStore};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::broadcast::Broadcaster;

/// Collaborators shared by every worker task.
struct WorkerContext {
    broadcaster: Arc<Broadcaster>,
    cursors: Arc<CursorStore>,
    records: Arc<RecordStore>,
}

impl WorkerContext {
    /// Process one inbound event: dedup by cursor, persist analyzed items,
    /// advance the cursor, then broadcast (all event types).
    async fn process_event(&self, event: &UpstreamEvent, worker_id: usize) {
        let cursor = self.cursors.get(&event.job_id);
        if event.seq <= cursor {
            debug!(
                worker = worker_id,
                job_id = %event.job_id,
                seq = event.seq,
                "skipping duplicate event"
            );
            return;
        }

        if event.event_type == EventType::ItemAnalyzed {
            let payload = event.item_payload();
            let record = FeedbackRecord {
                id: uuid::Uuid::new_v4().to_string(),
                text: payload.text,
                user_id: None,
                sentiment: payload.sentiment,
                key_topics: payload.key_topics,
                action_required: payload.action_required,
                summary: payload.summary,
                created_at: Utc::now(),
            };
            // A persistence failure must not block cursor advance or broadcast.
            match self.records.append(&record) {
                Ok(()) => debug!(
                    worker = worker_id,
                    record_id = %record.id,
                    seq = event.seq,
                    "persisted record"
                ),
                Err(e) => error!(
                    worker = worker_id,
                    seq = event.seq,
                    error = %e,
                    "failed to persist analyzed item"
                ),
            }
        }

        // Cursor advance stays behind persistence; broadcast only happens
        // once the cursor is durable.
        if let Err(e) = self.cursors.update(&event.job_id, event.seq) {
            error!(
                worker = worker_id,
                job_id = %event.job_id,
                seq = event.seq,
                error = %e,
                "failed to persist cursor, skipping broadcast"
            );
            return;
        }

        self.broadcaster.broadcast(event).await;
    }
}

/// Owns the bounded inbound queue and N worker tasks that drain it.
pub struct EventWorkerPool {
    ctx: Arc<WorkerContext>,
    tx: mpsc::Sender<UpstreamEvent>,
    rx: Arc<Mutex<mpsc::Receiver<UpstreamEvent>>>,
    worker_count: usize,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl EventWorkerPool {
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        cursors: Arc<CursorStore>,
        records: Arc<RecordStore>,
        worker_count: usize,
        queue_size: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_size);
        Self {
            ctx: Arc::new(WorkerContext {
                broadcaster,
                cursors,
                records,
            }),
            tx,
            rx: Arc::new(Mutex::new(rx)),
            worker_count,
            workers: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Sender side of the inbound queue — handed to the bridge.
    pub fn sender(&self) -> mpsc::Sender<UpstreamEvent> {
        self.tx.clone()
    }

    pub fn start(&mut self) {
        for worker_id in 0..self.worker_count {
            let ctx = self.ctx.clone();
            let rx = self.rx.clone();
            let cancel = self.cancel.clone();
            self.workers.push(tokio::spawn(async move {
                loop {
                    let event = tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = async { rx.lock().await.recv().await } => match event {
                            Some(event) => event,
                            None => break,
                        },
                    };
                    ctx.process_event(&event, worker_id).await;
                }
            }));
        }
        info!(workers = self.worker_count, "event worker pool started");
    }

    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
        info!("event worker pool stopped");
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        broadcaster: Arc<Broadcaster>,
        cursors: Arc<CursorStore>,
        records: Arc<RecordStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            broadcaster: Arc::new(Broadcaster::new()),
            cursors: Arc::new(CursorStore::open(dir.path().join("cursors.json"))),
            records: Arc::new(RecordStore::new(dir.path().join("feedback.json"))),
            _dir: dir,
        }
    }

    fn pool(f: &Fixture, workers: usize) -> EventWorkerPool {
        EventWorkerPool::new(
            f.broadcaster.clone(),
            f.cursors.clone(),
            f.records.clone(),
            workers,
            16,
        )
    }

    fn item_event(job_id: &str, seq: u64) -> UpstreamEvent {
        UpstreamEvent::new(
            job_id,
            seq,
            EventType::ItemAnalyzed,
            json!({
                "index": 0,
                "text": "Great service!",
                "sentiment": "positive",
                "keyTopics": ["service"],
                "actionRequired": false,
                "summary": "User praises the quality of service received.",
            }),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn processes_persists_and_broadcasts() {
        let f = fixture();
        let (_id, mut rx) = f.broadcaster.connect().await;
        let mut pool = pool(&f, 1);
        pool.start();

        pool.sender().send(item_event("job1", 1)).await.unwrap();
        settle().await;

        assert_eq!(f.cursors.get("job1"), 1);
        let records = f.records.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Great service!");
        assert!(rx.try_recv().is_ok());

        pool.stop().await;
    }

    #[tokio::test]
    async fn dedup_skips_old_seq_without_side_effects() {
        let f = fixture();
        f.cursors.update("job1", 5).unwrap();
        let (_id, mut rx) = f.broadcaster.connect().await;
        let mut pool = pool(&f, 1);
        pool.start();

        pool.sender().send(item_event("job1", 3)).await.unwrap();
        settle().await;

        assert_eq!(f.cursors.get("job1"), 5);
        assert!(f.records.read_all().unwrap().is_empty());
        assert!(rx.try_recv().is_err());

        pool.stop().await;
    }

    #[tokio::test]
    async fn job_started_broadcasts_without_persisting() {
        let f = fixture();
        let (_id, mut rx) = f.broadcaster.connect().await;
        let mut pool = pool(&f, 1);
        pool.start();

        let event = UpstreamEvent::new(
            "job1",
            1,
            EventType::JobStarted,
            json!({ "totalItems": 5 }),
        );
        pool.sender().send(event).await.unwrap();
        settle().await;

        assert_eq!(f.cursors.get("job1"), 1);
        assert!(f.records.read_all().unwrap().is_empty());
        assert!(rx.try_recv().is_ok());

        pool.stop().await;
    }

    #[tokio::test]
    async fn duplicate_delivery_applies_at_most_once() {
        let f = fixture();
        let (_id, mut rx) = f.broadcaster.connect().await;
        let mut pool = pool(&f, 1);
        pool.start();

        pool.sender().send(item_event("job1", 1)).await.unwrap();
        pool.sender().send(item_event("job1", 1)).await.unwrap();
        settle().await;

        assert_eq!(f.records.read_all().unwrap().len(), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        pool.stop().await;
    }

    #[tokio::test]
    async fn replay_after_preseeded_cursor() {
        let f = fixture();
        f.cursors.update("jobA", 5).unwrap();
        let (_id, mut rx) = f.broadcaster.connect().await;
        let mut pool = pool(&f, 1);
        pool.start();

        for seq in [3, 4, 5, 6, 7] {
            pool.sender().send(item_event("jobA", seq)).await.unwrap();
        }
        settle().await;

        assert_eq!(f.records.read_all().unwrap().len(), 2);
        assert_eq!(f.cursors.get("jobA"), 7);
        let mut broadcasts = 0;
        while rx.try_recv().is_ok() {
            broadcasts += 1;
        }
        assert_eq!(broadcasts, 2);

        pool.stop().await;
    }

    #[tokio::test]
    async fn start_stop_lifecycle() {
        let f = fixture();
        let mut pool = pool(&f, 2);
        pool.start();
        assert_eq!(pool.worker_count(), 2);
        pool.stop().await;
        assert_eq!(pool.worker_count(), 0);
    }
}

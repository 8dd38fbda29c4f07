use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use pulse_protocol::{ResumeFrame, UpstreamEvent};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Persistent client to the upstream event source.
///
/// Connects, announces `{resumeFromSeq}`, forwards received events into the
/// bounded inbound queue (drop-and-log on overflow), and reconnects with
/// exponential backoff. Resume is best-effort — the worker pool's dedup is
/// the authoritative correctness mechanism.
pub struct EventBridge {
    url: String,
    runner: Option<BridgeRunner>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventBridge {
    pub fn new(
        url: impl Into<String>,
        queue: mpsc::Sender<UpstreamEvent>,
        initial_cursors: HashMap<String, u64>,
        base_delay_secs: f64,
        max_delay_secs: f64,
    ) -> Self {
        let url = url.into();
        let cancel = CancellationToken::new();
        Self {
            runner: Some(BridgeRunner {
                url: url.clone(),
                queue,
                last_seq_by_job: initial_cursors,
                base_delay: Duration::from_secs_f64(base_delay_secs),
                max_delay: Duration::from_secs_f64(max_delay_secs),
                cancel: cancel.clone(),
            }),
            url,
            cancel,
            task: None,
        }
    }

    pub fn start(&mut self) {
        if let Some(mut runner) = self.runner.take() {
            self.task = Some(tokio::spawn(async move { runner.connect_loop().await }));
            info!(url = %self.url, "event bridge started");
        }
    }

    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("event bridge stopped");
    }
}

struct BridgeRunner {
    url: String,
    queue: mpsc::Sender<UpstreamEvent>,
    last_seq_by_job: HashMap<String, u64>,
    base_delay: Duration,
    max_delay: Duration,
    cancel: CancellationToken,
}

impl BridgeRunner {
    fn max_seq(&self) -> u64 {
        self.last_seq_by_job.values().copied().max().unwrap_or(0)
    }

    async fn connect_loop(&mut self) {
        let mut delay = self.base_delay;
        while !self.cancel.is_cancelled() {
            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => break,
                attempt = connect_async(self.url.as_str()) => attempt,
            };

            match attempt {
                Ok((mut ws, _)) => {
                    let resume_seq = self.max_seq();
                    let frame = serde_json::to_string(&ResumeFrame {
                        resume_from_seq: resume_seq,
                    })
                    .unwrap_or_default();
                    if ws.send(Message::Text(frame.into())).await.is_ok() {
                        info!(
                            url = %self.url,
                            resume_from_seq = resume_seq,
                            "connected to upstream event source"
                        );
                        // Backoff resets once a connection succeeds.
                        delay = self.base_delay;
                        self.receive_loop(&mut ws).await;
                    }
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    warn!(
                        url = %self.url,
                        delay_secs = delay.as_secs_f64(),
                        "upstream connection lost, reconnecting"
                    );
                }
                Err(e) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    warn!(
                        url = %self.url,
                        error = %e,
                        delay_secs = delay.as_secs_f64(),
                        "upstream connect failed, retrying"
                    );
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = next_delay(delay, self.max_delay);
        }
    }

    async fn receive_loop<S>(&mut self, ws: &mut S)
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::select! {
                _ = self.cancel.cancelled() => return,
                msg = ws.next() => msg,
            };
            match msg {
                Some(Ok(Message::Text(raw))) => self.handle_frame(raw.as_str()),
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "upstream receive error");
                    return;
                }
            }
        }
    }

    fn handle_frame(&mut self, raw: &str) {
        let event: UpstreamEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "upstream sent a non-event frame, ignoring");
                return;
            }
        };

        // Track the latest seq per job for the next resume frame.
        let entry = self.last_seq_by_job.entry(event.job_id.clone()).or_insert(0);
        *entry = (*entry).max(event.seq);

        // Non-blocking enqueue; a full queue drops the event. The cursor was
        // not advanced for it, so an upstream resume re-delivers it.
        match self.queue.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(seq = event.seq, "inbound queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("inbound queue closed, dropping event");
            }
        }
    }
}

/// Exponential backoff step: double, capped at `max`.
fn next_delay(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

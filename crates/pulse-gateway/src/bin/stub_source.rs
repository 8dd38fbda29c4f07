//! Standalone stub WebSocket event source for development and demos.
//!
//! Produces demo feedback-analysis events on a configurable interval while
//! at least one client is connected. A client may send
//! `{"resumeFromSeq": N}` right after connecting to skip events it has
//! already seen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use pulse_protocol::{
    EventType, JobCompletedPayload, JobStartedPayload, ResumeFrame, UpstreamEvent,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "stub-source", about = "Stub WebSocket event source for development")]
struct Args {
    /// Bind host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Bind port.
    #[arg(long, default_value_t = 8765)]
    port: u16,
    /// Seconds between produced events.
    #[arg(long, default_value_t = 2.0)]
    interval: f64,
}

// (text, sentiment, topics, action_required, summary)
const DEMO_FEEDBACKS: &[(&str, &str, &[&str], bool, &str)] = &[
    (
        "The onboarding flow was smooth and easy to follow.",
        "positive",
        &["onboarding", "user experience"],
        false,
        "User found the onboarding flow smooth and easy.",
    ),
    (
        "App crashes whenever I try to upload a photo.",
        "negative",
        &["crash", "photo upload", "bug"],
        true,
        "App crashes consistently during photo upload attempts.",
    ),
    (
        "Support resolved my billing issue within minutes.",
        "positive",
        &["customer support", "billing"],
        false,
        "Support provided a quick resolution to a billing issue.",
    ),
    (
        "The pricing page is confusing and hard to navigate.",
        "negative",
        &["pricing", "navigation", "usability"],
        true,
        "Pricing page layout is confusing and needs a redesign.",
    ),
    (
        "The new dashboard layout is much cleaner than before.",
        "positive",
        &["dashboard", "design"],
        false,
        "User appreciates the cleaner dashboard layout.",
    ),
    (
        "Search results rarely match what I am looking for.",
        "negative",
        &["search", "relevance"],
        true,
        "Search returns results that do not match user queries.",
    ),
    (
        "The mobile app works fine but nothing special.",
        "neutral",
        &["mobile app"],
        false,
        "Mobile app functions adequately without standout features.",
    ),
    (
        "Password reset emails take far too long to arrive.",
        "negative",
        &["password reset", "email delay"],
        true,
        "Password reset emails have excessive delivery delays.",
    ),
    (
        "Great integration with the tools we already use.",
        "positive",
        &["integration", "compatibility"],
        false,
        "User praises integration with existing third-party tools.",
    ),
    (
        "The notification settings cover my basic needs.",
        "neutral",
        &["notifications", "settings"],
        false,
        "Notification settings meet basic user requirements.",
    ),
];

struct Client {
    tx: mpsc::Sender<Message>,
    resume_from: u64,
}

struct StubSource {
    clients: Mutex<HashMap<u64, Client>>,
    next_client_id: AtomicU64,
    seq: AtomicU64,
    interval: Duration,
}

impl StubSource {
    fn new(interval: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            seq: AtomicU64::new(0),
            interval,
        }
    }

    /// Process-global monotonic sequence, starting at 1.
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn has_clients(&self) -> bool {
        !self.clients.lock().await.is_empty()
    }

    /// Push an event to every client whose resume cursor is behind it.
    async fn broadcast(&self, event: &UpstreamEvent) {
        let message = serde_json::to_string(event).unwrap_or_default();
        let snapshot: Vec<(u64, mpsc::Sender<Message>, u64)> = {
            self.clients
                .lock()
                .await
                .iter()
                .map(|(id, c)| (*id, c.tx.clone(), c.resume_from))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, tx, resume_from) in snapshot {
            if event.seq <= resume_from {
                continue;
            }
            if tx.send(Message::Text(message.clone().into())).await.is_err() {
                dead.push(id);
            }
        }
        if !dead.is_empty() {
            let mut clients = self.clients.lock().await;
            for id in dead {
                clients.remove(&id);
            }
        }
    }

    /// Emit one job: job.started, a handful of item.analyzed, job.completed.
    async fn produce_job(&self) {
        let job_id = uuid::Uuid::new_v4().to_string();
        let len = DEMO_FEEDBACKS.len();
        let count = 3 + pseudo_random(len - 2);
        let offset = pseudo_random(len);

        let started = JobStartedPayload {
            total_items: count as u64,
        };
        self.broadcast(&UpstreamEvent::new(
            &job_id,
            self.next_seq(),
            EventType::JobStarted,
            serde_json::to_value(started).unwrap_or_default(),
        ))
        .await;

        for idx in 0..count {
            tokio::time::sleep(self.interval).await;
            if !self.has_clients().await {
                return;
            }
            let (text, sentiment, topics, action_required, summary) =
                DEMO_FEEDBACKS[(offset + idx) % len];
            let payload = serde_json::json!({
                "index": idx,
                "text": text,
                "sentiment": sentiment,
                "keyTopics": topics,
                "actionRequired": action_required,
                "summary": summary,
            });
            self.broadcast(&UpstreamEvent::new(
                &job_id,
                self.next_seq(),
                EventType::ItemAnalyzed,
                payload,
            ))
            .await;
        }

        let completed = JobCompletedPayload {
            total_items: count as u64,
            processed_items: count as u64,
            failed_items: 0,
        };
        self.broadcast(&UpstreamEvent::new(
            &job_id,
            self.next_seq(),
            EventType::JobCompleted,
            serde_json::to_value(completed).unwrap_or_default(),
        ))
        .await;
    }

    async fn producer_loop(&self) {
        loop {
            if self.has_clients().await {
                self.produce_job().await;
                // Pause between jobs.
                tokio::time::sleep(self.interval * 2).await;
            } else {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) {
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(error = %e, "websocket handshake failed");
                return;
            }
        };
        let (mut tx, mut rx) = ws.split();

        // Optional resume frame, expected within a second of connecting.
        let resume_from = match tokio::time::timeout(Duration::from_secs(1), rx.next()).await {
            Ok(Some(Ok(Message::Text(raw)))) => serde_json::from_str::<ResumeFrame>(raw.as_str())
                .map(|f| f.resume_from_seq)
                .unwrap_or(0),
            _ => 0,
        };

        let (sender, mut outbound) = mpsc::channel::<Message>(64);
        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut clients = self.clients.lock().await;
            clients.insert(
                client_id,
                Client {
                    tx: sender,
                    resume_from,
                },
            );
            info!(client = client_id, resume_from, total = clients.len(), "client connected");
        }

        loop {
            tokio::select! {
                msg = outbound.recv() => {
                    match msg {
                        Some(msg) => {
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                // Keep reading so pings are answered and disconnects noticed.
                msg = rx.next() => {
                    match msg {
                        Some(Ok(Message::Ping(data))) => {
                            let _ = tx.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }

        let mut clients = self.clients.lock().await;
        clients.remove(&client_id);
        info!(client = client_id, total = clients.len(), "client disconnected");
    }
}

/// Cheap pseudo-random index derived from the clock — enough variety for a
/// demo feed without a rand dependency.
fn pseudo_random(bound: usize) -> usize {
    if bound == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    nanos as usize % bound
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stub_source=info".into()),
        )
        .init();

    let args = Args::parse();
    let source = Arc::new(StubSource::new(Duration::from_secs_f64(args.interval)));

    let producer = {
        let source = source.clone();
        tokio::spawn(async move { source.producer_loop().await })
    };

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "stub event source on ws://{} (interval {}s)",
        addr, args.interval
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                tokio::spawn(source.clone().handle_connection(stream));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    producer.abort();
    Ok(())
}

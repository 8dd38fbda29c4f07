use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use pulse_protocol::UpstreamEvent;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// Per-subscriber send buffer. A subscriber this far behind backpressures
/// the broadcast call; only a closed channel counts as dead.
const SUBSCRIBER_BUFFER: usize = 64;

pub type SubscriberId = u64;

/// Fan-out of processed events to live downstream subscribers.
///
/// The subscriber set is guarded by a mutex that is never held across a
/// send: `broadcast` snapshots the set under the lock, sends outside it,
/// then subtracts whatever died during the pass.
pub struct Broadcaster {
    clients: Mutex<HashMap<SubscriberId, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber. The caller owns the receiving end and
    /// forwards messages onto its transport; dropping it disconnects.
    pub async fn connect(&self) -> (SubscriberId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut clients = self.clients.lock().await;
        clients.insert(id, tx);
        info!(subscriber = id, total = clients.len(), "subscriber connected");
        (id, rx)
    }

    pub async fn disconnect(&self, id: SubscriberId) {
        let mut clients = self.clients.lock().await;
        if clients.remove(&id).is_some() {
            info!(subscriber = id, total = clients.len(), "subscriber disconnected");
        }
    }

    /// Serialize the event once and push it to every subscriber.
    pub async fn broadcast(&self, event: &UpstreamEvent) {
        let message = match serde_json::to_string(event) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "failed to serialize event, skipping broadcast");
                return;
            }
        };

        let snapshot: Vec<(SubscriberId, mpsc::Sender<String>)> = {
            let clients = self.clients.lock().await;
            clients.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(message.clone()).await.is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.lock().await;
            for id in &dead {
                clients.remove(id);
            }
            info!(removed = dead.len(), total = clients.len(), "removed dead subscribers");
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

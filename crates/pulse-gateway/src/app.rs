use axum::{
    routing::{get, post},
    Router,
};
use pulse_analyzer::Analyzer;
use pulse_core::config::PulseConfig;
use pulse_pipeline::{Broadcaster, BulkEngine};
use pulse_store::RecordStore;
use std::sync::Arc;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: PulseConfig,
    pub records: Arc<RecordStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub analyzer: Analyzer,
    pub bulk: BulkEngine,
}

impl AppState {
    pub fn new(
        config: PulseConfig,
        records: Arc<RecordStore>,
        broadcaster: Arc<Broadcaster>,
        analyzer: Analyzer,
    ) -> Self {
        let bulk = BulkEngine::new(analyzer.clone(), records.clone());
        Self {
            config,
            records,
            broadcaster,
            analyzer,
            bulk,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/api/v1/feedback", post(crate::http::feedback::create_feedback))
        .route("/api/v1/history", get(crate::http::history::history_handler))
        .route("/api/v1/metrics", get(crate::http::metrics::metrics_handler))
        .route("/api/v1/feedback/bulk", post(crate::http::bulk::bulk_upload))
        .route("/ws", get(crate::ws::stream::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

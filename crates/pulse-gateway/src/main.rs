use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use pulse_analyzer::{Analyzer, OpenAiPredictor};
use pulse_core::config::PulseConfig;
use pulse_pipeline::{Broadcaster, EventBridge, EventWorkerPool};
use pulse_store::{CursorStore, RecordStore};

mod app;
mod http;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pulse_gateway=info,pulse_pipeline=info,tower_http=debug".into()
            }),
        )
        .init();

    // load config: explicit path via PULSE_CONFIG > ./pulse.toml > defaults
    let config_path = std::env::var("PULSE_CONFIG").ok();
    let config = PulseConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        PulseConfig::default()
    });

    // Construct in dependency order: stores and broadcaster first, then the
    // worker pool over both, then the bridge feeding the pool's queue.
    let records = Arc::new(RecordStore::new(&config.storage.record_file));
    let cursors = Arc::new(CursorStore::open(&config.upstream.cursor_file));
    let broadcaster = Arc::new(Broadcaster::new());

    if config.analyzer.api_key.is_none() {
        warn!("no analyzer API key configured, every analysis will use the fallback");
    }
    let predictor = Arc::new(OpenAiPredictor::new(
        config.analyzer.api_key.clone().unwrap_or_default(),
        config.analyzer.base_url.clone(),
        config.analyzer.model.clone(),
    ));
    let analyzer = Analyzer::new(predictor);

    let mut pool = EventWorkerPool::new(
        broadcaster.clone(),
        cursors.clone(),
        records.clone(),
        config.upstream.worker_count,
        config.upstream.inbound_queue_size,
    );
    pool.start();

    let mut bridge = EventBridge::new(
        config.upstream.url.clone(),
        pool.sender(),
        cursors.all_cursors(),
        config.upstream.reconnect_base_delay,
        config.upstream.reconnect_max_delay,
    );
    bridge.start();

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config, records, broadcaster, analyzer));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("Pulse gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    bridge.stop().await;
    pool.stop().await;

    Ok(())
}

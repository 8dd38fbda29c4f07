use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level config (pulse.toml + environment overrides).
///
/// The environment knobs keep the names the deployment scripts already use
/// (`BULK_*`, `WS_*`, `STUB_WS_URL`, `NVIDIA_API_KEY`) and are mapped onto
/// the nested sections below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            storage: StorageConfig::default(),
            analyzer: AnalyzerConfig::default(),
            bulk: BulkConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON array of persisted feedback records.
    #[serde(default = "default_record_file")]
    pub record_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            record_file: default_record_file(),
        }
    }
}

/// Settings for the OpenAI-compatible structured predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// API key; without one the gateway still runs, every analysis resolves
    /// to the fallback.
    pub api_key: Option<String>,
    #[serde(default = "default_analyzer_base_url")]
    pub base_url: String,
    #[serde(default = "default_analyzer_model")]
    pub model: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_analyzer_base_url(),
            model: default_analyzer_model(),
        }
    }
}

/// Defaults for bulk enrichment; per-request query params override these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            rate_limit_rpm: default_rate_limit_rpm(),
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Upstream event-source connection and worker-pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Seconds; doubles per failed attempt up to `reconnect_max_delay`.
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay: f64,
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: f64,
    #[serde(default = "default_inbound_queue_size")]
    pub inbound_queue_size: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_cursor_file")]
    pub cursor_file: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            reconnect_base_delay: default_reconnect_base_delay(),
            reconnect_max_delay: default_reconnect_max_delay(),
            inbound_queue_size: default_inbound_queue_size(),
            worker_count: default_worker_count(),
            cursor_file: default_cursor_file(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_record_file() -> String {
    "data/feedback.json".to_string()
}
fn default_analyzer_base_url() -> String {
    "https://integrate.api.nvidia.com/v1".to_string()
}
fn default_analyzer_model() -> String {
    "openai/gpt-oss-20b".to_string()
}
fn default_rate_limit_rpm() -> f64 {
    30.0
}
fn default_batch_size() -> usize {
    10
}
fn default_max_concurrency() -> usize {
    4
}
fn default_upstream_url() -> String {
    "ws://localhost:8765".to_string()
}
fn default_reconnect_base_delay() -> f64 {
    1.0
}
fn default_reconnect_max_delay() -> f64 {
    30.0
}
fn default_inbound_queue_size() -> usize {
    256
}
fn default_worker_count() -> usize {
    2
}
fn default_cursor_file() -> String {
    "data/ws_cursors.json".to_string()
}

impl PulseConfig {
    /// Load config from a TOML file with environment overrides.
    ///
    /// Checks in order: explicit path argument, then `pulse.toml` in the
    /// working directory. A missing file is fine — defaults apply.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("pulse.toml");

        let config: PulseConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(env_overrides())
            .extract()
            .map_err(|e| crate::error::PulseError::Config(e.to_string()))?;

        Ok(config)
    }
}

/// Map the flat deployment env vars onto nested config keys.
fn env_overrides() -> Env {
    Env::raw()
        .only(&[
            "BULK_RATE_LIMIT_RPM",
            "BULK_BATCH_SIZE",
            "BULK_MAX_CONCURRENCY",
            "STUB_WS_URL",
            "WS_RECONNECT_BASE_DELAY",
            "WS_RECONNECT_MAX_DELAY",
            "WS_INBOUND_QUEUE_SIZE",
            "WS_WORKER_COUNT",
            "WS_CURSOR_FILE",
            "NVIDIA_API_KEY",
        ])
        .map(|key| {
            match key.as_str().to_ascii_lowercase().as_str() {
                "bulk_rate_limit_rpm" => "bulk.rate_limit_rpm".into(),
                "bulk_batch_size" => "bulk.batch_size".into(),
                "bulk_max_concurrency" => "bulk.max_concurrency".into(),
                "stub_ws_url" => "upstream.url".into(),
                "ws_reconnect_base_delay" => "upstream.reconnect_base_delay".into(),
                "ws_reconnect_max_delay" => "upstream.reconnect_max_delay".into(),
                "ws_inbound_queue_size" => "upstream.inbound_queue_size".into(),
                "ws_worker_count" => "upstream.worker_count".into(),
                "ws_cursor_file" => "upstream.cursor_file".into(),
                "nvidia_api_key" => "analyzer.api_key".into(),
                other => other.to_string().into(),
            }
        })
        .split(".")
}

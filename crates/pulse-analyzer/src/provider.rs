use async_trait::async_trait;
use serde_json::Value;

/// A black-box structured-output predictor.
///
/// Given a prompt and the JSON schema of the expected result, returns a value
/// conforming to that schema. The production binding calls an
/// OpenAI-compatible endpoint; tests inject an in-memory fake that
/// pattern-matches the prompt.
#[async_trait]
pub trait StructuredPredictor: Send + Sync {
    /// Predictor name for logging and error messages.
    fn name(&self) -> &str;

    async fn predict(&self, prompt: &str, schema: &Value) -> Result<Value, PredictorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

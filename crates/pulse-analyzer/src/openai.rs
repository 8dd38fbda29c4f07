use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::provider::{PredictorError, StructuredPredictor};

const MAX_TOKENS: u32 = 512;
const TEMPERATURE: f64 = 0.2;
const TOP_P: f64 = 0.7;

/// Production predictor binding — any OpenAI-compatible chat-completions
/// endpoint with `json_schema` response format support.
pub struct OpenAiPredictor {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiPredictor {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }
}

#[async_trait]
impl StructuredPredictor for OpenAiPredictor {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn predict(&self, prompt: &str, schema: &Value) -> Result<Value, PredictorError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "top_p": TOP_P,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "analysis",
                    "schema": schema,
                    "strict": true,
                },
            },
        });
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, "sending structured prediction request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "predictor API error");
            return Err(PredictorError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| PredictorError::Parse(e.to_string()))?;

        let content = api_resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PredictorError::Parse("response contained no choices".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| PredictorError::Parse(format!("model returned invalid JSON: {e}")))
    }
}

// OpenAI-compatible response types (private — only used for deserialization)

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

use std::sync::Arc;

use pulse_core::types::{Analysis, Sentiment, DEFAULT_SUMMARY};
use serde_json::Value;

use crate::prompt;
use crate::provider::{PredictorError, StructuredPredictor};

/// Single-item and batch feedback analysis on top of a structured predictor.
#[derive(Clone)]
pub struct Analyzer {
    predictor: Arc<dyn StructuredPredictor>,
}

impl Analyzer {
    pub fn new(predictor: Arc<dyn StructuredPredictor>) -> Self {
        Self { predictor }
    }

    /// Analyze one feedback text. Never fails — any predictor error resolves
    /// to the fallback analysis carrying the error message.
    pub async fn analyze(&self, text: &str) -> Analysis {
        match self.try_analyze(text).await {
            Ok(analysis) => analysis,
            Err(e) => fallback_analysis(&e.to_string()),
        }
    }

    async fn try_analyze(&self, text: &str) -> Result<Analysis, PredictorError> {
        let value = self
            .predictor
            .predict(&prompt::analysis_prompt(text), &prompt::analysis_schema())
            .await?;
        Ok(normalize_analysis(&value))
    }

    /// Analyze many texts in one model call, preserving input order.
    ///
    /// A length-1 batch delegates to [`Self::analyze`]. When the model
    /// returns a different number of analyses than requested, the whole call
    /// fails with a validation error — the caller decides what to do with
    /// the batch.
    pub async fn analyze_batch(&self, texts: &[String]) -> Result<Vec<Analysis>, PredictorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() == 1 {
            return Ok(vec![self.analyze(&texts[0]).await]);
        }

        let value = self
            .predictor
            .predict(
                &prompt::batch_analysis_prompt(texts),
                &prompt::batch_schema(texts.len()),
            )
            .await?;

        let analyses = value
            .get("analyses")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                PredictorError::Parse("batch response missing 'analyses' array".to_string())
            })?;

        if analyses.len() != texts.len() {
            return Err(PredictorError::Validation(format!(
                "expected {} analyses, model returned {}",
                texts.len(),
                analyses.len()
            )));
        }

        Ok(analyses.iter().map(normalize_analysis).collect())
    }
}

/// Post-process one raw model analysis: coerce sentiment, lowercase and strip
/// topics dropping empties, replace an empty summary with the placeholder.
pub fn normalize_analysis(raw: &Value) -> Analysis {
    let sentiment = raw
        .get("sentiment")
        .and_then(Value::as_str)
        .map(Sentiment::coerce)
        .unwrap_or(Sentiment::Neutral);

    let summary = raw
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| DEFAULT_SUMMARY.to_string());

    Analysis {
        sentiment,
        key_topics: normalize_topics(raw.get("key_topics")),
        action_required: raw
            .get("action_required")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        summary,
    }
}

fn normalize_topics(raw: Option<&Value>) -> Vec<String> {
    match raw.and_then(Value::as_array) {
        Some(arr) => arr
            .iter()
            .filter_map(Value::as_str)
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect(),
        None => Vec::new(),
    }
}

/// The sentinel analysis returned when a model call fails.
pub fn fallback_analysis(message: &str) -> Analysis {
    Analysis {
        sentiment: Sentiment::Neutral,
        key_topics: vec!["error".to_string()],
        action_required: true,
        summary: format!("Error analyzing feedback: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    /// In-memory predictor that pattern-matches the prompt: batch prompts
    /// get one canned analysis per enumerated item, single prompts get one.
    struct FakePredictor {
        fail_with: Option<String>,
        /// When set, batch responses return this many analyses regardless
        /// of how many items were requested.
        force_batch_len: Option<usize>,
    }

    impl FakePredictor {
        fn ok() -> Self {
            Self {
                fail_with: None,
                force_batch_len: None,
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                force_batch_len: None,
            }
        }

        fn canned(text: &str) -> Value {
            let sentiment = if text.to_lowercase().contains("great") {
                "positive"
            } else if text.to_lowercase().contains("poor") {
                "negative"
            } else {
                "neutral"
            };
            json!({
                "sentiment": sentiment,
                "key_topics": ["  Service  ", "", "Quality"],
                "action_required": sentiment == "negative",
                "summary": format!("Canned summary for: {text}"),
            })
        }
    }

    #[async_trait]
    impl StructuredPredictor for FakePredictor {
        fn name(&self) -> &str {
            "fake"
        }

        async fn predict(&self, prompt: &str, _schema: &Value) -> Result<Value, PredictorError> {
            if let Some(message) = &self.fail_with {
                return Err(PredictorError::Api {
                    status: 500,
                    message: message.clone(),
                });
            }

            if prompt.contains("batch of user feedback") {
                let items: Vec<&str> = prompt
                    .lines()
                    .filter_map(|line| {
                        let (num, rest) = line.split_once(". ")?;
                        num.parse::<usize>().ok()?;
                        Some(rest.trim_matches('"'))
                    })
                    .collect();
                let len = self.force_batch_len.unwrap_or(items.len());
                let analyses: Vec<Value> = (0..len)
                    .map(|i| Self::canned(items.get(i).copied().unwrap_or("")))
                    .collect();
                return Ok(json!({ "analyses": analyses }));
            }

            let text = prompt
                .split(r#"""""#)
                .nth(1)
                .unwrap_or("")
                .trim();
            Ok(Self::canned(text))
        }
    }

    fn analyzer(fake: FakePredictor) -> Analyzer {
        Analyzer::new(Arc::new(fake))
    }

    #[tokio::test]
    async fn analyze_normalizes_topics_and_sentiment() {
        let result = analyzer(FakePredictor::ok()).analyze("Great product!").await;
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.key_topics, vec!["service", "quality"]);
        assert!(!result.action_required);
        assert!(result.summary.contains("Great product!"));
    }

    #[tokio::test]
    async fn analyze_falls_back_on_predictor_error() {
        let result = analyzer(FakePredictor::failing("boom")).analyze("anything").await;
        assert_eq!(result.sentiment, Sentiment::Neutral);
        assert_eq!(result.key_topics, vec!["error"]);
        assert!(result.action_required);
        assert!(result.summary.starts_with("Error analyzing feedback:"));
        assert!(result.summary.contains("boom"));
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let texts = vec![
            "Great onboarding".to_string(),
            "Poor support".to_string(),
            "Average everything".to_string(),
        ];
        let results = analyzer(FakePredictor::ok()).analyze_batch(&texts).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].sentiment, Sentiment::Positive);
        assert_eq!(results[1].sentiment, Sentiment::Negative);
        assert_eq!(results[2].sentiment, Sentiment::Neutral);
    }

    #[tokio::test]
    async fn batch_length_mismatch_is_a_validation_error() {
        let fake = FakePredictor {
            fail_with: None,
            force_batch_len: Some(2),
        };
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let err = analyzer(fake).analyze_batch(&texts).await.unwrap_err();
        assert!(matches!(err, PredictorError::Validation(_)));
    }

    #[tokio::test]
    async fn batch_of_one_delegates_to_single_path() {
        let texts = vec!["Great stuff".to_string()];
        let results = analyzer(FakePredictor::ok()).analyze_batch(&texts).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sentiment, Sentiment::Positive);
    }

    #[tokio::test]
    async fn empty_batch_returns_empty() {
        let results = analyzer(FakePredictor::ok()).analyze_batch(&[]).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn empty_summary_gets_placeholder() {
        let raw = json!({
            "sentiment": "positive",
            "key_topics": [],
            "action_required": false,
            "summary": "   ",
        });
        let analysis = normalize_analysis(&raw);
        assert_eq!(analysis.summary, DEFAULT_SUMMARY);
    }
}

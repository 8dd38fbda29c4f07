use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Summary text used when the model yields nothing usable.
pub const DEFAULT_SUMMARY: &str = "No summary provided.";

/// Closed sentiment set. Anything outside the set collapses to `Neutral`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Default for Sentiment {
    fn default() -> Self {
        Sentiment::Neutral
    }
}

impl Sentiment {
    /// Case-insensitive coercion; unknown values map to `Neutral`.
    pub fn coerce(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

// Hand-written so unknown wire values coerce instead of failing the whole
// record or event.
impl<'de> Deserialize<'de> for Sentiment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Sentiment::coerce(&raw))
    }
}

/// The transient output of one model analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub sentiment: Sentiment,
    pub key_topics: Vec<String>,
    pub action_required: bool,
    pub summary: String,
}

/// One persisted, analyzed feedback item. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub key_topics: Vec<String>,
    pub action_required: bool,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Assemble a record from a completed analysis.
    pub fn from_analysis(
        id: String,
        text: String,
        user_id: Option<String>,
        analysis: Analysis,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            text,
            user_id,
            sentiment: analysis.sentiment,
            key_topics: analysis.key_topics,
            action_required: analysis.action_required,
            summary: analysis.summary,
            created_at,
        }
    }
}

/// Body of `POST /api/v1/feedback`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackCreateRequest {
    pub text: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackCreateResponse {
    pub record: FeedbackRecord,
}

/// Compact row returned by `GET /api/v1/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub user_id: Option<String>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub sentiment: Sentiment,
}

impl From<&FeedbackRecord> for HistoryItem {
    fn from(r: &FeedbackRecord) -> Self {
        Self {
            id: r.id.clone(),
            user_id: r.user_id.clone(),
            summary: r.summary.clone(),
            created_at: r.created_at,
            sentiment: r.sentiment,
        }
    }
}

use chrono::{DateTime, Utc};
use pulse_core::types::{Sentiment, DEFAULT_SUMMARY};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three event kinds an upstream job emits, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "job.started")]
    JobStarted,
    #[serde(rename = "item.analyzed")]
    ItemAnalyzed,
    #[serde(rename = "job.completed")]
    JobCompleted,
}

/// One upstream message.
/// Wire: `{ "jobId": "…", "seq": 7, "type": "item.analyzed", "ts": "…", "payload": {…} }`
///
/// Unknown extra fields are tolerated; `payload` stays a raw value because
/// its shape depends on `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamEvent {
    #[serde(rename = "jobId", default)]
    pub job_id: String,
    #[serde(default)]
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default = "Utc::now")]
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
}

impl UpstreamEvent {
    pub fn new(job_id: impl Into<String>, seq: u64, event_type: EventType, payload: Value) -> Self {
        Self {
            job_id: job_id.into(),
            seq,
            event_type,
            ts: Utc::now(),
            payload,
        }
    }

    /// Interpret the payload as an analyzed item. Missing or malformed
    /// fields fall back to defaults rather than failing the event.
    pub fn item_payload(&self) -> ItemAnalyzedPayload {
        serde_json::from_value(self.payload.clone()).unwrap_or_default()
    }
}

/// Payload of `item.analyzed` — everything needed to build a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAnalyzedPayload {
    #[serde(default)]
    pub index: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub action_required: bool,
    #[serde(default = "default_summary")]
    pub summary: String,
}

impl Default for ItemAnalyzedPayload {
    fn default() -> Self {
        Self {
            index: 0,
            text: String::new(),
            sentiment: Sentiment::Neutral,
            key_topics: Vec::new(),
            action_required: false,
            summary: default_summary(),
        }
    }
}

fn default_summary() -> String {
    DEFAULT_SUMMARY.to_string()
}

/// Payload of `job.started`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStartedPayload {
    pub total_items: u64,
}

/// Payload of `job.completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletedPayload {
    pub total_items: u64,
    pub processed_items: u64,
    pub failed_items: u64,
}

/// First frame the bridge sends after connecting.
/// Wire: `{ "resumeFromSeq": 42 }`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResumeFrame {
    #[serde(rename = "resumeFromSeq", default)]
    pub resume_from_seq: u64,
}

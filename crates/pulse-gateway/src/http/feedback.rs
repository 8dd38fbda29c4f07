//! Single-submit endpoint — POST /api/v1/feedback
//!
//! Analyzes the submitted text (sentiment, key topics, action flag,
//! summary), persists the record, and returns it. The analysis itself never
//! fails — a model error resolves to the fallback analysis.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use pulse_core::types::{FeedbackCreateRequest, FeedbackCreateResponse, FeedbackRecord};
use std::sync::Arc;

use crate::app::AppState;
use crate::http::{error_response, storage_error, ErrorResponse};

pub async fn create_feedback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FeedbackCreateRequest>,
) -> Result<Json<FeedbackCreateResponse>, ErrorResponse> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Text required"));
    }

    let analysis = state.analyzer.analyze(text).await;

    let record = FeedbackRecord::from_analysis(
        uuid::Uuid::new_v4().to_string(),
        text.to_string(),
        req.user_id,
        analysis,
        Utc::now(),
    );

    state.records.append(&record).map_err(storage_error)?;
    Ok(Json(FeedbackCreateResponse { record }))
}

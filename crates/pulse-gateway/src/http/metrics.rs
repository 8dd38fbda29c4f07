//! Metrics endpoint — GET /api/v1/metrics
//!
//! Aggregates are derived from the record store at call time: sentiment
//! distribution, trailing-hour submission buckets, top topics, topic trends.

use axum::{extract::State, Json};
use pulse_metrics::Metrics;
use std::sync::Arc;

use crate::app::AppState;
use crate::http::{storage_error, ErrorResponse};

pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Metrics>, ErrorResponse> {
    let records = state.records.read_all().map_err(storage_error)?;
    Ok(Json(pulse_metrics::compute(&records)))
}

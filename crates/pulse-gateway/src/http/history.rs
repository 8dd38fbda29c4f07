//! History endpoint — GET /api/v1/history
//!
//! All submissions as compact rows, newest first.

use axum::{extract::State, Json};
use pulse_core::types::HistoryItem;
use std::sync::Arc;

use crate::app::AppState;
use crate::http::{storage_error, ErrorResponse};

pub async fn history_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HistoryItem>>, ErrorResponse> {
    let mut records = state.records.read_all().map_err(storage_error)?;
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(records.iter().map(HistoryItem::from).collect()))
}

//! Bulk upload endpoint — POST /api/v1/feedback/bulk
//!
//! Multipart file (CSV or JSON) plus optional query knobs. The engine
//! batches items into model calls under a rate-limit stagger and a
//! concurrency cap; the response reports per-item outcomes.

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use pulse_pipeline::{parse::parse_bulk_payload, BulkOptions, BulkReport};
use serde::Deserialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::http::{error_response, pulse_error, ErrorResponse};

#[derive(Debug, Deserialize)]
pub struct BulkParams {
    pub rate_limit_rpm: Option<f64>,
    pub batch_size: Option<usize>,
    pub max_concurrency: Option<usize>,
}

pub async fn bulk_upload(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BulkParams>,
    mut multipart: Multipart,
) -> Result<Json<BulkReport>, ErrorResponse> {
    let mut upload: Option<(Option<String>, axum::body::Bytes)> = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid multipart body: {e}"),
        )
    })? {
        if field.name() == Some("file") || field.file_name().is_some() {
            let filename = field.file_name().map(String::from);
            let bytes = field.bytes().await.map_err(|e| {
                error_response(StatusCode::BAD_REQUEST, format!("Failed to read file: {e}"))
            })?;
            upload = Some((filename, bytes));
            break;
        }
    }

    let Some((filename, content)) = upload else {
        return Err(error_response(StatusCode::BAD_REQUEST, "Missing file field."));
    };

    let items = parse_bulk_payload(filename.as_deref(), &content).map_err(pulse_error)?;

    let defaults = &state.config.bulk;
    let options = BulkOptions::clamped(
        params.rate_limit_rpm.unwrap_or(defaults.rate_limit_rpm),
        params.batch_size.unwrap_or(defaults.batch_size),
        params.max_concurrency.unwrap_or(defaults.max_concurrency),
    );

    Ok(Json(state.bulk.run(&items, options).await))
}

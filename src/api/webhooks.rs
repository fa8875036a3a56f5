use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::api::AppState;
use crate::error::AppError;
use crate::services::IngestOutcome;

/// Per-provider signature header names. Each provider signs the raw
/// callback body and carries the digest in its own header.
fn signature_header(provider: &str) -> &'static str {
    match provider {
        "mtn" => "x-momo-signature",
        "vodafone" => "x-vodafone-signature",
        "airteltigo" => "x-airteltigo-signature",
        _ => "x-signature",
    }
}

/// POST /webhooks/:provider
///
/// The body is taken as raw bytes so signature verification runs over
/// exactly what the provider sent, before any JSON parsing.
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(signature_header(&provider))
        .and_then(|v| v.to_str().ok());

    let outcome = state.ingest.ingest(&provider, signature, &body).await?;

    let status = match outcome {
        IngestOutcome::Processed => "processed",
        IngestOutcome::Duplicate => "duplicate",
        IngestOutcome::Unmatched => "unmatched",
        IngestOutcome::Conflict => "conflict",
    };

    info!(provider = %provider, status = status, "webhook handled");

    Ok(Json(json!({ "status": status })))
}

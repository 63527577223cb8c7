//! Gateway webhook endpoint.
//!
//! The body must reach verification byte-for-byte as the gateway sent it,
//! so the handler takes raw `Bytes` instead of a typed extractor.

use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode};
use platform_core::error::AppError;

use crate::{services::ReconcileOutcome, AppState};

pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let header_name = state.provider.signature_header();
    let signature = headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Missing {} header", header_name))
        })?;

    let outcome = state.reconciler.process(&body, signature).await?;

    match outcome {
        // Nothing to apply: bad signature or an event type this service does
        // not track. Acknowledge without content so the gateway stops
        // retrying.
        ReconcileOutcome::Ignored => Ok(StatusCode::NO_CONTENT),
        ReconcileOutcome::Duplicate
        | ReconcileOutcome::Unmatched { .. }
        | ReconcileOutcome::Applied { .. }
        | ReconcileOutcome::NoOp { .. } => Ok(StatusCode::OK),
    }
}

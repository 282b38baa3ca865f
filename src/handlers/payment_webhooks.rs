use axum::{extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use http::HeaderMap;

use crate::{errors::ServiceError, AppState};

// POST /api/v1/payments/webhook
//
// Signature-verified, unauthenticated endpoint. The reconciler acknowledges
// unknown event kinds and unknown session references so the at-least-once
// sender stops retrying them.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .reconciler
        .handle_webhook(&headers, &body)
        .await?;

    Ok((StatusCode::OK, "ok"))
}

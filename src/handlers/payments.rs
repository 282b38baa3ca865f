use axum::{
    extract::{Path, State},
    response::Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::services::payments::CheckoutSessionResponse;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutSessionRequest {
    pub amount: Decimal,
}

// POST /api/v1/payments/checkout-session/{order_id}
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(request): Json<CreateCheckoutSessionRequest>,
) -> ApiResult<CheckoutSessionResponse> {
    let session = state
        .services
        .payments
        .create_checkout_session(order_id, request.amount)
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

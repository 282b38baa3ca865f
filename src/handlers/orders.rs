use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::services::orders::OrderResponse;
use crate::{ApiResponse, ApiResult, AppState};

use super::requester_id;

#[derive(Debug, Deserialize)]
pub struct PlaceOrderQuery {
    pub promo_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct LocationUpdateRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct LocationAck {
    pub acknowledged: bool,
}

// POST /api/v1/orders/{user_id}?promo_code=
pub async fn place_order(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<PlaceOrderQuery>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .orders
        .place_order(user_id, query.promo_code.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

// GET /api/v1/orders/{user_id}
pub async fn get_orders(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<OrderResponse>> {
    let orders = state.services.orders.get_orders(user_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

// GET /api/v1/orders/details/{order_id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> ApiResult<OrderResponse> {
    let order = state.services.orders.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

// PATCH /api/v1/orders/{order_id}/status
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<StatusUpdateRequest>,
) -> ApiResult<OrderResponse> {
    let requester = requester_id(&headers)?;
    let new_status = OrderStatus::parse(&request.status)?;
    let order = state
        .services
        .orders
        .update_order_status(order_id, new_status, requester)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

// PATCH /api/v1/orders/{order_id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<OrderResponse> {
    let requester = requester_id(&headers)?;
    let order = state
        .services
        .orders
        .cancel_own_order(order_id, requester)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

// GET /api/v1/orders/admin/all
pub async fn get_all_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<OrderResponse>> {
    let requester = requester_id(&headers)?;
    let orders = state.services.orders.get_all_orders(requester).await?;
    Ok(Json(ApiResponse::success(orders)))
}

// POST /api/v1/orders/{order_id}/location
pub async fn update_order_location(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(request): Json<LocationUpdateRequest>,
) -> ApiResult<LocationAck> {
    state
        .services
        .tracking
        .update_location(order_id, request.latitude, request.longitude)
        .await?;
    Ok(Json(ApiResponse::success(LocationAck {
        acknowledged: true,
    })))
}

pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use http::HeaderMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::{
    orders::OrderService, payments::PaymentService, reconciliation::PaymentReconciler,
    tracking::TrackingService,
};

/// Services shared by HTTP handlers through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub reconciler: Arc<PaymentReconciler>,
    pub tracking: Arc<TrackingService>,
}

/// Requester identity as asserted by the upstream gateway. Authentication
/// itself lives outside this service.
pub(crate) fn requester_id(headers: &HeaderMap) -> Result<Uuid, ServiceError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("Missing X-User-Id header".to_string()))?;

    Uuid::parse_str(raw)
        .map_err(|_| ServiceError::Unauthorized("Invalid X-User-Id header".to_string()))
}

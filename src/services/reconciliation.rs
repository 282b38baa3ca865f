use hmac::{Hmac, Mac};
use http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    clients::cart::CartClient,
    clients::notifications::NotificationSender,
    clients::users::UserDirectoryClient,
    errors::ServiceError,
    services::orders::{OrderResponse, OrderService},
};

type HmacSha256 = Hmac<Sha256>;

/// The only event kind that drives an order forward; everything else is
/// acknowledged untouched so the at-least-once sender stops retrying.
pub const CHECKOUT_COMPLETED_EVENT: &str = "checkout.session.completed";

const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Consumes signed payment notifications and drives the matching order to
/// CONFIRMED exactly once, then fires the post-confirmation side effects.
/// Safe to invoke repeatedly for the same event.
pub struct PaymentReconciler {
    orders: Arc<OrderService>,
    carts: Arc<dyn CartClient>,
    users: Arc<dyn UserDirectoryClient>,
    notifier: Arc<dyn NotificationSender>,
    webhook_secret: Option<String>,
    tolerance_secs: u64,
}

impl PaymentReconciler {
    pub fn new(
        orders: Arc<OrderService>,
        carts: Arc<dyn CartClient>,
        users: Arc<dyn UserDirectoryClient>,
        notifier: Arc<dyn NotificationSender>,
        webhook_secret: Option<String>,
        tolerance_secs: Option<u64>,
    ) -> Self {
        Self {
            orders,
            carts,
            users,
            notifier,
            webhook_secret,
            tolerance_secs: tolerance_secs.unwrap_or(DEFAULT_TOLERANCE_SECS),
        }
    }

    /// Processes one webhook delivery. A clean `Ok` tells the sender the
    /// event is settled; signature failures are the one hard rejection that
    /// must never mutate an order.
    #[instrument(skip(self, headers, payload))]
    pub async fn handle_webhook(
        &self,
        headers: &HeaderMap,
        payload: &[u8],
    ) -> Result<(), ServiceError> {
        if let Some(secret) = &self.webhook_secret {
            if !verify_signature(headers, payload, secret, self.tolerance_secs) {
                warn!("Payment webhook signature verification failed");
                return Err(ServiceError::Unauthorized(
                    "invalid webhook signature".to_string(),
                ));
            }
        }

        let json: Value = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::BadRequest(format!("invalid json: {e}")))?;

        let event_type = json.get("type").and_then(|v| v.as_str()).unwrap_or("");
        if event_type != CHECKOUT_COMPLETED_EVENT {
            info!(event_type, "Ignoring unhandled payment webhook type");
            return Ok(());
        }

        let Some(session_ref) = extract_session_ref(payload) else {
            warn!("Could not extract session reference from webhook payload");
            return Ok(());
        };

        let order = match self.orders.get_by_payment_session_ref(&session_ref).await? {
            Some(order) => order,
            None => {
                // Acknowledged so the sender does not retry a reference we
                // will never recognize.
                warn!(%session_ref, "No order found for payment session");
                return Ok(());
            }
        };

        let confirmed = self.orders.mark_confirmed(order.id).await?;
        info!(order_id = confirmed.id, "Order confirmed via payment webhook");

        // Side effects are independently fault-isolated: failure of one must
        // not block the other or roll back the confirmation.
        if let Err(e) = self.send_confirmation(&confirmed).await {
            error!(error = %e, order_id = confirmed.id, "Order confirmation notification failed");
        }
        if let Err(e) = self.carts.clear_cart(confirmed.user_id).await {
            error!(error = %e, order_id = confirmed.id, "Cart clear failed after confirmation");
        }

        Ok(())
    }

    async fn send_confirmation(&self, order: &OrderResponse) -> Result<(), ServiceError> {
        let user = self.users.get_user(order.user_id).await?;

        let item_lines: Vec<String> = order.items.iter().map(|item| item.summary()).collect();
        let subject = format!("Order #{} confirmed", order.id);
        let body = format!(
            "Your order is confirmed!\n\nItems:\n{}\n\nShipping to: {}\nTotal: {}",
            item_lines.join("\n"),
            order.shipping_address,
            order.total_amount,
        );

        self.notifier.send(&user.email, &subject, &body).await
    }
}

/// Extracts the payment session reference from the event payload. Strict
/// typed deserialization first; falls back to walking the raw JSON for the
/// same field when the payload carries extra or unexpected structure.
fn extract_session_ref(payload: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct CheckoutEvent {
        #[serde(rename = "type")]
        _kind: String,
        data: CheckoutEventData,
    }
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct CheckoutEventData {
        object: CheckoutSessionObject,
    }
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct CheckoutSessionObject {
        id: String,
    }

    if let Ok(event) = serde_json::from_slice::<CheckoutEvent>(payload) {
        if !event.data.object.id.is_empty() {
            return Some(event.data.object.id);
        }
    }

    serde_json::from_slice::<Value>(payload)
        .ok()?
        .pointer("/data/object/id")?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Verifies the webhook HMAC. Supports the generic `x-timestamp` /
/// `x-signature` header pair and the Stripe-style `Stripe-Signature:
/// t=...,v1=...` format; both sign `"{timestamp}.{payload}"`.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            if !timestamp_within_tolerance(ts, tolerance_secs) {
                return false;
            }
            return constant_time_eq(&expected_signature(ts, payload, secret), sig);
        }
    }

    if let Some(sig) = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        let mut ts = "";
        let mut v1 = "";
        for part in sig.split(',') {
            let mut it = part.trim().split('=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            if !timestamp_within_tolerance(ts, tolerance_secs) {
                return false;
            }
            return constant_time_eq(&expected_signature(ts, payload, secret), v1);
        }
    }

    false
}

fn expected_signature(timestamp: &str, payload: &[u8], secret: &str) -> String {
    let signed = format!("{}.{}", timestamp, std::str::from_utf8(payload).unwrap_or(""));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signed.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn timestamp_within_tolerance(raw: &str, tolerance_secs: u64) -> bool {
    match raw.parse::<i64>() {
        Ok(ts) => {
            let now = chrono::Utc::now().timestamp();
            (now - ts).unsigned_abs() <= tolerance_secs
        }
        Err(_) => false,
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

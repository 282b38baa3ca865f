mod common;

use http::StatusCode;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use common::{checkout_completed_event, TestApp, SHOP_ADDRESS};
use orderflow_api::entities::order::OrderStatus;
use orderflow_api::errors::ServiceError;

/// Places an order and opens a checkout session; returns (order id, session
/// reference).
async fn order_with_session(app: &TestApp, shopper: Uuid) -> (i64, String) {
    app.seed_product(1, dec!(30.00), 10);
    app.put_cart(shopper, vec![(1, 2, "M")]);
    let order = app.place_order(shopper, None).await;

    app.state
        .services
        .payments
        .create_checkout_session(order.id, order.total_amount)
        .await
        .expect("checkout session creation failed");

    let stored = app.get_order(order.id).await;
    let session_ref = stored.payment_session_ref.expect("session ref not stored");
    (order.id, session_ref)
}

#[tokio::test]
async fn checkout_session_stores_reference_and_returns_redirect_url() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    app.seed_product(1, dec!(30.00), 10);
    app.put_cart(shopper, vec![(1, 1, "M")]);
    let order = app.place_order(shopper, None).await;

    let session = app
        .state
        .services
        .payments
        .create_checkout_session(order.id, order.total_amount)
        .await
        .unwrap();

    assert!(session.url.starts_with("https://"));

    let stored = app.get_order(order.id).await;
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(stored.payment_session_ref.is_some());

    // Amount reaches the provider in minor units, tagged with the order.
    let requests = app.provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount_minor, 3000);
    assert_eq!(requests[0].currency, "usd");
    assert_eq!(requests[0].order_id, order.id);
}

#[tokio::test]
async fn provider_failure_leaves_the_order_pending_and_retryable() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    app.seed_product(1, dec!(30.00), 10);
    app.put_cart(shopper, vec![(1, 1, "M")]);
    let order = app.place_order(shopper, None).await;

    app.provider.make_unavailable();
    let err = app
        .state
        .services
        .payments
        .create_checkout_session(order.id, order.total_amount)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::PaymentFailed(_)));
    let stored = app.get_order(order.id).await;
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(stored.payment_session_ref.is_none());
}

#[tokio::test]
async fn retrying_session_creation_overwrites_the_reference() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let (order_id, first_ref) = order_with_session(&app, shopper).await;

    app.state
        .services
        .payments
        .create_checkout_session(order_id, dec!(60.00))
        .await
        .unwrap();

    let stored = app.get_order(order_id).await;
    let second_ref = stored.payment_session_ref.unwrap();
    assert_ne!(first_ref, second_ref);

    // The superseded reference no longer reconciles to anything; the
    // webhook is acknowledged without confirming the order.
    let status = app
        .post_webhook(&checkout_completed_event(&first_ref), true)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.get_order(order_id).await.status, OrderStatus::Pending);

    let status = app
        .post_webhook(&checkout_completed_event(&second_ref), true)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.get_order(order_id).await.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn completed_webhook_confirms_clears_cart_and_notifies() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let (order_id, session_ref) = order_with_session(&app, shopper).await;
    assert!(!app.carts.cart_of(shopper).is_empty());

    let status = app
        .post_webhook(&checkout_completed_event(&session_ref), true)
        .await;

    assert_eq!(status, StatusCode::OK);
    let order = app.get_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Confirmed);

    // Cart cleared
    assert!(app.carts.cart_of(shopper).is_empty());

    // Confirmation notification with the per-item summary, address and total
    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, format!("user-{shopper}@example.com"));
    assert!(sent[0].subject.contains(&order_id.to_string()));
    assert!(sent[0].body.contains("2x Product #1 (M)"));
    assert!(sent[0].body.contains(SHOP_ADDRESS));
    assert!(sent[0].body.contains("Total: 60"));
}

#[tokio::test]
async fn webhook_redelivery_is_idempotent() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let (order_id, session_ref) = order_with_session(&app, shopper).await;

    let event = checkout_completed_event(&session_ref);
    assert_eq!(app.post_webhook(&event, true).await, StatusCode::OK);
    assert_eq!(app.post_webhook(&event, true).await, StatusCode::OK);

    let order = app.get_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Confirmed);

    // Re-clearing an already-empty cart is a no-op, not an error.
    assert!(app.carts.cart_of(shopper).is_empty());
}

#[tokio::test]
async fn unsigned_or_tampered_webhooks_never_touch_orders() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let (order_id, session_ref) = order_with_session(&app, shopper).await;

    let status = app
        .post_webhook(&checkout_completed_event(&session_ref), false)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let order = app.get_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(app.notifier.sent().is_empty());
    assert!(!app.carts.cart_of(shopper).is_empty());
}

#[tokio::test]
async fn unrelated_event_kinds_are_acknowledged_as_no_ops() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let (order_id, session_ref) = order_with_session(&app, shopper).await;

    let event = json!({
        "id": "evt_2",
        "type": "payment_intent.created",
        "data": { "object": { "id": session_ref } }
    });

    assert_eq!(app.post_webhook(&event, true).await, StatusCode::OK);
    assert_eq!(app.get_order(order_id).await.status, OrderStatus::Pending);
}

// An unknown session reference is acknowledged with success so the sender
// stops retrying; the event is effectively dropped. If that ever becomes a
// dead-letter flow instead, this assertion is the one to change.
#[tokio::test]
async fn unknown_session_reference_is_acknowledged() {
    let app = TestApp::new().await;

    let status = app
        .post_webhook(&checkout_completed_event("cs_test_unknown"), true)
        .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_payload_without_session_reference_is_acknowledged() {
    let app = TestApp::new().await;

    let event = json!({
        "type": "checkout.session.completed",
        "data": {}
    });

    assert_eq!(app.post_webhook(&event, true).await, StatusCode::OK);
}

#[tokio::test]
async fn notification_failure_does_not_block_confirmation_or_cart_clearing() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let (order_id, session_ref) = order_with_session(&app, shopper).await;

    // The user directory loses the record between placement and
    // confirmation, so the notification side effect fails its email lookup.
    app.users.remove_user(shopper);

    let status = app
        .post_webhook(&checkout_completed_event(&session_ref), true)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.get_order(order_id).await.status, OrderStatus::Confirmed);
    assert!(app.notifier.sent().is_empty());
    assert!(app.carts.cart_of(shopper).is_empty());
}

mod common;

use axum::body::Body;
use http::{Request, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use common::{response_json, TestApp};
use orderflow_api::entities::order::OrderStatus;
use orderflow_api::errors::ServiceError;

async fn pending_order(app: &TestApp, shopper: Uuid) -> i64 {
    app.seed_product(1, dec!(10.00), 100);
    app.put_cart(shopper, vec![(1, 1, "M")]);
    app.place_order(shopper, None).await.id
}

async fn set_status(app: &TestApp, order_id: i64, status: OrderStatus, requester: Uuid) {
    app.state
        .services
        .orders
        .update_order_status(order_id, status, requester)
        .await
        .expect("status update failed");
}

#[tokio::test]
async fn admin_walks_the_happy_path() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let admin = app.seed_admin();
    let order_id = pending_order(&app, shopper).await;

    set_status(&app, order_id, OrderStatus::Confirmed, admin).await;
    set_status(&app, order_id, OrderStatus::Shipped, admin).await;
    set_status(&app, order_id, OrderStatus::Delivered, admin).await;

    assert_eq!(app.get_order(order_id).await.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn user_may_only_cancel_their_own_order() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let other = app.seed_shopper();
    let order_id = pending_order(&app, shopper).await;

    // Another user cannot touch it.
    let err = app
        .state
        .services
        .orders
        .update_order_status(order_id, OrderStatus::Cancelled, other)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    // The owner cannot move it anywhere but CANCELLED.
    let err = app
        .state
        .services
        .orders
        .update_order_status(order_id, OrderStatus::Shipped, shopper)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    // Cancelling their own pending order works.
    set_status(&app, order_id, OrderStatus::Cancelled, shopper).await;
    assert_eq!(app.get_order(order_id).await.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn shipped_orders_cannot_be_cancelled_by_their_owner() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let admin = app.seed_admin();
    let order_id = pending_order(&app, shopper).await;
    set_status(&app, order_id, OrderStatus::Shipped, admin).await;

    let err = app
        .state
        .services
        .orders
        .update_order_status(order_id, OrderStatus::Cancelled, shopper)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));

    // An administrator may still cancel a shipped order.
    set_status(&app, order_id, OrderStatus::Cancelled, admin).await;
    assert_eq!(app.get_order(order_id).await.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn terminal_states_are_final_even_for_admins() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let admin = app.seed_admin();
    let order_id = pending_order(&app, shopper).await;
    set_status(&app, order_id, OrderStatus::Cancelled, admin).await;

    let err = app
        .state
        .services
        .orders
        .update_order_status(order_id, OrderStatus::Confirmed, admin)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));
}

#[tokio::test]
async fn cancel_own_order_rejects_other_users_and_leaves_the_order_untouched() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let intruder = app.seed_shopper();
    let order_id = pending_order(&app, shopper).await;

    let err = app
        .state
        .services
        .orders
        .cancel_own_order(order_id, intruder)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Forbidden(_)));
    assert_eq!(app.get_order(order_id).await.status, OrderStatus::Pending);
}

#[tokio::test]
async fn cancel_own_order_cancels_a_pending_order() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let order_id = pending_order(&app, shopper).await;

    let order = app
        .state
        .services
        .orders
        .cancel_own_order(order_id, shopper)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn mark_confirmed_is_idempotent_but_respects_terminal_states() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let order_id = pending_order(&app, shopper).await;

    let orders = &app.state.services.orders;
    assert_eq!(
        orders.mark_confirmed(order_id).await.unwrap().status,
        OrderStatus::Confirmed
    );
    // Second confirmation is a no-op success.
    assert_eq!(
        orders.mark_confirmed(order_id).await.unwrap().status,
        OrderStatus::Confirmed
    );

    // A cancelled order can never be confirmed.
    let cancelled_id = pending_order(&app, shopper).await;
    orders
        .cancel_own_order(cancelled_id, shopper)
        .await
        .unwrap();
    let err = orders.mark_confirmed(cancelled_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));
}

#[tokio::test]
async fn admin_listing_requires_the_admin_role() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let admin = app.seed_admin();
    let order_id = pending_order(&app, shopper).await;

    let err = app
        .state
        .services
        .orders
        .get_all_orders(shopper)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    let all = app.state.services.orders.get_all_orders(admin).await.unwrap();
    assert!(all.iter().any(|order| order.id == order_id));
}

#[tokio::test]
async fn listing_returns_only_the_users_own_orders() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let other = app.seed_shopper();
    let order_id = pending_order(&app, shopper).await;
    let other_order_id = pending_order(&app, other).await;

    let orders = app.state.services.orders.get_orders(shopper).await.unwrap();
    assert!(orders.iter().any(|order| order.id == order_id));
    assert!(orders.iter().all(|order| order.id != other_order_id));
}

#[tokio::test]
async fn status_update_over_http_uses_the_gateway_identity() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let admin = app.seed_admin();
    let order_id = pending_order(&app, shopper).await;

    // Without the X-User-Id header the request is rejected.
    let response = app
        .send(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/v1/orders/{order_id}/status"))
                .header("content-type", "application/json")
                .body(Body::from(json!({"status": "CONFIRMED"}).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/v1/orders/{order_id}/status"))
                .header("content-type", "application/json")
                .header("x-user-id", admin.to_string())
                .body(Body::from(json!({"status": "CONFIRMED"}).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "CONFIRMED");

    // Unknown status strings are rejected up front.
    let response = app
        .send(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/v1/orders/{order_id}/status"))
                .header("content-type", "application/json")
                .header("x-user-id", admin.to_string())
                .body(Body::from(json!({"status": "REFUNDED"}).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_order_details_over_http() {
    let app = TestApp::new().await;
    let shopper = app.seed_shopper();
    let order_id = pending_order(&app, shopper).await;

    let response = app
        .send(
            Request::builder()
                .uri(format!("/api/v1/orders/details/{order_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["id"], order_id);

    let response = app
        .send(
            Request::builder()
                .uri("/api/v1/orders/details/999999")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

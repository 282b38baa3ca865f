#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use orderflow_api::{
    api_v1_routes,
    clients::{
        cart::{Cart, CartItem, InMemoryCartClient},
        catalog::{InMemoryProductCatalogClient, Product},
        geocoder::{Coordinates, InMemoryGeocoder},
        notifications::RecordingNotificationSender,
        payment::InMemoryPaymentProvider,
        promotions::InMemoryPromotionClient,
        users::{InMemoryUserDirectoryClient, User, UserRole},
    },
    config::AppConfig,
    db,
    events::{self, EventSender},
    handlers::AppServices,
    message_queue::InMemoryMessageQueue,
    services::{
        orders::{OrderResponse, OrderService},
        payments::PaymentService,
        pricing::PricingResolver,
        reconciliation::PaymentReconciler,
        tracking::TrackingService,
    },
    AppState,
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const SHOP_ADDRESS: &str = "742 Evergreen Terrace, Springfield";
pub const DEST_LAT: f64 = 44.0462;
pub const DEST_LNG: f64 = -123.0236;

/// Application harness backed by an in-memory SQLite database and in-memory
/// collaborator clients.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub carts: Arc<InMemoryCartClient>,
    pub users: Arc<InMemoryUserDirectoryClient>,
    pub catalog: Arc<InMemoryProductCatalogClient>,
    pub promotions: Arc<InMemoryPromotionClient>,
    pub notifier: Arc<RecordingNotificationSender>,
    pub geocoder: Arc<InMemoryGeocoder>,
    pub provider: Arc<InMemoryPaymentProvider>,
    pub queue: Arc<InMemoryMessageQueue>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single pooled connection keeps the in-memory database alive and
        // shared across the whole test.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let carts = Arc::new(InMemoryCartClient::new());
        let users = Arc::new(InMemoryUserDirectoryClient::new());
        let catalog = Arc::new(InMemoryProductCatalogClient::new());
        let promotions = Arc::new(InMemoryPromotionClient::new());
        let notifier = Arc::new(RecordingNotificationSender::new());
        let geocoder = Arc::new(InMemoryGeocoder::new());
        let provider = Arc::new(InMemoryPaymentProvider::new());
        let queue = Arc::new(InMemoryMessageQueue::new());

        let pricing = Arc::new(PricingResolver::new(catalog.clone(), promotions.clone()));
        let orders = Arc::new(OrderService::new(
            db_arc.clone(),
            carts.clone(),
            users.clone(),
            geocoder.clone(),
            pricing,
            event_sender.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            db_arc.clone(),
            users.clone(),
            provider.clone(),
            "usd".to_string(),
            event_sender.clone(),
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            orders.clone(),
            carts.clone(),
            users.clone(),
            notifier.clone(),
            cfg.payment_webhook_secret.clone(),
            cfg.payment_webhook_tolerance_secs,
        ));
        let tracking = Arc::new(TrackingService::new(
            db_arc.clone(),
            queue.clone(),
            event_sender.clone(),
        ));

        let services = AppServices {
            orders,
            payments,
            reconciler,
            tracking,
        };

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
            queue: queue.clone(),
        };

        let router = Router::new()
            .nest("/api/v1", api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            carts,
            users,
            catalog,
            promotions,
            notifier,
            geocoder,
            provider,
            queue,
            _event_task: event_task,
        }
    }

    /// Registers a user whose shipping address geocodes to the shared test
    /// destination.
    pub fn seed_user(&self, role: UserRole) -> Uuid {
        let id = Uuid::new_v4();
        self.users.put_user(User {
            id,
            email: format!("user-{id}@example.com"),
            address: SHOP_ADDRESS.to_string(),
            role,
        });
        self.geocoder.put_address(
            SHOP_ADDRESS,
            Coordinates {
                lat: DEST_LAT,
                lng: DEST_LNG,
            },
        );
        id
    }

    pub fn seed_shopper(&self) -> Uuid {
        self.seed_user(UserRole::User)
    }

    pub fn seed_admin(&self) -> Uuid {
        self.seed_user(UserRole::Admin)
    }

    pub fn seed_product(&self, id: i64, price: Decimal, stock: i32) {
        self.catalog.put_product(Product { id, price, stock });
    }

    pub fn put_cart(&self, user_id: Uuid, items: Vec<(i64, i32, &str)>) {
        let items = items
            .into_iter()
            .map(|(product_id, quantity, size)| CartItem {
                product_id,
                quantity,
                size: size.to_string(),
            })
            .collect();
        self.carts.put_cart(user_id, Cart { items });
    }

    pub async fn place_order(&self, user_id: Uuid, promo_code: Option<&str>) -> OrderResponse {
        self.state
            .services
            .orders
            .place_order(user_id, promo_code)
            .await
            .expect("order placement failed")
    }

    pub async fn get_order(&self, order_id: i64) -> OrderResponse {
        self.state
            .services
            .orders
            .get_order(order_id)
            .await
            .expect("order lookup failed")
    }

    /// Sends a request through the real router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error")
    }

    /// Posts a webhook payload, optionally signed with the configured
    /// secret.
    pub async fn post_webhook(&self, payload: &Value, signed: bool) -> StatusCode {
        let body = serde_json::to_vec(payload).unwrap();
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json");

        if signed {
            let ts = chrono::Utc::now().timestamp().to_string();
            let sig = sign_webhook(&ts, &body, WEBHOOK_SECRET);
            builder = builder.header("x-timestamp", ts).header("x-signature", sig);
        }

        let response = self.send(builder.body(Body::from(body)).unwrap()).await;
        response.status()
    }
}

/// Computes the webhook HMAC the way the payment provider would.
pub fn sign_webhook(timestamp: &str, payload: &[u8], secret: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let signed = format!("{}.{}", timestamp, std::str::from_utf8(payload).unwrap());
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(signed.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// A checkout-completed event as the payment provider delivers it, with the
/// provider's extra fields the typed parser does not model.
pub fn checkout_completed_event(session_ref: &str) -> Value {
    json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_ref,
                "payment_status": "paid",
                "livemode": false
            }
        }
    })
}

/// Reads a response body as JSON.
pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is not valid json")
}

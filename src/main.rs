use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use orderflow_api as api;

use api::clients::{
    cart::{CartClient, HttpCartClient},
    catalog::{HttpProductCatalogClient, ProductCatalogClient},
    geocoder::{Geocoder, HttpGeocoder},
    notifications::{HttpNotificationSender, NotificationSender},
    payment::{HttpPaymentProvider, PaymentProvider, PaymentProviderConfig},
    promotions::{HttpPromotionClient, PromotionClient},
    users::{HttpUserDirectoryClient, UserDirectoryClient},
};
use api::message_queue::{InMemoryMessageQueue, MessageQueue};
use api::services::{
    orders::OrderService, payments::PaymentService, pricing::PricingResolver,
    reconciliation::PaymentReconciler, tracking::TrackingService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Collaborator clients; every outbound call carries this timeout
    let timeout = Duration::from_secs(cfg.http_client_timeout_secs);

    let carts: Arc<dyn CartClient> =
        Arc::new(HttpCartClient::new(cfg.cart_service_url.clone(), timeout)?);
    let users: Arc<dyn UserDirectoryClient> = Arc::new(HttpUserDirectoryClient::new(
        cfg.user_service_url.clone(),
        timeout,
    )?);
    let catalog: Arc<dyn ProductCatalogClient> = Arc::new(HttpProductCatalogClient::new(
        cfg.product_service_url.clone(),
        timeout,
    )?);
    let promotions: Arc<dyn PromotionClient> = Arc::new(HttpPromotionClient::new(
        cfg.promotion_service_url.clone(),
        timeout,
    )?);
    let notifier: Arc<dyn NotificationSender> = Arc::new(HttpNotificationSender::new(
        cfg.notification_service_url.clone(),
        timeout,
    )?);

    if cfg.geocoding_api_key.is_none() {
        warn!("Geocoding API key not configured; address resolution will fail");
    }
    let geocoder: Arc<dyn Geocoder> = Arc::new(HttpGeocoder::new(
        cfg.geocoding_api_url.clone(),
        cfg.geocoding_api_key.clone().unwrap_or_default(),
        timeout,
    )?);

    if cfg.payment_secret_key.is_none() {
        warn!("Payment provider secret key not configured; checkout sessions will fail");
    }
    let provider: Arc<dyn PaymentProvider> = Arc::new(HttpPaymentProvider::new(
        PaymentProviderConfig {
            api_url: cfg.payment_api_url.clone(),
            secret_key: cfg.payment_secret_key.clone().unwrap_or_default(),
            success_url: cfg.checkout_success_url.clone(),
            cancel_url: cfg.checkout_cancel_url.clone(),
        },
        timeout,
    )?);

    // Live-update channel for tracking broadcasts
    let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryMessageQueue::new());

    // Build services
    let pricing = Arc::new(PricingResolver::new(catalog.clone(), promotions.clone()));
    let orders = Arc::new(OrderService::new(
        db_arc.clone(),
        carts.clone(),
        users.clone(),
        geocoder,
        pricing,
        event_sender.clone(),
    ));
    let payments = Arc::new(PaymentService::new(
        db_arc.clone(),
        users.clone(),
        provider,
        cfg.payment_currency.clone(),
        event_sender.clone(),
    ));
    let reconciler = Arc::new(PaymentReconciler::new(
        orders.clone(),
        carts.clone(),
        users.clone(),
        notifier,
        cfg.payment_webhook_secret.clone(),
        cfg.payment_webhook_tolerance_secs,
    ));
    let tracking = Arc::new(TrackingService::new(
        db_arc.clone(),
        queue.clone(),
        event_sender.clone(),
    ));

    let services = api::handlers::AppServices {
        orders,
        payments,
        reconciler,
        tracking,
    };

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc.clone(),
        config: cfg.clone(),
        event_sender,
        services,
        queue,
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(cfg.cors_allow_credentials)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".into());
    };

    // Build router: banner + full v1 API
    let app = Router::<api::AppState>::new()
        .route("/", get(|| async { "orderflow-api up" }))
        .nest("/api/v1", api::api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(app_state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("orderflow-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

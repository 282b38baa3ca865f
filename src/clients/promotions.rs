use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoDiscount {
    pub value: Decimal,
    pub kind: DiscountKind,
}

/// Promotion validation capability. Any error — network, unknown code,
/// expired, already used — means "no discount"; the caller decides whether
/// that aborts anything (order placement deliberately proceeds without it).
#[async_trait]
pub trait PromotionClient: Send + Sync {
    async fn validate(&self, email: &str, code: &str) -> Result<PromoDiscount, ServiceError>;
}

pub struct HttpPromotionClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPromotionClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: super::build_http_client(timeout)?,
            base_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    discount: Option<Decimal>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[async_trait]
impl PromotionClient for HttpPromotionClient {
    #[instrument(skip(self, email))]
    async fn validate(&self, email: &str, code: &str) -> Result<PromoDiscount, ServiceError> {
        let url = format!("{}/api/promos/validate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "email": email, "code": code }))
            .send()
            .await?
            .error_for_status()?
            .json::<ValidateResponse>()
            .await?;

        let (Some(value), Some(kind)) = (response.discount, response.kind) else {
            return Err(ServiceError::ValidationError(format!(
                "Promo code {code} is not valid"
            )));
        };

        let kind = match kind.to_ascii_uppercase().as_str() {
            "PERCENTAGE" => DiscountKind::Percentage,
            "FIXED" => DiscountKind::Fixed,
            other => {
                return Err(ServiceError::ValidationError(format!(
                    "Unknown discount type: {other}"
                )))
            }
        };

        Ok(PromoDiscount { value, kind })
    }
}

/// In-memory promotion validator for development and tests. Codes are
/// registered up front; `make_unreachable` simulates the promotion service
/// being down.
#[derive(Default)]
pub struct InMemoryPromotionClient {
    codes: Mutex<HashMap<String, PromoDiscount>>,
    unreachable: AtomicBool,
}

impl InMemoryPromotionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_code(&self, code: &str, discount: PromoDiscount) {
        self.codes
            .lock()
            .unwrap()
            .insert(code.to_string(), discount);
    }

    pub fn make_unreachable(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PromotionClient for InMemoryPromotionClient {
    async fn validate(&self, _email: &str, code: &str) -> Result<PromoDiscount, ServiceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "promotion service unreachable".to_string(),
            ));
        }

        self.codes
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("Promo code {code} is not valid"))
            })
    }
}

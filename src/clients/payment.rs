use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;

use crate::errors::ServiceError;

/// Credentials and redirect targets for the hosted-checkout provider.
/// Passed in at construction; there is no process-wide key.
#[derive(Debug, Clone)]
pub struct PaymentProviderConfig {
    pub api_url: String,
    pub secret_key: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    /// Amount in minor currency units (cents).
    pub amount_minor: i64,
    pub currency: String,
    /// Attached as session metadata; comes back in the webhook for
    /// diagnostics (reconciliation itself keys on the session id).
    pub order_id: i64,
    pub customer_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// Hosted payment-session capability.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError>;
}

pub struct HttpPaymentProvider {
    client: reqwest::Client,
    config: PaymentProviderConfig,
}

impl HttpPaymentProvider {
    pub fn new(config: PaymentProviderConfig, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: super::build_http_client(timeout)?,
            config,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    #[instrument(skip(self, request), fields(order_id = request.order_id))]
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.secret_key)
            .json(&json!({
                "mode": "payment",
                "amount": request.amount_minor,
                "currency": request.currency,
                "customer_email": request.customer_email,
                "success_url": self.config.success_url,
                "cancel_url": self.config.cancel_url,
                "metadata": { "order_id": request.order_id.to_string() },
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<SessionResponse>()
            .await?;

        Ok(CheckoutSession {
            session_id: response.id,
            url: response.url,
        })
    }
}

/// In-memory provider for development and tests: hands out sequential
/// session references; `make_unavailable` simulates provider outage.
#[derive(Default)]
pub struct InMemoryPaymentProvider {
    requests: Mutex<Vec<CreateSessionRequest>>,
    next_session: AtomicU64,
    unavailable: AtomicBool,
}

impl InMemoryPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// Session-creation requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<CreateSessionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "payment provider unavailable".to_string(),
            ));
        }

        self.requests.lock().unwrap().push(request.clone());
        let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CheckoutSession {
            session_id: format!("cs_test_{n}"),
            url: format!("https://pay.example.com/session/cs_test_{n}"),
        })
    }
}

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    clients::payment::{CreateSessionRequest, PaymentProvider},
    clients::users::UserDirectoryClient,
    db::DbPool,
    entities::order::{self, Entity as OrderEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutSessionResponse {
    pub url: String,
}

/// Opens hosted checkout sessions for pending orders and records the
/// session reference used later by webhook reconciliation.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    users: Arc<dyn UserDirectoryClient>,
    provider: Arc<dyn PaymentProvider>,
    currency: String,
    event_sender: EventSender,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        users: Arc<dyn UserDirectoryClient>,
        provider: Arc<dyn PaymentProvider>,
        currency: String,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            users,
            provider,
            currency,
            event_sender,
        }
    }

    /// Creates a hosted payment session for the order and returns the
    /// redirect URL. On provider failure the order stays PENDING and the
    /// call can simply be retried; a retry that succeeds overwrites the
    /// stored session reference (last call wins).
    #[instrument(skip(self), fields(order_id = order_id, amount = %amount))]
    pub async fn create_checkout_session(
        &self,
        order_id: i64,
        amount: Decimal,
    ) -> Result<CheckoutSessionResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id, "Failed to fetch order for checkout session");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let user = self.users.get_user(order.user_id).await?;

        let amount_minor = (amount * dec!(100)).trunc().to_i64().ok_or_else(|| {
            ServiceError::ValidationError(format!("Amount {amount} is out of range"))
        })?;

        let request = CreateSessionRequest {
            amount_minor,
            currency: self.currency.clone(),
            order_id,
            customer_email: user.email,
        };

        let session = self
            .provider
            .create_session(&request)
            .await
            .map_err(|e| {
                error!(error = %e, order_id, "Checkout session creation failed");
                ServiceError::PaymentFailed(format!(
                    "Checkout session creation failed for order {order_id}"
                ))
            })?;

        let next_version = order.version + 1;
        let mut active: order::ActiveModel = order.into();
        active.payment_session_ref = Set(Some(session.session_id.clone()));
        active.updated_at = Set(Some(chrono::Utc::now()));
        active.version = Set(next_version);

        active.update(&*self.db).await.map_err(|e| {
            error!(error = %e, order_id, "Failed to persist payment session reference");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id,
            session_ref = %session.session_id,
            "Checkout session created"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentSessionCreated {
                order_id,
                session_ref: session.session_id.clone(),
            })
            .await
        {
            warn!(error = %e, order_id, "Failed to send payment session created event");
        }

        Ok(CheckoutSessionResponse { url: session.url })
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    clients::cart::CartClient,
    clients::geocoder::Geocoder,
    clients::users::UserDirectoryClient,
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::PricingResolver,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub size: String,
}

impl OrderItemResponse {
    /// One-line human summary used in confirmation notifications.
    pub fn summary(&self) -> String {
        format!(
            "{}x Product #{} ({})",
            self.quantity, self.product_id, self.size
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: i64,
    pub user_id: Uuid,
    pub shipping_address: String,
    pub destination_lat: f64,
    pub destination_lng: f64,
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_session_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

/// Owns the order lifecycle: builds line items from the cart, computes the
/// total, persists the order, and guards every later status transition.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    carts: Arc<dyn CartClient>,
    users: Arc<dyn UserDirectoryClient>,
    geocoder: Arc<dyn Geocoder>,
    pricing: Arc<PricingResolver>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        carts: Arc<dyn CartClient>,
        users: Arc<dyn UserDirectoryClient>,
        geocoder: Arc<dyn Geocoder>,
        pricing: Arc<PricingResolver>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            carts,
            users,
            geocoder,
            pricing,
            event_sender,
        }
    }

    /// Places an order from the user's current cart. This is the sole
    /// creation path: the order row and its items are written in one
    /// transaction, fully formed, or not at all.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        promo_code: Option<&str>,
    ) -> Result<OrderResponse, ServiceError> {
        let user = self.users.get_user(user_id).await?;

        let cart = self.carts.get_cart(user_id).await?;
        if cart.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        let coordinates = self
            .geocoder
            .geocode(&user.address)
            .await?
            .ok_or_else(|| {
                ServiceError::AddressResolutionFailed(format!(
                    "No geocoding result for shipping address of user {user_id}"
                ))
            })?;

        let priced = self
            .pricing
            .price_cart(&cart.items, promo_code, &user.email)
            .await?;

        let db = &*self.db;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order placement");
            ServiceError::DatabaseError(e)
        })?;

        let order_active_model = order::ActiveModel {
            user_id: Set(user_id),
            shipping_address: Set(user.address.clone()),
            destination_lat: Set(coordinates.lat),
            destination_lng: Set(coordinates.lng),
            current_lat: Set(None),
            current_lng: Set(None),
            total_amount: Set(priced.total),
            status: Set(OrderStatus::Pending.to_string()),
            payment_session_ref: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
            ..Default::default()
        };

        let order_model = order_active_model.insert(&txn).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "Failed to create order in database");
            ServiceError::DatabaseError(e)
        })?;

        let mut item_models = Vec::with_capacity(priced.lines.len());
        for line in &priced.lines {
            let item = order_item::ActiveModel {
                order_id: Set(order_model.id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                size: Set(line.size.clone()),
                ..Default::default()
            };
            let item_model = item.insert(&txn).await.map_err(|e| {
                error!(error = %e, order_id = order_model.id, "Failed to create order item");
                ServiceError::DatabaseError(e)
            })?;
            item_models.push(item_model);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = order_model.id, "Failed to commit order placement");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = order_model.id,
            user_id = %user_id,
            total = %order_model.total_amount,
            "Order placed"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::OrderCreated(order_model.id))
            .await
        {
            warn!(error = %e, order_id = order_model.id, "Failed to send order created event");
        }

        Ok(model_to_response(order_model, item_models))
    }

    /// Retrieves a single order with its items.
    #[instrument(skip(self), fields(order_id = order_id))]
    pub async fn get_order(&self, order_id: i64) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(order_id).await?;
        let items = self.load_items(order_id).await?;
        Ok(model_to_response(order, items))
    }

    /// All orders owned by a user, newest first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_orders(&self, user_id: Uuid) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "Failed to fetch orders");
                ServiceError::DatabaseError(e)
            })?;

        self.with_items(orders).await
    }

    /// Every order in the store; administrator only.
    #[instrument(skip(self), fields(admin_id = %admin_id))]
    pub async fn get_all_orders(&self, admin_id: Uuid) -> Result<Vec<OrderResponse>, ServiceError> {
        let requester = self.users.get_user(admin_id).await?;
        if !requester.role.is_admin() {
            return Err(ServiceError::Unauthorized(
                "Administrator role required".to_string(),
            ));
        }

        let orders = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch all orders");
                ServiceError::DatabaseError(e)
            })?;

        self.with_items(orders).await
    }

    /// Authorization-gated status change. Administrators may move an order
    /// anywhere the state machine allows; regular users may only cancel
    /// their own orders, and only before shipment.
    #[instrument(skip(self), fields(order_id = order_id, requester_id = %requester_id, new_status = %new_status))]
    pub async fn update_order_status(
        &self,
        order_id: i64,
        new_status: OrderStatus,
        requester_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(order_id).await?;
        let requester = self.users.get_user(requester_id).await?;
        let current = order.status()?;

        if requester.role.is_admin() {
            // Administrators may additionally cancel late-stage (shipped)
            // orders; terminal states still never move.
            let allowed = current.can_transition_to(new_status)
                || (new_status == OrderStatus::Cancelled && !current.is_terminal());
            if !allowed {
                return Err(ServiceError::InvalidTransition(format!(
                    "Cannot transition order {order_id} from {current} to {new_status}"
                )));
            }
        } else {
            if order.user_id != requester_id {
                return Err(ServiceError::Forbidden(
                    "Users may only modify their own orders".to_string(),
                ));
            }
            if new_status != OrderStatus::Cancelled {
                return Err(ServiceError::Forbidden(
                    "Users may only cancel orders".to_string(),
                ));
            }
            if matches!(current, OrderStatus::Shipped | OrderStatus::Delivered) {
                return Err(ServiceError::InvalidTransition(
                    "Cannot cancel an order that is already shipped or delivered".to_string(),
                ));
            }
            if !current.can_transition_to(OrderStatus::Cancelled) {
                return Err(ServiceError::InvalidTransition(format!(
                    "Cannot cancel order {order_id} in status {current}"
                )));
            }
        }

        self.transition(order, new_status).await
    }

    /// User-initiated cancellation of their own order.
    #[instrument(skip(self), fields(order_id = order_id, user_id = %user_id))]
    pub async fn cancel_own_order(
        &self,
        order_id: i64,
        user_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(order_id).await?;

        if order.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "Users may only cancel their own orders".to_string(),
            ));
        }

        let current = order.status()?;
        if matches!(current, OrderStatus::Shipped | OrderStatus::Delivered) {
            return Err(ServiceError::InvalidTransition(
                "Cannot cancel an order that is already shipped or delivered".to_string(),
            ));
        }
        if !current.can_transition_to(OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot cancel order {order_id} in status {current}"
            )));
        }

        self.transition(order, OrderStatus::Cancelled).await
    }

    /// Confirmation driven by payment reconciliation. Re-confirming an
    /// already-confirmed order is an idempotent success; webhooks are
    /// delivered at least once.
    #[instrument(skip(self), fields(order_id = order_id))]
    pub async fn mark_confirmed(&self, order_id: i64) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(order_id).await?;
        let current = order.status()?;

        if current == OrderStatus::Confirmed {
            info!(order_id, "Order already confirmed; treating as success");
            let items = self.load_items(order_id).await?;
            return Ok(model_to_response(order, items));
        }

        if !current.can_transition_to(OrderStatus::Confirmed) {
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot confirm order {order_id} in status {current}"
            )));
        }

        self.transition(order, OrderStatus::Confirmed).await
    }

    /// Looks an order up by the payment session reference stored when the
    /// checkout session was created.
    #[instrument(skip(self, session_ref))]
    pub async fn get_by_payment_session_ref(
        &self,
        session_ref: &str,
    ) -> Result<Option<OrderResponse>, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::PaymentSessionRef.eq(session_ref))
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to look up order by session reference");
                ServiceError::DatabaseError(e)
            })?;

        match order {
            Some(order) => {
                let items = self.load_items(order.id).await?;
                Ok(Some(model_to_response(order, items)))
            }
            None => Ok(None),
        }
    }

    async fn find_order(&self, order_id: i64) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    async fn load_items(&self, order_id: i64) -> Result<Vec<OrderItemModel>, ServiceError> {
        OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id, "Failed to fetch order items");
                ServiceError::DatabaseError(e)
            })
    }

    async fn with_items(
        &self,
        orders: Vec<OrderModel>,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.load_items(order.id).await?;
            responses.push(model_to_response(order, items));
        }
        Ok(responses)
    }

    /// Persists a validated status change and emits the matching events.
    async fn transition(
        &self,
        order: OrderModel,
        new_status: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let order_id = order.id;
        let old_status = order.status.clone();
        let next_version = order.version + 1;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status.to_string());
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(next_version);

        let updated = active.update(&*self.db).await.map_err(|e| {
            error!(error = %e, order_id, "Failed to update order status");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id,
            old_status = %old_status,
            new_status = %new_status,
            "Order status updated"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: new_status.to_string(),
            })
            .await
        {
            warn!(error = %e, order_id, "Failed to send order status changed event");
        }

        let lifecycle_event = match new_status {
            OrderStatus::Confirmed => Some(Event::OrderConfirmed(order_id)),
            OrderStatus::Cancelled => Some(Event::OrderCancelled(order_id)),
            OrderStatus::Delivered => Some(Event::OrderDelivered(order_id)),
            _ => None,
        };
        if let Some(event) = lifecycle_event {
            if let Err(e) = self.event_sender.send(event).await {
                warn!(error = %e, order_id, "Failed to send order lifecycle event");
            }
        }

        let items = self.load_items(order_id).await?;
        Ok(model_to_response(updated, items))
    }
}

pub(crate) fn model_to_response(
    model: OrderModel,
    items: Vec<OrderItemModel>,
) -> OrderResponse {
    let status = OrderStatus::parse(&model.status).unwrap_or(OrderStatus::Pending);
    OrderResponse {
        id: model.id,
        user_id: model.user_id,
        shipping_address: model.shipping_address,
        destination_lat: model.destination_lat,
        destination_lng: model.destination_lng,
        current_lat: model.current_lat,
        current_lng: model.current_lng,
        total_amount: model.total_amount,
        status,
        payment_session_ref: model.payment_session_ref,
        created_at: model.created_at,
        items: items
            .into_iter()
            .map(|item| OrderItemResponse {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                size: item.size,
            })
            .collect(),
    }
}

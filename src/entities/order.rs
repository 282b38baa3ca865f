use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Lifecycle of an order.
///
/// `PENDING -> CONFIRMED -> SHIPPED -> DELIVERED` is the happy path;
/// `CANCELLED` is reachable from `PENDING` or `CONFIRMED` only. `CANCELLED`
/// and `DELIVERED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Delivered)
    }

    /// Position on the happy path, used to keep transitions monotonic.
    fn rank(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Shipped => 2,
            OrderStatus::Delivered => 3,
            OrderStatus::Cancelled => 4,
        }
    }

    /// Whether the order may move from `self` to `next`. Re-applying the
    /// current status is always a permitted no-op.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match next {
            OrderStatus::Cancelled => {
                matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
            }
            _ => next.rank() > self.rank(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        OrderStatus::from_str(raw.trim().to_ascii_uppercase().as_str())
            .map_err(|_| ServiceError::InvalidStatus(format!("Unknown order status: {raw}")))
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub user_id: Uuid,

    /// Address snapshot taken at placement time; never re-fetched.
    pub shipping_address: String,

    /// Destination resolved once at placement via the geocoder.
    pub destination_lat: f64,
    pub destination_lng: f64,

    /// Last reported courier position; written by the delivery tracker only.
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,

    /// Post-discount total computed once at placement; never recalculated.
    pub total_amount: Decimal,

    pub status: String,

    /// Hosted-checkout session reference, the reconciliation lookup key.
    /// Unique across orders; overwritten if a new session is created.
    pub payment_session_ref: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl Model {
    pub fn status(&self) -> Result<OrderStatus, ServiceError> {
        OrderStatus::parse(&self.status)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    message_queue::{Message, MessageQueue},
};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Orders closer than this to their destination count as delivered.
const DELIVERY_RADIUS_KM: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub order_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Ingests courier position updates, broadcasts them to the order's
/// tracking topic, and derives delivery completion by proximity to the
/// destination while the order is SHIPPED.
#[derive(Clone)]
pub struct TrackingService {
    db: Arc<DbPool>,
    queue: Arc<dyn MessageQueue>,
    event_sender: EventSender,
}

impl TrackingService {
    pub fn new(db: Arc<DbPool>, queue: Arc<dyn MessageQueue>, event_sender: EventSender) -> Self {
        Self {
            db,
            queue,
            event_sender,
        }
    }

    /// Handles one position report. The raw update is broadcast
    /// unconditionally, even for unknown orders; only SHIPPED orders can
    /// transition to DELIVERED from here.
    #[instrument(skip(self), fields(order_id = order_id))]
    pub async fn update_location(
        &self,
        order_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), ServiceError> {
        let update = LocationUpdate {
            order_id,
            latitude,
            longitude,
        };
        self.broadcast(&format!("order/{order_id}"), json!(update))
            .await;

        let Some(order) = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id, "Failed to fetch order for location update");
                ServiceError::DatabaseError(e)
            })?
        else {
            warn!(order_id, "Location update for unknown order; broadcast only");
            return Ok(());
        };

        let status = order.status()?;
        let destination_lat = order.destination_lat;
        let destination_lng = order.destination_lng;

        let delivered = status == OrderStatus::Shipped
            && haversine_km(latitude, longitude, destination_lat, destination_lng)
                < DELIVERY_RADIUS_KM;

        let next_version = order.version + 1;
        let mut active: order::ActiveModel = order.into();
        active.current_lat = Set(Some(latitude));
        active.current_lng = Set(Some(longitude));
        if delivered {
            active.status = Set(OrderStatus::Delivered.to_string());
        }
        active.updated_at = Set(Some(chrono::Utc::now()));
        active.version = Set(next_version);

        active.update(&*self.db).await.map_err(|e| {
            error!(error = %e, order_id, "Failed to persist location update");
            ServiceError::DatabaseError(e)
        })?;

        if delivered {
            info!(order_id, "Order arrived at destination; marked delivered");
            self.broadcast(
                &format!("order-status/{order_id}"),
                json!(OrderStatus::Delivered.to_string()),
            )
            .await;

            if let Err(e) = self.event_sender.send(Event::OrderDelivered(order_id)).await {
                warn!(error = %e, order_id, "Failed to send order delivered event");
            }
            if let Err(e) = self
                .event_sender
                .send(Event::OrderStatusChanged {
                    order_id,
                    old_status: OrderStatus::Shipped.to_string(),
                    new_status: OrderStatus::Delivered.to_string(),
                })
                .await
            {
                warn!(error = %e, order_id, "Failed to send order status changed event");
            }
        } else if status == OrderStatus::Shipped {
            // Every update while en route re-announces the current status.
            self.broadcast(
                &format!("order-status/{order_id}"),
                json!(OrderStatus::Shipped.to_string()),
            )
            .await;
        }

        Ok(())
    }

    /// Broadcasts are best-effort; a full or disconnected channel must not
    /// fail the position ingest.
    async fn broadcast(&self, topic: &str, payload: serde_json::Value) {
        if let Err(e) = self
            .queue
            .publish(Message::new(topic.to_string(), payload))
            .await
        {
            warn!(topic, error = %e, "Failed to publish tracking update");
        }
    }
}

/// Great-circle distance in kilometers.
pub(crate) fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

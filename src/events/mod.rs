use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

/// Events emitted by the checkout saga as state changes commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(i64),
    OrderConfirmed(i64),
    OrderCancelled(i64),
    OrderDelivered(i64),
    OrderStatusChanged {
        order_id: i64,
        old_status: String,
        new_status: String,
    },
    PaymentSessionCreated {
        order_id: i64,
        session_ref: String,
    },
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated(_) => "order_created",
            Event::OrderConfirmed(_) => "order_confirmed",
            Event::OrderCancelled(_) => "order_cancelled",
            Event::OrderDelivered(_) => "order_delivered",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::PaymentSessionCreated { .. } => "payment_session_created",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, recording each event. Runs for the lifetime of
/// the process; exits when every sender has been dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = receiver.recv().await {
        counter!("orderflow_events.processed", 1, "event" => event.name());
        info!(event = event.name(), payload = ?event, "Domain event");
    }
    info!("Event processor stopped; all senders dropped");
}

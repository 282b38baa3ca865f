/*!
 * Live-update channel for order tracking.
 *
 * Position and status broadcasts are published to per-order topics
 * (`order/{id}` and `order-status/{id}`); a delivery mechanism (websocket
 * bridge, message broker) consumes them from whichever backend is wired in.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MessageQueueError {
    #[error("Queue is full")]
    QueueFull,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Message envelope for published items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Message {
    pub fn new(topic: String, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            payload,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Publish/subscribe port for different backends
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError>;
    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError>;
}

/// In-memory implementation, used in development and tests
#[derive(Debug)]
pub struct InMemoryMessageQueue {
    queues: Arc<Mutex<HashMap<String, VecDeque<Message>>>>,
    max_size: usize,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            max_size: 1000,
        }
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            max_size,
        }
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError> {
        let mut queues = self.queues.lock().unwrap();
        let queue = queues
            .entry(message.topic.clone())
            .or_insert_with(VecDeque::new);

        if queue.len() >= self.max_size {
            return Err(MessageQueueError::QueueFull);
        }

        queue.push_back(message);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError> {
        let mut queues = self.queues.lock().unwrap();
        if let Some(queue) = queues.get_mut(topic) {
            Ok(queue.pop_front())
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_then_subscribe_round_trips_in_order() {
        let queue = InMemoryMessageQueue::new();

        queue
            .publish(Message::new("order/1".into(), json!({"latitude": 40.0})))
            .await
            .unwrap();
        queue
            .publish(Message::new("order/1".into(), json!({"latitude": 41.0})))
            .await
            .unwrap();

        let first = queue.subscribe("order/1").await.unwrap().unwrap();
        assert_eq!(first.payload["latitude"], json!(40.0));
        let second = queue.subscribe("order/1").await.unwrap().unwrap();
        assert_eq!(second.payload["latitude"], json!(41.0));
        assert!(queue.subscribe("order/1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let queue = InMemoryMessageQueue::new();
        queue
            .publish(Message::new("order-status/7".into(), json!("SHIPPED")))
            .await
            .unwrap();

        assert!(queue.subscribe("order-status/8").await.unwrap().is_none());
        assert!(queue.subscribe("order-status/7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bounded_queue_rejects_overflow() {
        let queue = InMemoryMessageQueue::with_max_size(1);
        queue
            .publish(Message::new("order/1".into(), json!(1)))
            .await
            .unwrap();

        let err = queue
            .publish(Message::new("order/1".into(), json!(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, MessageQueueError::QueueFull));
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    pub quantity: i32,
    pub size: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Read/clear access to the cart service.
#[async_trait]
pub trait CartClient: Send + Sync {
    async fn get_cart(&self, user_id: Uuid) -> Result<Cart, ServiceError>;
    async fn clear_cart(&self, user_id: Uuid) -> Result<(), ServiceError>;
}

pub struct HttpCartClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCartClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: super::build_http_client(timeout)?,
            base_url,
        })
    }
}

#[async_trait]
impl CartClient for HttpCartClient {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get_cart(&self, user_id: Uuid) -> Result<Cart, ServiceError> {
        let url = format!("{}/cart/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await?;
        let cart = response.error_for_status()?.json::<Cart>().await?;
        Ok(cart)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn clear_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let url = format!("{}/cart/{}/clear", self.base_url, user_id);
        self.client
            .delete(&url)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// In-memory cart store for development and tests.
#[derive(Default)]
pub struct InMemoryCartClient {
    carts: Mutex<HashMap<Uuid, Cart>>,
}

impl InMemoryCartClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_cart(&self, user_id: Uuid, cart: Cart) {
        self.carts.lock().unwrap().insert(user_id, cart);
    }

    pub fn cart_of(&self, user_id: Uuid) -> Cart {
        self.carts
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CartClient for InMemoryCartClient {
    async fn get_cart(&self, user_id: Uuid) -> Result<Cart, ServiceError> {
        Ok(self.cart_of(user_id))
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.carts.lock().unwrap().remove(&user_id);
        Ok(())
    }
}

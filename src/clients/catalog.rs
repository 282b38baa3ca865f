use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub price: Decimal,
    pub stock: i32,
}

/// Read-only product lookup against the catalog service.
#[async_trait]
pub trait ProductCatalogClient: Send + Sync {
    async fn get_product(&self, product_id: i64) -> Result<Product, ServiceError>;
}

pub struct HttpProductCatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProductCatalogClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: super::build_http_client(timeout)?,
            base_url,
        })
    }
}

#[async_trait]
impl ProductCatalogClient for HttpProductCatalogClient {
    #[instrument(skip(self))]
    async fn get_product(&self, product_id: i64) -> Result<Product, ServiceError> {
        let url = format!("{}/products/{}", self.base_url, product_id);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!(
                "Product {product_id} not found"
            )));
        }

        let product = response.error_for_status()?.json::<Product>().await?;
        Ok(product)
    }
}

/// In-memory catalog for development and tests.
#[derive(Default)]
pub struct InMemoryProductCatalogClient {
    products: Mutex<HashMap<i64, Product>>,
}

impl InMemoryProductCatalogClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_product(&self, product: Product) {
        self.products.lock().unwrap().insert(product.id, product);
    }
}

#[async_trait]
impl ProductCatalogClient for InMemoryProductCatalogClient {
    async fn get_product(&self, product_id: i64) -> Result<Product, ServiceError> {
        self.products
            .lock()
            .unwrap()
            .get(&product_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
    }
}

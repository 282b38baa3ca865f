use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub address: String,
    pub role: UserRole,
}

/// Read-only lookup against the user directory service.
#[async_trait]
pub trait UserDirectoryClient: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<User, ServiceError>;
}

pub struct HttpUserDirectoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectoryClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: super::build_http_client(timeout)?,
            base_url,
        })
    }
}

#[async_trait]
impl UserDirectoryClient for HttpUserDirectoryClient {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        let url = format!("{}/api/users/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!("User {user_id} not found")));
        }

        let user = response.error_for_status()?.json::<User>().await?;
        Ok(user)
    }
}

/// In-memory user directory for development and tests.
#[derive(Default)]
pub struct InMemoryUserDirectoryClient {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserDirectoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn remove_user(&self, user_id: Uuid) {
        self.users.lock().unwrap().remove(&user_id);
    }
}

#[async_trait]
impl UserDirectoryClient for InMemoryUserDirectoryClient {
    async fn get_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("User {user_id} not found")))
    }
}

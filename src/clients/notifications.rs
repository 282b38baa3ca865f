use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;

use crate::errors::ServiceError;

/// Outbound notification capability (email behind the notification service).
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<(), ServiceError>;
}

pub struct HttpNotificationSender {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotificationSender {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: super::build_http_client(timeout)?,
            base_url,
        })
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    #[instrument(skip(self, body), fields(to = %to_email))]
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<(), ServiceError> {
        let url = format!("{}/api/emails/send", self.base_url);
        self.client
            .post(&url)
            .json(&json!({
                "to": to_email,
                "subject": subject,
                "body": body,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records notifications instead of delivering them; for development and
/// tests.
#[derive(Default)]
pub struct RecordingNotificationSender {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to_email.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

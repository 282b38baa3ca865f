/*!
 * Capability ports for the collaborator services the checkout saga talks to.
 *
 * Each port is a trait with typed request/response structs and two
 * implementations: an HTTP client (reqwest, bounded timeout) wired up in
 * production, and an in-memory double used in development and tests.
 * Implementations are injected at construction; nothing here is discovered
 * through a framework proxy or global state.
 */

pub mod cart;
pub mod catalog;
pub mod geocoder;
pub mod notifications;
pub mod payment;
pub mod promotions;
pub mod users;

use crate::errors::ServiceError;
use std::time::Duration;

/// Builds the reqwest client shared by HTTP port implementations. Every
/// collaborator call is a blocking step of the saga, so it always carries a
/// bounded timeout.
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::InternalError(format!("failed to construct HTTP client: {e}")))
}

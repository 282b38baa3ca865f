use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Forward geocoding capability. `Ok(None)` means the address produced no
/// result; transport failures surface as errors.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, ServiceError>;
}

pub struct HttpGeocoder {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpGeocoder {
    pub fn new(api_url: String, api_key: String, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: super::build_http_client(timeout)?,
            api_url,
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    #[instrument(skip(self, address))]
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, ServiceError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json::<GeocodeResponse>()
            .await?;

        Ok(response.results.first().map(|result| Coordinates {
            lat: result.geometry.location.lat,
            lng: result.geometry.location.lng,
        }))
    }
}

/// In-memory geocoder for development and tests; unknown addresses resolve
/// to nothing.
#[derive(Default)]
pub struct InMemoryGeocoder {
    known: Mutex<HashMap<String, Coordinates>>,
}

impl InMemoryGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_address(&self, address: &str, coordinates: Coordinates) {
        self.known
            .lock()
            .unwrap()
            .insert(address.to_string(), coordinates);
    }
}

#[async_trait]
impl Geocoder for InMemoryGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, ServiceError> {
        Ok(self.known.lock().unwrap().get(address).copied())
    }
}

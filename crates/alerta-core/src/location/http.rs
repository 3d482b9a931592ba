//! Network geolocation for hosts without a positioning device.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::DeviceLocator;
use crate::error::LocationError;
use crate::models::Coordinate;
use crate::util::{compact_text, is_http_url};

pub const DEFAULT_GEOLOCATION_URL: &str = "https://ipapi.co/json/";

/// Locates the host through an HTTP endpoint that answers with
/// `{"latitude": .., "longitude": ..}` or `{"lat": .., "lon": ..}`.
#[derive(Debug, Clone)]
pub struct HttpGeolocator {
    endpoint: String,
    client: Client,
}

impl HttpGeolocator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, LocationError> {
        let endpoint = endpoint.into().trim().to_string();
        if !is_http_url(&endpoint) {
            return Err(LocationError::Failed(format!(
                "geolocation endpoint must start with http:// or https://, got '{endpoint}'"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LocationError::Failed(error.to_string()))?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DeviceLocator for HttpGeolocator {
    async fn locate(&self) -> Result<Coordinate, LocationError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| LocationError::Failed(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|error| LocationError::Failed(error.to_string()))?;
        parse_position(&body)
    }
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    #[serde(alias = "lat")]
    latitude: Option<f64>,
    #[serde(alias = "lon", alias = "lng")]
    longitude: Option<f64>,
    /// Some providers answer 200 with an error flag
    #[serde(default)]
    error: Option<serde_json::Value>,
    reason: Option<String>,
}

fn parse_position(body: &str) -> Result<Coordinate, LocationError> {
    let payload: PositionResponse = serde_json::from_str(body)
        .map_err(|error| LocationError::Failed(format!("unexpected response: {error}")))?;

    if payload.error.as_ref().is_some_and(|flag| flag != &serde_json::Value::Bool(false)) {
        let reason = payload
            .reason
            .unwrap_or_else(|| "provider returned an error".to_string());
        return Err(LocationError::Failed(reason));
    }

    match (payload.latitude, payload.longitude) {
        (Some(latitude), Some(longitude)) => Coordinate::new(latitude, longitude),
        _ => Err(LocationError::Failed(
            "response did not include latitude/longitude".to_string(),
        )),
    }
}

fn status_error(status: StatusCode, body: &str) -> LocationError {
    let detail = compact_text(body);
    let detail = if detail.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", detail, status.as_u16())
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LocationError::Denied(detail),
        _ => LocationError::Failed(detail),
    }
}

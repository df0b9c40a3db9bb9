use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use crate::config::DistanceSettings;
use crate::services::provider::{DistanceProvider, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Statuses that may clear up if the request is repeated later
const TRANSIENT_STATUSES: [&str; 2] = ["OVER_QUERY_LIMIT", "UNKNOWN_ERROR"];

/// Google Distance Matrix client
pub struct GoogleMatrixClient {
    base_url: String,
    api_key: String,
    language: String,
    region: String,
    client: Client,
}

impl GoogleMatrixClient {
    pub fn new(
        base_url: String,
        api_key: String,
        language: String,
        region: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            language,
            region,
            client,
        })
    }

    pub fn from_settings(settings: &DistanceSettings, api_key: &str) -> Result<Self, ProviderError> {
        Self::new(
            settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key.to_string(),
            settings.language.clone(),
            settings.country.to_lowercase(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    fn request_url(&self, from: &str, to: &str) -> String {
        let mut url = format!(
            "{}/distancematrix/json?origins={}&destinations={}&key={}&units=metric",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(from),
            urlencoding::encode(to),
            urlencoding::encode(&self.api_key),
        );
        if !self.language.is_empty() {
            url.push_str("&language=");
            url.push_str(&urlencoding::encode(&self.language));
        }
        if !self.region.is_empty() {
            url.push_str("&region=");
            url.push_str(&urlencoding::encode(&self.region));
        }
        url
    }
}

/// Extract the kilometer distance from a Distance Matrix response body
///
/// Both the request-level `status` and the element-level `status` are checked; the
/// distance comes from `distance.value` in meters.
pub fn parse_matrix_response(json: &Value, from: &str, to: &str) -> Result<f64, ProviderError> {
    let status = json
        .get("status")
        .and_then(|s| s.as_str())
        .ok_or_else(|| ProviderError::InvalidResponse("Missing status".into()))?;

    if status != "OK" {
        let detail = json
            .get("error_message")
            .and_then(|m| m.as_str())
            .map(|m| format!("{}: {}", status, m))
            .unwrap_or_else(|| status.to_string());
        return Err(if TRANSIENT_STATUSES.contains(&status) {
            ProviderError::Unavailable(detail)
        } else {
            ProviderError::ApiError(detail)
        });
    }

    let element = json
        .pointer("/rows/0/elements/0")
        .ok_or_else(|| ProviderError::InvalidResponse("Missing rows[0].elements[0]".into()))?;

    match element.get("status").and_then(|s| s.as_str()) {
        Some("OK") => {}
        Some("NOT_FOUND") | Some("ZERO_RESULTS") => {
            return Err(ProviderError::NoRoute {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Some(other) => return Err(ProviderError::ApiError(format!("element status {}", other))),
        None => return Err(ProviderError::InvalidResponse("Missing element status".into())),
    }

    element
        .pointer("/distance/value")
        .and_then(|v| v.as_f64())
        .map(|meters| meters / 1000.0)
        .ok_or_else(|| ProviderError::InvalidResponse("Missing distance.value".into()))
}

impl DistanceProvider for GoogleMatrixClient {
    async fn road_distance_km(&self, from: &str, to: &str) -> Result<f64, ProviderError> {
        let url = self.request_url(from, to);

        tracing::debug!("Querying distance matrix: {} -> {}", from, to);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::HttpStatus(response.status()));
        }

        let json: Value = response.json().await?;
        parse_matrix_response(&json, from, to)
    }
}

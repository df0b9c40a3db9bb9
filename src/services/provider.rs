use reqwest::StatusCode;
use std::future::Future;
use thiserror::Error;
use crate::config::{DistanceSettings, ProviderKind};
use crate::services::google::GoogleMatrixClient;
use crate::services::openrouteservice::OrsClient;

/// Errors that can occur when asking an external service for a distance
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Provider returned HTTP {0}")]
    HttpStatus(StatusCode),

    #[error("Provider returned error status: {0}")]
    ApiError(String),

    #[error("Provider temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("No route between {from} and {to}")]
    NoRoute { from: String, to: String },

    #[error("Could not geocode city: {0}")]
    GeocodeNotFound(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Distance provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether retrying later could succeed
    ///
    /// Transient failures are never cached; definitive ones are cached as unreachable
    /// for the rest of the process.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RequestError(e) => !e.is_decode(),
            ProviderError::HttpStatus(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ProviderError::Unavailable(_) => true,
            ProviderError::ApiError(_)
            | ProviderError::NoRoute { .. }
            | ProviderError::GeocodeNotFound(_)
            | ProviderError::InvalidResponse(_)
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

/// External source of road distances between two canonical city names
pub trait DistanceProvider {
    fn road_distance_km(
        &self,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<f64, ProviderError>>;
}

/// Provider selected by configuration
pub enum DistanceBackend {
    OpenRouteService(OrsClient),
    Google(GoogleMatrixClient),
    Disabled,
}

impl DistanceBackend {
    /// Build the configured provider; a provider without an API key is disabled
    pub fn from_settings(settings: &DistanceSettings) -> Result<Self, ProviderError> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        let backend = match (settings.provider, api_key) {
            (ProviderKind::Disabled, _) => DistanceBackend::Disabled,
            (kind, None) => {
                tracing::warn!("No API key for {:?} distance provider, distance lookups disabled", kind);
                DistanceBackend::Disabled
            }
            (ProviderKind::OpenRouteService, Some(key)) => {
                DistanceBackend::OpenRouteService(OrsClient::from_settings(settings, key)?)
            }
            (ProviderKind::Google, Some(key)) => {
                DistanceBackend::Google(GoogleMatrixClient::from_settings(settings, key)?)
            }
        };

        Ok(backend)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistanceBackend::OpenRouteService(_) => "openrouteservice",
            DistanceBackend::Google(_) => "google",
            DistanceBackend::Disabled => "disabled",
        }
    }
}

impl DistanceProvider for DistanceBackend {
    async fn road_distance_km(&self, from: &str, to: &str) -> Result<f64, ProviderError> {
        match self {
            DistanceBackend::OpenRouteService(client) => client.road_distance_km(from, to).await,
            DistanceBackend::Google(client) => client.road_distance_km(from, to).await,
            DistanceBackend::Disabled => Err(ProviderError::NotConfigured(
                "set distance.api_key to enable distance lookups".to_string(),
            )),
        }
    }
}

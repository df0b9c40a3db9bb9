use moka::future::Cache;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use crate::config::DistanceSettings;
use crate::services::provider::{DistanceProvider, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.openrouteservice.org";

/// Geocoded cities kept per client
const GEOCODE_CACHE_CAPACITY: u64 = 10_000;

/// OpenRouteService client
///
/// Resolves each city to coordinates with the geocoding search API, then asks the
/// matrix API for the driving distance between the two points.
pub struct OrsClient {
    base_url: String,
    api_key: String,
    country: String,
    profile: String,
    client: Client,
    coordinates: Cache<String, [f64; 2]>,
}

impl OrsClient {
    /// Create a new OpenRouteService client
    pub fn new(
        base_url: String,
        api_key: String,
        country: String,
        profile: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            country,
            profile,
            client,
            coordinates: Cache::new(GEOCODE_CACHE_CAPACITY),
        })
    }

    pub fn from_settings(settings: &DistanceSettings, api_key: &str) -> Result<Self, ProviderError> {
        Self::new(
            settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key.to_string(),
            settings.country.clone(),
            settings.profile.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// Resolve a city name to `[lon, lat]`
    pub async fn geocode(&self, city: &str) -> Result<[f64; 2], ProviderError> {
        if let Some(coords) = self.coordinates.get(city).await {
            tracing::trace!("Geocode cache hit: {}", city);
            return Ok(coords);
        }

        let mut url = format!(
            "{}/geocode/search?api_key={}&text={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.api_key),
            urlencoding::encode(city),
        );
        if !self.country.is_empty() {
            url.push_str("&boundary.country=");
            url.push_str(&urlencoding::encode(&self.country));
        }

        tracing::debug!("Geocoding city: {}", city);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::HttpStatus(response.status()));
        }

        let json: Value = response.json().await?;

        let features = json
            .get("features")
            .and_then(|f| f.as_array())
            .ok_or_else(|| ProviderError::InvalidResponse("Missing features array".into()))?;

        let feature = features
            .first()
            .ok_or_else(|| ProviderError::GeocodeNotFound(city.to_string()))?;

        let coords = feature
            .pointer("/geometry/coordinates")
            .and_then(|c| c.as_array())
            .and_then(|c| Some([c.first()?.as_f64()?, c.get(1)?.as_f64()?]))
            .ok_or_else(|| ProviderError::InvalidResponse(format!("Missing coordinates for {}", city)))?;

        self.coordinates.insert(city.to_string(), coords).await;
        Ok(coords)
    }

    /// Driving distance in km between two coordinates
    pub async fn matrix_distance(
        &self,
        origin: [f64; 2],
        destination: [f64; 2],
    ) -> Result<Option<f64>, ProviderError> {
        let url = format!(
            "{}/v2/matrix/{}",
            self.base_url.trim_end_matches('/'),
            self.profile
        );

        let body = json!({
            "locations": [origin, destination],
            "metrics": ["distance"],
            "units": "km",
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Matrix request failed: {} - {}", status, body);
            return Err(ProviderError::HttpStatus(status));
        }

        let json: Value = response.json().await?;

        let cell = json
            .pointer("/distances/0/1")
            .ok_or_else(|| ProviderError::InvalidResponse("Missing distances matrix".into()))?;

        // A null cell means the router found no path between the points
        match cell {
            Value::Null => Ok(None),
            other => other
                .as_f64()
                .map(Some)
                .ok_or_else(|| ProviderError::InvalidResponse(format!("Non-numeric distance: {}", other))),
        }
    }
}

impl DistanceProvider for OrsClient {
    async fn road_distance_km(&self, from: &str, to: &str) -> Result<f64, ProviderError> {
        let origin = self.geocode(from).await?;
        let destination = self.geocode(to).await?;

        self.matrix_distance(origin, destination)
            .await?
            .ok_or_else(|| ProviderError::NoRoute {
                from: from.to_string(),
                to: to.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use reqwest::StatusCode;

    fn client(base_url: String) -> OrsClient {
        OrsClient::new(
            base_url,
            "test_key".to_string(),
            "SA".to_string(),
            "driving-car".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn geocode_body(lon: f64, lat: f64) -> String {
        json!({
            "features": [{ "geometry": { "type": "Point", "coordinates": [lon, lat] } }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_geocode_then_matrix() {
        let mut server = Server::new_async().await;

        let riyadh = server
            .mock("GET", "/geocode/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("text".into(), "Riyadh".into()),
                Matcher::UrlEncoded("boundary.country".into(), "SA".into()),
            ]))
            .with_body(geocode_body(46.71, 24.71))
            .expect(1)
            .create_async()
            .await;
        let jeddah = server
            .mock("GET", "/geocode/search")
            .match_query(Matcher::UrlEncoded("text".into(), "Jeddah".into()))
            .with_body(geocode_body(39.19, 21.49))
            .expect(1)
            .create_async()
            .await;
        let matrix = server
            .mock("POST", "/v2/matrix/driving-car")
            .match_header("Authorization", "test_key")
            .with_body(r#"{"distances": [[0.0, 949.3], [949.1, 0.0]]}"#)
            .expect(2)
            .create_async()
            .await;

        let ors = client(server.url());
        assert_eq!(ors.road_distance_km("Riyadh", "Jeddah").await.unwrap(), 949.3);
        // Coordinates come from the geocode cache the second time
        assert_eq!(ors.road_distance_km("Riyadh", "Jeddah").await.unwrap(), 949.3);

        riyadh.assert_async().await;
        jeddah.assert_async().await;
        matrix.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_geocode_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/geocode/search")
            .match_query(Matcher::Any)
            .with_body(r#"{"features": []}"#)
            .create_async()
            .await;

        let err = client(server.url()).road_distance_km("Atlantis", "Riyadh").await.unwrap_err();
        assert!(matches!(err, ProviderError::GeocodeNotFound(ref c) if c == "Atlantis"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_null_matrix_cell_is_no_route() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/geocode/search")
            .match_query(Matcher::Any)
            .with_body(geocode_body(46.71, 24.71))
            .create_async()
            .await;
        server
            .mock("POST", "/v2/matrix/driving-car")
            .with_body(r#"{"distances": [[0.0, null], [null, 0.0]]}"#)
            .create_async()
            .await;

        let err = client(server.url()).road_distance_km("Riyadh", "Island").await.unwrap_err();
        assert!(matches!(err, ProviderError::NoRoute { .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/geocode/search")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = client(server.url()).road_distance_km("Riyadh", "Jeddah").await.unwrap_err();
        assert!(matches!(err, ProviderError::HttpStatus(StatusCode::SERVICE_UNAVAILABLE)));
        assert!(err.is_transient());
    }
}

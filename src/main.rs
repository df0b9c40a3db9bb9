use actix_cors::Cors;
use actix_web::{web, App, HttpServer, HttpResponse, middleware, error, http::StatusCode};
use commissioner_assign::config::{DistanceSettings, LogFormat, LoggingSettings, Settings};
use commissioner_assign::core::{Assigner, CityCanonicalizer};
use commissioner_assign::routes::{self, assignments::AppState};
use commissioner_assign::services::{DistanceBackend, DistanceCache, DistanceOracle};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn, error};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

/// Install the global subscriber; `RUST_LOG` takes precedence over the configured level
fn init_logging(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match logging.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }
}

/// Built-in aliases plus the optional alias file
fn build_canonicalizer(settings: &DistanceSettings) -> CityCanonicalizer {
    let mut canonicalizer = CityCanonicalizer::with_builtin_aliases();

    let Some(path) = &settings.aliases_path else {
        return canonicalizer;
    };

    let loaded = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str::<HashMap<String, String>>(&raw).map_err(|e| e.to_string()));

    match loaded {
        Ok(aliases) => {
            info!("Loaded {} city aliases from {:?}", aliases.len(), path);
            canonicalizer.extend(aliases);
        }
        Err(e) => warn!("Failed to load city aliases from {:?}, using built-in table: {}", path, e),
    }

    canonicalizer
}

/// Open the persisted cache, falling back to memory only when it cannot be read
fn open_cache(settings: &DistanceSettings) -> DistanceCache {
    match DistanceCache::load(&settings.cache_path, settings.flush_every) {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to load distance cache ({}), running without durable caching", e);
            DistanceCache::in_memory()
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Configuration first so it can drive logging; env vars still win
    let loaded = Settings::load();
    let logging = loaded
        .as_ref()
        .map(|settings| settings.logging.clone())
        .unwrap_or_default()
        .with_overrides(std::env::var("LOG_LEVEL").ok(), std::env::var("LOG_FORMAT").ok());
    init_logging(&logging);

    info!("Starting commissioner assignment service...");

    let settings = loaded.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    info!("Configuration loaded successfully");

    let backend = DistanceBackend::from_settings(&settings.distance).map_err(|e| {
        error!("Failed to create distance provider: {}", e);
        std::io::Error::other(format!("Distance provider error: {}", e))
    })?;

    info!("Distance provider: {}", backend.name());

    let cache = open_cache(&settings.distance);
    info!(
        "Distance cache ready ({} entries, flush every {} new entries)",
        cache.len(),
        settings.distance.flush_every
    );

    let oracle = DistanceOracle::new(backend, cache, build_canonicalizer(&settings.distance))
        .with_request_interval(Duration::from_millis(settings.distance.request_interval_ms));
    let oracle = Arc::new(Mutex::new(oracle));

    let rules = settings.assignment.rules();
    info!("Assigner initialized with rules: {:?}", rules);

    // Build application state
    let app_state = AppState {
        oracle: Arc::clone(&oracle),
        assigner: Assigner::new(rules),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    let result = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await;

    // Unconditional flush at termination
    let written = oracle.lock().await.flush().await;
    info!("Flushed {} distance cache entries on shutdown", written);

    result
}

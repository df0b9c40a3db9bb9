use actix_web::{web, HttpResponse, Responder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use validator::Validate;
use crate::core::Assigner;
use crate::models::{
    AssignRequest, AssignResponse, AssignedMatch, DistanceQuery, DistanceResponse, ErrorResponse,
    FlushResponse, HealthResponse, Observer, ObserverUsage, PrewarmRequest,
};
use crate::services::{DistanceBackend, DistanceOracle};

/// Application state shared across all handlers
///
/// The oracle sits behind one async mutex, so assignment runs and cache writes are
/// serialized across workers.
#[derive(Clone)]
pub struct AppState {
    pub oracle: Arc<Mutex<DistanceOracle<DistanceBackend>>>,
    pub assigner: Assigner,
}

/// Configure all assignment-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/assignments", web::post().to(assign_observers))
        .route("/distance", web::get().to(get_distance))
        .route("/distances/prewarm", web::post().to(prewarm_distances))
        .route("/cache/stats", web::get().to(cache_stats))
        .route("/cache/flush", web::post().to(flush_cache));
}

fn bad_request(error: &str, message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: error.to_string(),
        message,
        status_code: 400,
    })
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Assign observers endpoint
///
/// POST /api/v1/assignments
///
/// Request body:
/// ```json
/// {
///   "matches": [{ "id": "M1", "date": "2024-09-14", "city": "Riyadh", "stadium": "King Fahd" }],
///   "observers": [{ "id": "O1", "name": "string", "city": "Riyadh" }],
///   "options": { "minDaysBetween": 2, "useDistance": true, "maxDistanceKm": 150 }
/// }
/// ```
async fn assign_observers(
    state: web::Data<AppState>,
    req: web::Json<AssignRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for assignment request: {}", errors);
        return bad_request("Validation failed", errors.to_string());
    }

    if let Some(options) = &req.options {
        if let Err(errors) = options.validate() {
            return bad_request("Validation failed", errors.to_string());
        }
    }

    if let Some(id) = req.invalid_observer_id() {
        return bad_request(
            "Invalid observers",
            format!("Observer ids must be non-empty and unique, offending id: {:?}", id),
        );
    }

    let rules = match &req.options {
        Some(options) => options.apply(*state.assigner.rules()),
        None => *state.assigner.rules(),
    };
    let matches = req.domain_matches();
    let observers = req.domain_observers();
    let run_id = uuid::Uuid::new_v4().to_string();

    tracing::info!(
        "Run {}: assigning {} matches across {} observers (distance: {})",
        run_id,
        matches.len(),
        observers.len(),
        rules.use_distance
    );

    let run = {
        let mut oracle = state.oracle.lock().await;
        Assigner::new(rules).assign(&matches, &observers, &mut *oracle).await
    };

    let by_id: HashMap<&str, &Observer> = observers.iter().map(|o| (o.id.as_str(), o)).collect();

    let results = matches
        .iter()
        .zip(&run.assignments)
        .map(|(m, assignment)| AssignedMatch::from_parts(m, assignment, &by_id))
        .collect();

    let observer_usage = observers
        .iter()
        .map(|o| ObserverUsage {
            observer_id: o.id.clone(),
            usage_count: run.usage_count(&o.id),
        })
        .collect();

    HttpResponse::Ok().json(AssignResponse {
        run_id,
        results,
        assigned: run.assigned_count(),
        unassigned: run.unassigned_count(),
        observer_usage,
    })
}

/// Distance lookup endpoint
///
/// GET /api/v1/distance?from={city}&to={city}
async fn get_distance(
    state: web::Data<AppState>,
    query: web::Query<DistanceQuery>,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return bad_request("Validation failed", errors.to_string());
    }

    let mut oracle = state.oracle.lock().await;
    let canonical_from = oracle.canonical(&query.from);
    let canonical_to = oracle.canonical(&query.to);
    let distance = oracle.lookup(&query.from, &query.to).await;

    HttpResponse::Ok().json(DistanceResponse {
        from: query.from.clone(),
        to: query.to.clone(),
        canonical_from,
        canonical_to,
        distance_km: distance.km(),
        reachable: distance.is_reachable(),
    })
}

/// Fill the distance cache for every pair of the given cities
///
/// POST /api/v1/distances/prewarm
async fn prewarm_distances(
    state: web::Data<AppState>,
    req: web::Json<PrewarmRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return bad_request("Validation failed", errors.to_string());
    }

    let report = state.oracle.lock().await.prewarm(&req.cities).await;
    HttpResponse::Ok().json(report)
}

/// Cache and lookup statistics
async fn cache_stats(state: web::Data<AppState>) -> impl Responder {
    let oracle = state.oracle.lock().await;

    HttpResponse::Ok().json(serde_json::json!({
        "provider": oracle.provider().name(),
        "cache": oracle.cache_stats(),
        "lookups": oracle.stats(),
    }))
}

/// Persist the distance cache now
async fn flush_cache(state: web::Data<AppState>) -> impl Responder {
    let written_entries = state.oracle.lock().await.flush().await;
    HttpResponse::Ok().json(FlushResponse { written_entries })
}

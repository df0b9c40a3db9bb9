use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::models::domain::{Assignment, AssignmentOutcome, Match, Observer};

/// One input match augmented with its assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedMatch {
    pub match_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub city: String,
    pub stadium: String,
    #[serde(flatten)]
    pub outcome: AssignmentOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observer_name: Option<String>,
}

impl AssignedMatch {
    pub fn from_parts(m: &Match, assignment: &Assignment, observers: &HashMap<&str, &Observer>) -> Self {
        let observer = assignment
            .observer_id()
            .and_then(|id| observers.get(id).copied());

        Self {
            match_id: m.id.clone(),
            date: m.date,
            city: m.city.clone(),
            stadium: m.stadium.clone(),
            outcome: assignment.outcome.clone(),
            observer_name: observer.map(|o| o.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverUsage {
    pub observer_id: String,
    pub usage_count: u32,
}

/// Response for the assignment endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignResponse {
    pub run_id: String,
    pub results: Vec<AssignedMatch>,
    pub assigned: usize,
    pub unassigned: usize,
    pub observer_usage: Vec<ObserverUsage>,
}

/// Response for a single distance query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceResponse {
    pub from: String,
    pub to: String,
    pub canonical_from: String,
    pub canonical_to: String,
    pub distance_km: Option<f64>,
    pub reachable: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushResponse {
    pub written_entries: usize,
}

//! Commissioner Assign - match commissioner assignment service
//!
//! This library assigns observers to fixtures with a greedy first-fit loop over
//! rest-period, same-day and locality rules, backed by a cached inter-city
//! distance oracle.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{Assigner, AssignmentRun, CityCanonicalizer, Distance, DistanceLookup};
pub use models::{Match, Observer, ObserverState, Assignment, AssignmentOutcome, UnassignedReason, AssignmentRules};
pub use services::{DistanceBackend, DistanceCache, DistanceOracle, DistanceProvider};

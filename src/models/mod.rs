// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{Match, Observer, ObserverState, AssignmentSlot, Assignment, AssignmentOutcome, UnassignedReason, AssignmentRules};
pub use requests::{AssignRequest, AssignmentOptions, MatchRecord, DistanceQuery, PrewarmRequest, parse_match_date};
pub use responses::{AssignResponse, AssignedMatch, ObserverUsage, DistanceResponse, HealthResponse, ErrorResponse, FlushResponse};

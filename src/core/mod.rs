// Core algorithm exports
pub mod assigner;
pub mod canonical;
pub mod distance;
pub mod filters;
pub mod ranking;

pub use assigner::{Assigner, AssignmentRun};
pub use canonical::CityCanonicalizer;
pub use distance::{CityPairKey, Distance, DistanceLookup};
pub use filters::{is_eligible, passes_locality, passes_rest_period, passes_same_day_policy, is_same_city};
pub use ranking::{rank_candidates, usage_count};

// Service exports
pub mod cache;
pub mod google;
pub mod openrouteservice;
pub mod oracle;
pub mod provider;

pub use cache::{DistanceCache, CacheError, CacheStats};
pub use google::GoogleMatrixClient;
pub use openrouteservice::OrsClient;
pub use oracle::{DistanceOracle, OracleStats, PrewarmReport};
pub use provider::{DistanceBackend, DistanceProvider, ProviderError};

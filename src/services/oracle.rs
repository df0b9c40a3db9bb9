use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use crate::core::{
    canonical::CityCanonicalizer,
    distance::{is_valid_city_name, CityPairKey, Distance, DistanceLookup, KEY_SEPARATOR},
};
use crate::services::cache::{CacheError, CacheStats, DistanceCache};
use crate::services::provider::DistanceProvider;

/// Lookup counters for one process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleStats {
    pub lookups: u64,
    pub same_city: u64,
    pub cache_hits: u64,
    pub provider_calls: u64,
    pub failures: u64,
    pub transient_failures: u64,
}

/// Outcome of filling the cache for a set of cities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrewarmReport {
    pub cities: usize,
    pub pairs_total: usize,
    pub already_cached: usize,
    pub resolved: usize,
    pub unreachable: usize,
}

/// Answers city-to-city distance queries from the cache, falling back to the provider
///
/// Names are canonicalized before anything else, so aliases of the same city share
/// one cache entry and (A, B) / (B, A) always resolve to the same record.
pub struct DistanceOracle<P> {
    provider: P,
    cache: DistanceCache,
    canonicalizer: CityCanonicalizer,
    reported_unmapped: HashSet<String>,
    min_request_interval: Duration,
    last_request: Option<Instant>,
    stats: OracleStats,
}

impl<P: DistanceProvider> DistanceOracle<P> {
    pub fn new(provider: P, cache: DistanceCache, canonicalizer: CityCanonicalizer) -> Self {
        Self {
            provider,
            cache,
            canonicalizer,
            reported_unmapped: HashSet::new(),
            min_request_interval: Duration::ZERO,
            last_request: None,
            stats: OracleStats::default(),
        }
    }

    /// Space consecutive provider calls at least `interval` apart
    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    /// Canonical form of `raw`, reporting names missing from the alias table once
    pub fn canonical(&mut self, raw: &str) -> String {
        if let Some(canonical) = self.canonicalizer.lookup(raw) {
            return canonical.to_string();
        }

        let name = self.canonicalizer.canonicalize(raw);
        if !name.is_empty() && self.reported_unmapped.insert(name.clone()) {
            tracing::warn!("City {:?} has no alias entry, using it as-is", name);
        }
        name
    }

    /// Distance between two cities
    ///
    /// Identical canonical names are 0 km without any lookup. Provider failures come
    /// back as `Distance::Unreachable`; definitive ones are cached for this process,
    /// transient ones are not cached at all.
    pub async fn lookup(&mut self, a: &str, b: &str) -> Distance {
        self.stats.lookups += 1;

        let from = self.canonical(a);
        let to = self.canonical(b);

        if from.is_empty() || to.is_empty() {
            self.stats.failures += 1;
            return Distance::Unreachable;
        }

        if from == to {
            self.stats.same_city += 1;
            return Distance::Km(0.0);
        }

        // Such a name would not survive the cache file's "A|B" key format
        if !is_valid_city_name(&from) || !is_valid_city_name(&to) {
            tracing::warn!("City pair {:?} / {:?} contains {:?}, treating as unreachable", from, to, KEY_SEPARATOR);
            self.stats.failures += 1;
            return Distance::Unreachable;
        }

        let key = CityPairKey::new(&from, &to);
        if let Some(distance) = self.cache.get(&key) {
            self.stats.cache_hits += 1;
            return distance;
        }

        self.throttle().await;
        self.stats.provider_calls += 1;

        // Always query in key order so both directions see the same answer
        let result = self.provider.road_distance_km(key.first(), key.second()).await;

        let distance = match result {
            Ok(km) if km.is_finite() && km >= 0.0 => {
                tracing::debug!("Resolved distance {} = {:.1} km", key, km);
                Distance::Km(km)
            }
            Ok(km) => {
                tracing::warn!("Provider returned invalid distance {} for {}", km, key);
                self.stats.failures += 1;
                Distance::Unreachable
            }
            Err(e) if e.is_transient() => {
                tracing::warn!("Transient distance lookup failure for {}: {}", key, e);
                self.stats.failures += 1;
                self.stats.transient_failures += 1;
                return Distance::Unreachable;
            }
            Err(e) => {
                tracing::warn!("Distance lookup failed for {}: {}", key, e);
                self.stats.failures += 1;
                Distance::Unreachable
            }
        };

        if self.cache.insert(key, distance) {
            self.flush().await;
        }

        distance
    }

    /// Resolve every unordered pair of distinct cities not yet in the cache
    pub async fn prewarm(&mut self, cities: &[String]) -> PrewarmReport {
        let mut seen = HashSet::new();
        let canonical: Vec<String> = cities
            .iter()
            .map(|c| self.canonical(c))
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .collect();

        let mut report = PrewarmReport {
            cities: canonical.len(),
            ..Default::default()
        };

        for (i, from) in canonical.iter().enumerate() {
            for to in &canonical[i + 1..] {
                report.pairs_total += 1;

                if self.cache.contains(&CityPairKey::new(from, to)) {
                    report.already_cached += 1;
                    continue;
                }

                match self.lookup(from, to).await {
                    Distance::Km(_) => report.resolved += 1,
                    Distance::Unreachable => report.unreachable += 1,
                }
            }
        }

        self.flush().await;

        tracing::info!(
            "Prewarmed {} pairs for {} cities: {} cached, {} resolved, {} unreachable",
            report.pairs_total,
            report.cities,
            report.already_cached,
            report.resolved,
            report.unreachable
        );

        report
    }

    /// Persist the cache now; returns the number of entries written
    ///
    /// The file write runs on the blocking pool so the async worker stays free.
    pub async fn flush(&mut self) -> usize {
        let result = match self.cache.prepare_flush() {
            Ok(Some(pending)) => tokio::task::spawn_blocking(move || pending.write())
                .await
                .map_err(CacheError::from)
                .and_then(|written| written),
            Ok(None) => return 0,
            Err(e) => Err(e),
        };
        self.cache.finish_flush(result)
    }

    pub fn stats(&self) -> OracleStats {
        self.stats.clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    async fn throttle(&mut self) {
        if self.min_request_interval.is_zero() {
            return;
        }

        if let Some(last) = self.last_request {
            let next = last + self.min_request_interval;
            if next > Instant::now() {
                tokio::time::sleep_until(next).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

impl<P: DistanceProvider> DistanceLookup for DistanceOracle<P> {
    async fn distance(&mut self, from: &str, to: &str) -> Distance {
        self.lookup(from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::ProviderError;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Provider answering from a fixed table and recording every call
    #[derive(Default)]
    struct ScriptedProvider {
        table: Vec<(&'static str, &'static str, f64)>,
        calls: AtomicUsize,
        asked: Mutex<Vec<(String, String)>>,
        transient: bool,
    }

    impl ScriptedProvider {
        fn with(table: Vec<(&'static str, &'static str, f64)>) -> Self {
            Self { table, ..Default::default() }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DistanceProvider for ScriptedProvider {
        async fn road_distance_km(&self, from: &str, to: &str) -> Result<f64, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.asked.lock().unwrap().push((from.to_string(), to.to_string()));

            if self.transient {
                return Err(ProviderError::HttpStatus(StatusCode::BAD_GATEWAY));
            }

            self.table
                .iter()
                .find(|(a, b, _)| (*a == from && *b == to) || (*a == to && *b == from))
                .map(|(_, _, km)| *km)
                .ok_or_else(|| ProviderError::GeocodeNotFound(to.to_string()))
        }
    }

    fn oracle(provider: ScriptedProvider) -> DistanceOracle<ScriptedProvider> {
        DistanceOracle::new(provider, DistanceCache::in_memory(), CityCanonicalizer::with_builtin_aliases())
    }

    #[tokio::test]
    async fn test_same_city_is_zero_without_provider() {
        let mut oracle = oracle(ScriptedProvider::default());

        assert_eq!(oracle.lookup("Jeddah", "جدة").await, Distance::Km(0.0));
        assert_eq!(oracle.lookup("Atlantis", "  Atlantis ").await, Distance::Km(0.0));
        assert_eq!(oracle.provider().calls(), 0);
    }

    #[tokio::test]
    async fn test_symmetric_single_provider_call() {
        let mut oracle = oracle(ScriptedProvider::with(vec![("Jeddah", "Riyadh", 949.0)]));

        let ab = oracle.lookup("الرياض", "Jiddah").await;
        let ba = oracle.lookup("Jeddah", "Riyadh").await;

        assert_eq!(ab, Distance::Km(949.0));
        assert_eq!(ab, ba);
        assert_eq!(oracle.provider().calls(), 1);
        assert_eq!(oracle.cache_stats().entries, 1);
        assert_eq!(
            oracle.provider().asked.lock().unwrap()[0],
            ("Jeddah".to_string(), "Riyadh".to_string())
        );
    }

    #[tokio::test]
    async fn test_definitive_failure_cached_in_memory() {
        let mut oracle = oracle(ScriptedProvider::default());

        assert_eq!(oracle.lookup("Riyadh", "Atlantis").await, Distance::Unreachable);
        assert_eq!(oracle.lookup("Atlantis", "Riyadh").await, Distance::Unreachable);
        assert_eq!(oracle.provider().calls(), 1);
        assert_eq!(oracle.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_not_cached() {
        let mut oracle = oracle(ScriptedProvider {
            transient: true,
            ..Default::default()
        });

        assert_eq!(oracle.lookup("Riyadh", "Dammam").await, Distance::Unreachable);
        assert_eq!(oracle.lookup("Riyadh", "Dammam").await, Distance::Unreachable);
        assert_eq!(oracle.provider().calls(), 2);
        assert_eq!(oracle.stats().transient_failures, 2);
        assert_eq!(oracle.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn test_periodic_flush_and_unreachable_not_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("distance_cache.json");
        let cache = DistanceCache::load(&path, 2).unwrap();
        let provider = ScriptedProvider::with(vec![
            ("Riyadh", "Dammam", 410.0),
            ("Riyadh", "Abha", 880.0),
        ]);
        let mut oracle = DistanceOracle::new(provider, cache, CityCanonicalizer::with_builtin_aliases());

        oracle.lookup("Riyadh", "Dammam").await;
        oracle.lookup("Riyadh", "Atlantis").await;
        assert!(!path.exists());

        oracle.lookup("Riyadh", "Abha").await;
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Abha|Riyadh"));
        assert!(raw.contains("Dammam|Riyadh"));
        assert!(!raw.contains("Atlantis"));

        // A fresh process starts from the persisted entries only
        let reloaded = DistanceCache::load(&path, 2).unwrap();
        let mut next = DistanceOracle::new(
            ScriptedProvider::default(),
            reloaded,
            CityCanonicalizer::with_builtin_aliases(),
        );
        assert_eq!(next.lookup("Dammam", "Riyadh").await, Distance::Km(410.0));
        assert_eq!(next.provider().calls(), 0);
    }

    #[tokio::test]
    async fn test_separator_in_city_name_never_reaches_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("distance_cache.json");
        let cache = DistanceCache::load(&path, 1).unwrap();
        let provider = ScriptedProvider::with(vec![("A|B", "C", 5.0), ("Riyadh", "Dammam", 410.0)]);
        let mut oracle = DistanceOracle::new(provider, cache, CityCanonicalizer::empty());

        assert_eq!(oracle.lookup("A|B", "C").await, Distance::Unreachable);
        assert_eq!(oracle.provider().calls(), 0);
        assert_eq!(oracle.cache_stats().entries, 0);

        assert_eq!(oracle.lookup("Riyadh", "Dammam").await, Distance::Km(410.0));
        assert_eq!(oracle.flush().await, 1);
        assert!(!std::fs::read_to_string(&path).unwrap().contains("A|B"));
    }

    #[tokio::test]
    async fn test_prewarm_skips_cached_pairs() {
        let mut oracle = oracle(ScriptedProvider::with(vec![
            ("Riyadh", "Dammam", 410.0),
            ("Riyadh", "Jeddah", 949.0),
            ("Dammam", "Jeddah", 1340.0),
        ]));
        oracle.lookup("Riyadh", "Dammam").await;

        let cities: Vec<String> = ["Riyadh", "الدمام", "Jeddah", "riyadh", "Atlantis"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let report = oracle.prewarm(&cities).await;

        assert_eq!(report.cities, 4);
        assert_eq!(report.pairs_total, 6);
        assert_eq!(report.already_cached, 1);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.unreachable, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_interval_spaces_calls() {
        let provider = ScriptedProvider::with(vec![("Riyadh", "Dammam", 410.0), ("Riyadh", "Abha", 880.0)]);
        let mut oracle = oracle(provider).with_request_interval(Duration::from_millis(1200));

        let start = Instant::now();
        oracle.lookup("Riyadh", "Dammam").await;
        oracle.lookup("Riyadh", "Abha").await;

        assert!(start.elapsed() >= Duration::from_millis(1200));
    }
}

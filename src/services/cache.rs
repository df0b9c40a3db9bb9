use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::core::distance::{CityPairKey, Distance};

/// Errors that can occur while loading or persisting the distance cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache writer task failed: {0}")]
    WriterTask(#[from] tokio::task::JoinError),
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persistent distance cache keyed by unordered city pair
///
/// The file is a JSON object `{"A|B": km, ...}`. Unreachable entries live in memory
/// only so a failed lookup is retried on the next run.
#[derive(Debug)]
pub struct DistanceCache {
    entries: HashMap<CityPairKey, Distance>,
    path: Option<PathBuf>,
    flush_every: usize,
    unsaved: usize,
    durable: bool,
    hits: u64,
    misses: u64,
}

impl DistanceCache {
    /// A cache that never touches disk
    pub fn in_memory() -> Self {
        Self {
            entries: HashMap::new(),
            path: None,
            flush_every: usize::MAX,
            unsaved: 0,
            durable: false,
            hits: 0,
            misses: 0,
        }
    }

    /// Load the cache file at `path`; a missing file yields an empty cache
    pub fn load<P: AsRef<Path>>(path: P, flush_every: usize) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let mut cache = Self {
            path: Some(path.to_path_buf()),
            flush_every: flush_every.max(1),
            durable: true,
            ..Self::in_memory()
        };

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No distance cache at {:?}, starting empty", path);
                return Ok(cache);
            }
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let stored: HashMap<String, serde_json::Value> = if raw.trim().is_empty() {
            HashMap::new()
        } else {
            serde_json::from_str(&raw)?
        };

        for (raw_key, value) in stored {
            let key = match raw_key.parse::<CityPairKey>() {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!("Skipping distance cache entry: {}", e);
                    continue;
                }
            };

            let km = match value.as_f64() {
                Some(km) if km.is_finite() && km >= 0.0 => km,
                _ => {
                    tracing::warn!("Skipping distance cache entry {:?} with invalid value {}", raw_key, value);
                    continue;
                }
            };

            // Legacy files may hold both orderings of the same pair; the shorter one wins
            match cache.entries.get(&key).and_then(Distance::km) {
                Some(existing) => {
                    tracing::debug!("Folded duplicate distance cache entry for {}", key);
                    if km < existing {
                        cache.entries.insert(key, Distance::Km(km));
                    }
                }
                None => {
                    cache.entries.insert(key, Distance::Km(km));
                }
            }
        }

        tracing::info!("Loaded {} distance cache entries from {:?}", cache.entries.len(), path);
        Ok(cache)
    }

    /// Get a cached distance
    pub fn get(&mut self, key: &CityPairKey) -> Option<Distance> {
        match self.entries.get(key) {
            Some(distance) => {
                self.hits += 1;
                tracing::trace!("Distance cache hit: {}", key);
                Some(*distance)
            }
            None => {
                self.misses += 1;
                tracing::trace!("Distance cache miss: {}", key);
                None
            }
        }
    }

    pub fn contains(&self, key: &CityPairKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Store a distance; returns true once enough new entries are waiting to be flushed
    pub fn insert(&mut self, key: CityPairKey, distance: Distance) -> bool {
        let key_persistable = key.is_persistable();
        let previous = self.entries.insert(key, distance);
        if distance.is_reachable() && previous != Some(distance) && key_persistable {
            self.unsaved += 1;
        }
        self.is_flush_due()
    }

    pub fn is_flush_due(&self) -> bool {
        self.durable && self.unsaved >= self.flush_every
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write every reachable entry to disk via a temporary file and rename
    ///
    /// Returns the number of entries written; a non-durable cache writes nothing.
    pub fn flush(&mut self) -> Result<usize, CacheError> {
        match self.prepare_flush()? {
            Some(pending) => {
                let written = pending.write()?;
                self.unsaved = 0;
                Ok(written)
            }
            None => Ok(0),
        }
    }

    /// Flush, and on failure keep running without durable persistence
    pub fn flush_or_disable(&mut self) -> usize {
        let result = self.flush();
        self.finish_flush(result)
    }

    /// Serialize the reachable entries for a write that may run off the current thread
    ///
    /// Returns `None` when the cache is not durable.
    pub fn prepare_flush(&self) -> Result<Option<PendingFlush>, CacheError> {
        let path = match (&self.path, self.durable) {
            (Some(path), true) => path.clone(),
            _ => return Ok(None),
        };

        let snapshot: BTreeMap<String, f64> = self
            .entries
            .iter()
            .filter(|(key, _)| key.is_persistable())
            .filter_map(|(key, distance)| distance.km().map(|km| (key.to_string(), km)))
            .collect();

        Ok(Some(PendingFlush {
            path,
            entries: snapshot.len(),
            json: serde_json::to_string_pretty(&snapshot)?,
        }))
    }

    /// Record the outcome of a flush; a failure switches durable persistence off
    pub fn finish_flush(&mut self, result: Result<usize, CacheError>) -> usize {
        match result {
            Ok(written) => {
                self.unsaved = 0;
                written
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to persist distance cache, continuing in memory only: {}",
                    e
                );
                self.durable = false;
                0
            }
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let reachable = self.entries.values().filter(|d| d.is_reachable()).count();
        let lookups = self.hits + self.misses;
        CacheStats {
            entries: self.entries.len(),
            unreachable_entries: self.entries.len() - reachable,
            unsaved_entries: self.unsaved,
            hit_count: self.hits,
            miss_count: self.misses,
            hit_rate: if lookups > 0 { self.hits as f64 / lookups as f64 } else { 0.0 },
            durable: self.durable,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Serialized cache contents waiting to be written
#[derive(Debug)]
pub struct PendingFlush {
    path: PathBuf,
    entries: usize,
    json: String,
}

impl PendingFlush {
    /// Blocking write; returns the number of entries written
    pub fn write(self) -> Result<usize, CacheError> {
        write_atomically(&self.path, self.json.as_bytes())?;
        tracing::debug!("Flushed {} distance cache entries to {:?}", self.entries, self.path);
        Ok(self.entries)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub unreachable_entries: usize,
    pub unsaved_entries: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
    pub durable: bool,
}

fn write_atomically(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }

    // Unique per process so concurrent writers never share a temp file
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "distance_cache".to_string());
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    {
        let mut file = File::create(&temp_path).map_err(|e| CacheError::io(&temp_path, e))?;
        file.write_all(data).map_err(|e| CacheError::io(&temp_path, e))?;
        file.sync_all().map_err(|e| CacheError::io(&temp_path, e))?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        CacheError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let cache = DistanceCache::load(dir.path().join("distance_cache.json"), 10).unwrap();

        assert!(cache.is_empty());
        assert!(cache.is_durable());
    }

    #[test]
    fn test_legacy_file_folds_both_orderings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("distance_cache.json");
        fs::write(
            &path,
            r#"{"Riyadh|Jeddah": 949.5, "Jeddah|Riyadh": 949.5, "Abha|Taif": -1, "broken": 3}"#,
        )
        .unwrap();

        let mut cache = DistanceCache::load(&path, 10).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(&CityPairKey::new("Jeddah", "Riyadh")),
            Some(Distance::Km(949.5))
        );
    }

    #[test]
    fn test_conflicting_orderings_keep_shorter_distance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("distance_cache.json");

        for raw in [
            r#"{"Riyadh|Jeddah": 960.0, "Jeddah|Riyadh": 949.5}"#,
            r#"{"Jeddah|Riyadh": 949.5, "Riyadh|Jeddah": 960.0}"#,
        ] {
            fs::write(&path, raw).unwrap();
            let mut cache = DistanceCache::load(&path, 10).unwrap();

            assert_eq!(cache.len(), 1);
            assert_eq!(
                cache.get(&CityPairKey::new("Riyadh", "Jeddah")),
                Some(Distance::Km(949.5))
            );
        }
    }

    #[test]
    fn test_separator_in_city_name_is_never_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("distance_cache.json");

        let mut cache = DistanceCache::load(&path, 1).unwrap();
        assert!(!cache.insert(CityPairKey::new("A|B", "C"), Distance::Km(5.0)));
        cache.insert(CityPairKey::new("A", "B|C"), Distance::Km(7.0));
        cache.insert(CityPairKey::new("Abha", "Taif"), Distance::Km(350.0));
        assert_eq!(cache.flush().unwrap(), 1);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("A|B|C"));

        let mut reloaded = DistanceCache::load(&path, 1).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(&CityPairKey::new("A", "B|C")), None);
        assert_eq!(reloaded.get(&CityPairKey::new("A|B", "C")), None);
    }

    #[test]
    fn test_flush_skips_unreachable_and_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("distance_cache.json");

        let mut cache = DistanceCache::load(&path, 10).unwrap();
        cache.insert(CityPairKey::new("Riyadh", "Dammam"), Distance::Km(410.0));
        cache.insert(CityPairKey::new("Riyadh", "Atlantis"), Distance::Unreachable);
        assert_eq!(cache.flush().unwrap(), 1);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"Dammam|Riyadh\": 410.0"));
        assert!(!raw.contains("Atlantis"));

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let reloaded = DistanceCache::load(&path, 10).unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_flush_due_after_batch() {
        let dir = TempDir::new().unwrap();
        let mut cache = DistanceCache::load(dir.path().join("c.json"), 2).unwrap();

        assert!(!cache.insert(CityPairKey::new("A", "B"), Distance::Km(1.0)));
        assert!(!cache.insert(CityPairKey::new("A", "C"), Distance::Unreachable));
        assert!(cache.insert(CityPairKey::new("A", "D"), Distance::Km(2.0)));

        cache.flush().unwrap();
        assert!(!cache.is_flush_due());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("distance_cache.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            DistanceCache::load(&path, 10),
            Err(CacheError::SerializationError(_))
        ));
    }

    #[test]
    fn test_in_memory_never_writes() {
        let mut cache = DistanceCache::in_memory();
        cache.insert(CityPairKey::new("A", "B"), Distance::Km(1.0));

        assert_eq!(cache.flush().unwrap(), 0);
        assert!(!cache.is_flush_due());
    }

    #[test]
    fn test_failed_flush_disables_persistence() {
        let dir = TempDir::new().unwrap();
        // A directory where the cache file should be makes the rename fail
        let path = dir.path().join("occupied");
        fs::create_dir_all(path.join("child")).unwrap();

        let mut cache = DistanceCache::load(dir.path().join("fresh.json"), 1).unwrap();
        cache.path = Some(path);
        cache.insert(CityPairKey::new("A", "B"), Distance::Km(1.0));

        assert_eq!(cache.flush_or_disable(), 0);
        assert!(!cache.is_durable());
        assert_eq!(cache.len(), 1);
    }
}

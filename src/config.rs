use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use crate::models::AssignmentRules;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub assignment: AssignmentSettings,
    #[serde(default)]
    pub distance: DistanceSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

/// Default eligibility rules for every run
#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentSettings {
    #[serde(default = "default_true")]
    pub allow_same_day: bool,
    #[serde(default = "default_min_days_between")]
    pub min_days_between: u32,
    #[serde(default = "default_true")]
    pub minimize_repeats: bool,
    #[serde(default)]
    pub use_distance: bool,
    #[serde(default = "default_max_distance_km")]
    pub max_distance_km: f64,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            allow_same_day: default_true(),
            min_days_between: default_min_days_between(),
            minimize_repeats: default_true(),
            use_distance: false,
            max_distance_km: default_max_distance_km(),
        }
    }
}

impl AssignmentSettings {
    pub fn rules(&self) -> AssignmentRules {
        AssignmentRules {
            allow_same_day: self.allow_same_day,
            min_days_between: self.min_days_between,
            minimize_repeats: self.minimize_repeats,
            use_distance: self.use_distance,
            max_distance_km: self.max_distance_km,
        }
    }
}

fn default_true() -> bool { true }
fn default_min_days_between() -> u32 { 2 }
fn default_max_distance_km() -> f64 { 200.0 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenRouteService,
    Google,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistanceSettings {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    #[serde(default)]
    pub request_interval_ms: u64,
    pub aliases_path: Option<PathBuf>,
}

impl Default for DistanceSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            base_url: None,
            country: default_country(),
            language: default_language(),
            profile: default_profile(),
            timeout_secs: default_timeout_secs(),
            cache_path: default_cache_path(),
            flush_every: default_flush_every(),
            request_interval_ms: 0,
            aliases_path: None,
        }
    }
}

fn default_provider() -> ProviderKind { ProviderKind::OpenRouteService }
fn default_country() -> String { "SA".to_string() }
fn default_language() -> String { "ar".to_string() }
fn default_profile() -> String { "driving-car".to_string() }
fn default_timeout_secs() -> u64 { 10 }
fn default_cache_path() -> PathBuf { PathBuf::from("data/distance_cache.json") }
fn default_flush_every() -> usize { 100 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    /// Parse a format name; unknown names fall back to JSON
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" | "text" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingSettings {
    /// Apply `LOG_LEVEL` / `LOG_FORMAT` style overrides on top of the configured values
    pub fn with_overrides(mut self, level: Option<String>, format: Option<String>) -> Self {
        if let Some(level) = level.filter(|l| !l.trim().is_empty()) {
            self.level = level;
        }
        if let Some(format) = format.filter(|f| !f.trim().is_empty()) {
            self.format = LogFormat::parse(&format);
        }
        self
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> LogFormat { LogFormat::Json }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with ASSIGNER__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., ASSIGNER__ASSIGNMENT__MIN_DAYS_BETWEEN -> assignment.min_days_between
            .add_source(
                Environment::with_prefix("ASSIGNER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("ASSIGNER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Pick up provider API keys from their conventional variables
///
/// `ORS_API_KEY` or `GOOGLE_MAPS_API_KEY` is used only when no key was configured.
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let configured = settings
        .get_string("distance.api_key")
        .ok()
        .filter(|k| !k.trim().is_empty());
    if configured.is_some() {
        return Ok(settings);
    }

    let provider = settings
        .get_string("distance.provider")
        .unwrap_or_else(|_| "openrouteservice".to_string());
    let variable = match provider.as_str() {
        "google" => "GOOGLE_MAPS_API_KEY",
        _ => "ORS_API_KEY",
    };

    match env::var(variable) {
        Ok(key) if !key.trim().is_empty() => Config::builder()
            .add_source(settings)
            .set_override("distance.api_key", key)?
            .build(),
        _ => Ok(settings),
    }
}

use std::path::{Path, PathBuf};

use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Location used when `HALYARD_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "configs/default.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("building http client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct HalyardConfig {
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub render: RenderConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct HttpConfig {
    #[schemars(range(min = 1))]
    pub connect_timeout_secs: u64,
    #[schemars(range(min = 1))]
    pub request_timeout_secs: u64,
    pub tcp_keepalive_secs: u64,
    pub pool_idle_secs: u64,
    /// Overrides the default `halyard/<version>` user agent.
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 3,
            request_timeout_secs: 20,
            tcp_keepalive_secs: 60,
            pool_idle_secs: 90,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: u64,
    /// Upper bound on how long any entry stays in the store.
    pub ttl_ceiling_secs: u64,
    /// Max-age for successful responses that do not declare one.
    pub default_max_age_secs: u64,
    pub not_found_max_age_secs: u64,
    pub error_max_age_secs: u64,
    /// Store failed upstream responses and replay them while fresh.
    pub cache_errors: bool,
    /// Coalesce concurrent misses for the same URI into one upstream call.
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 2048,
            ttl_ceiling_secs: 3600,
            default_max_age_secs: 60,
            not_found_max_age_secs: 30,
            error_max_age_secs: 10,
            cache_errors: false,
            single_flight: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct RenderConfig {
    /// Embed the diagnostics document in every successful response.
    pub embed_diagnostics: bool,
    /// Ceiling applied to every response's max-age.
    pub max_age_ceiling_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    #[schemars(range(min = 1, max = 65535))]
    pub port: u16,
    /// Base URL of the API the proxy routes navigate; defaults to this server.
    pub upstream_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8091,
            upstream_url: None,
        }
    }
}

static CONFIG_SCHEMA: Lazy<Result<Validator, String>> = Lazy::new(|| {
    let schema = schemars::schema_for!(HalyardConfig);
    let value = serde_json::to_value(&schema).map_err(|err| err.to_string())?;
    validator_for(&value).map_err(|err| err.to_string())
});

/// JSON schema of [`HalyardConfig`].
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(HalyardConfig);
    serde_json::to_value(&schema).unwrap_or_default()
}

/// Parses and validates TOML configuration text.
pub fn parse_config(content: &str, origin: &Path) -> Result<HalyardConfig, ConfigError> {
    let raw: toml::Value = toml::from_str(content).map_err(|source| ConfigError::Toml {
        path: origin.to_path_buf(),
        source,
    })?;
    let json_value =
        serde_json::to_value(&raw).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    let validator = CONFIG_SCHEMA.as_ref().map_err(|err| ConfigError::Invalid(err.clone()))?;
    let errors: Vec<_> = validator
        .iter_errors(&json_value)
        .map(|err| err.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::Invalid(errors.join(", ")));
    }
    serde_json::from_value(json_value).map_err(|err| ConfigError::Invalid(err.to_string()))
}

/// Loads configuration from `path`, then applies environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> Result<HalyardConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg = parse_config(&content, path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Loads `HALYARD_CONFIG` or the default file; a missing default file yields
/// built-in defaults.
pub fn load_default() -> Result<HalyardConfig, ConfigError> {
    if let Ok(explicit) = std::env::var("HALYARD_CONFIG") {
        return load_config(explicit);
    }
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        return load_config(DEFAULT_CONFIG_PATH);
    }
    let mut cfg = HalyardConfig::default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn apply_env_overrides(cfg: &mut HalyardConfig) {
    if let Some(secs) = env_u64("HALYARD_HTTP_TIMEOUT_SECS") {
        cfg.http.request_timeout_secs = secs.max(1);
    }
    if let Some(secs) = env_u64("HALYARD_HTTP_CONNECT_TIMEOUT_SECS") {
        cfg.http.connect_timeout_secs = secs.max(1);
    }
    if let Some(capacity) = env_u64("HALYARD_CACHE_CAPACITY") {
        cfg.cache.capacity = capacity;
    }
    if let Some(secs) = env_u64("HALYARD_CACHE_DEFAULT_MAX_AGE_SECS") {
        cfg.cache.default_max_age_secs = secs;
    }
    if let Some(enabled) = env_bool("HALYARD_CACHE_ERRORS") {
        cfg.cache.cache_errors = enabled;
    }
    if let Some(port) = env_u64("HALYARD_PORT").and_then(|p| u16::try_from(p).ok()) {
        cfg.server.port = port;
    }
    if let Ok(url) = std::env::var("HALYARD_UPSTREAM_URL") {
        let url = url.trim();
        if !url.is_empty() {
            cfg.server.upstream_url = Some(url.to_string());
        }
    }
}

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::constants;
use crate::error::{AggregatorError, Result};
use crate::pipeline::rate_limiter::Limits;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub limits: LimitsConfig,
    pub services: ServicesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4321,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Records per `batch` event
    pub batch_size: usize,
    /// Pause between two entities, on top of the rate limiters
    pub pacing_delay_ms: u64,
    /// Maximum number of directory members listed per run
    pub max_results: u32,
    pub order_by: String,
    pub customer: String,
    /// Items requested per content page
    pub page_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: constants::DEFAULT_BATCH_SIZE,
            pacing_delay_ms: constants::DEFAULT_PACING_DELAY_MS,
            max_results: constants::DEFAULT_MAX_RESULTS,
            order_by: constants::DEFAULT_ORDER_BY.to_string(),
            customer: constants::DEFAULT_CUSTOMER.to_string(),
            page_size: constants::DEFAULT_PAGE_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitConfig {
    pub max_requests: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_window_ms() -> u64 {
    constants::DEFAULT_WINDOW_MS
}

impl LimitConfig {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self { max_requests, window_ms }
    }

    pub fn to_limits(&self) -> Limits {
        Limits::per_window(self.max_requests, Duration::from_millis(self.window_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub directory: LimitConfig,
    pub content: LimitConfig,
    pub profile: LimitConfig,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            directory: LimitConfig::new(constants::DEFAULT_DIRECTORY_MAX_REQUESTS, constants::DEFAULT_WINDOW_MS),
            content: LimitConfig::new(constants::DEFAULT_CONTENT_MAX_REQUESTS, constants::DEFAULT_WINDOW_MS),
            profile: LimitConfig::new(constants::DEFAULT_PROFILE_MAX_REQUESTS, constants::DEFAULT_WINDOW_MS),
        }
    }
}

impl LimitsConfig {
    fn entries(&self) -> [(&'static str, &LimitConfig); 3] {
        [
            (constants::DIRECTORY_SERVICE, &self.directory),
            (constants::CONTENT_SERVICE, &self.content),
            (constants::PROFILE_SERVICE, &self.profile),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub directory_base_url: String,
    pub content_base_url: String,
    pub profile_base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            directory_base_url: constants::DEFAULT_DIRECTORY_BASE_URL.to_string(),
            content_base_url: constants::DEFAULT_CONTENT_BASE_URL.to_string(),
            profile_base_url: constants::DEFAULT_PROFILE_BASE_URL.to_string(),
            timeout_seconds: constants::DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl Config {
    /// Load from `path`, or else from `USAGE_CONFIG` (or `config.toml`), then apply
    /// environment overrides. An explicit path must exist; the fallback file may be
    /// absent, in which case defaults are used.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path =
                    std::env::var("USAGE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
                if Path::new(&default_path).exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_content = fs::read_to_string(path).map_err(|e| {
            AggregatorError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("USAGE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_number("USAGE_PORT")? {
            self.server.port = port;
        }
        if let Some(batch_size) = env_number("USAGE_BATCH_SIZE")? {
            self.pipeline.batch_size = batch_size;
        }
        if let Some(delay) = env_number("USAGE_PACING_DELAY_MS")? {
            self.pipeline.pacing_delay_ms = delay;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(AggregatorError::Config("pipeline.batch_size must be at least 1".to_string()));
        }
        for (service, limit) in self.limits.entries() {
            if limit.max_requests == 0 || limit.window_ms == 0 {
                return Err(AggregatorError::Config(format!(
                    "limits.{} needs max_requests > 0 and window_ms > 0",
                    service
                )));
            }
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AggregatorError::Config(format!("{} is not a valid number: '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

//! Runtime configuration loaded from the environment.

use crate::pagination::PageSizeOptions;
use crate::query::CachePolicy;
use figment::{Figment, providers::Env};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the catalog API, e.g. `http://localhost:8000/api`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Log level for this crate; `RUST_LOG` overrides the whole filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_stale_after", deserialize_with = "duration")]
    pub cache_stale_after: Duration,
    #[serde(default = "default_retry_count")]
    pub fetch_retry_count: u32,
    #[serde(default = "default_retry_delay", deserialize_with = "duration")]
    pub fetch_retry_delay: Duration,
    #[serde(default = "default_debounce_delay", deserialize_with = "duration")]
    pub debounce_delay: Duration,
    #[serde(default = "default_page_size_options")]
    pub page_size_options: Vec<u32>,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Pages shown on each side of the current one.
    #[serde(default = "default_spread")]
    pub pagination_spread: u32,
    #[serde(default = "default_favorites_path")]
    pub favorites_path: PathBuf,
    #[serde(default = "default_request_timeout", deserialize_with = "duration")]
    pub request_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration")]
    Extract(#[from] Box<figment::Error>),
    #[error("default page size {default} is not one of the page size options {options:?}")]
    PageSize { default: u32, options: Vec<u32> },
    #[error("api base url `{url}` is invalid")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl Config {
    /// Extract from environment variables, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_sizes().is_none() {
            return Err(ConfigError::PageSize {
                default: self.default_page_size,
                options: self.page_size_options.clone(),
            });
        }
        url::Url::parse(&self.api_base_url).map_err(|source| ConfigError::BaseUrl {
            url: self.api_base_url.clone(),
            source,
        })?;
        Ok(())
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            stale_after: self.cache_stale_after,
            retry_count: self.fetch_retry_count,
            retry_delay: self.fetch_retry_delay,
        }
    }

    /// `None` when the default size is not among the options.
    pub fn page_sizes(&self) -> Option<PageSizeOptions> {
        PageSizeOptions::new(self.page_size_options.clone(), self.default_page_size)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            log_level: default_log_level(),
            cache_stale_after: default_stale_after(),
            fetch_retry_count: default_retry_count(),
            fetch_retry_delay: default_retry_delay(),
            debounce_delay: default_debounce_delay(),
            page_size_options: default_page_size_options(),
            default_page_size: default_page_size(),
            pagination_spread: default_spread(),
            favorites_path: default_favorites_path(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stale_after() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_retry_count() -> u32 {
    1
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_debounce_delay() -> Duration {
    Duration::from_millis(700)
}

fn default_page_size_options() -> Vec<u32> {
    vec![10, 20, 50, 100]
}

fn default_page_size() -> u32 {
    20
}

fn default_spread() -> u32 {
    2
}

fn default_favorites_path() -> PathBuf {
    PathBuf::from("movie-explorer-favorites.json")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Parse a human duration such as `700ms`, `5m` or `1h`. Bare numbers are
/// seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    const UNITS: &[TimeUnit] = &[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
    ];
    let parsed = DurationParser::with_time_units(UNITS)
        .parse(input.trim())
        .map_err(|e| format!("invalid duration `{input}`: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration `{input}`: {e}"))
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

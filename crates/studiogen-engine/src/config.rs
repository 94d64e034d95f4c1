use std::env;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::retry::RetryPolicy;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image";

const DEFAULT_REQUEST_TIMEOUT_S: u64 = 90;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_BASE_MS: u64 = 4000;
const DEFAULT_PACING_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub pacing: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: IMAGE_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_S),
            retry: RetryPolicy::default(),
            pacing: Duration::from_millis(DEFAULT_PACING_MS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; values are trimmed and empty
    /// values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let read_u64 = |key: &str, default: u64, min: u64, max: u64| {
            read(key)
                .and_then(|raw| raw.parse::<u64>().ok())
                .map(|value| value.clamp(min, max))
                .unwrap_or(default)
        };

        Self {
            api_key: read("API_KEY"),
            api_base: read("STUDIOGEN_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: IMAGE_MODEL.to_string(),
            request_timeout: Duration::from_secs(read_u64(
                "STUDIOGEN_REQUEST_TIMEOUT_S",
                DEFAULT_REQUEST_TIMEOUT_S,
                15,
                300,
            )),
            retry: RetryPolicy {
                max_retries: read_u64("STUDIOGEN_RETRIES", DEFAULT_MAX_RETRIES as u64, 0, 8) as u32,
                base_delay: Duration::from_millis(read_u64(
                    "STUDIOGEN_RETRY_BASE_MS",
                    DEFAULT_RETRY_BASE_MS,
                    0,
                    60_000,
                )),
            },
            pacing: Duration::from_millis(read_u64(
                "STUDIOGEN_PACING_MS",
                DEFAULT_PACING_MS,
                0,
                60_000,
            )),
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => bail!("API Key is missing (set API_KEY)"),
        }
    }
}

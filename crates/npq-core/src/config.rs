use crate::pkg::{DEFAULT_REGISTRY, DEFAULT_REGISTRY_API, REGISTRY_API_ENV, REGISTRY_ENV};
use crate::throttle::DEFAULT_MAX_CONCURRENT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the vulnerability API token.
pub const SNYK_TOKEN_ENV: &str = "SNYK_TOKEN";

/// Token file written by the vulnerability vendor's own CLI, relative to home.
const SNYK_CONFIG_FILE: &str = ".config/configstore/snyk.json";

/// Runtime configuration for one npq invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Registry serving package documents.
    pub registry_url: String,

    /// API host serving download counts.
    pub registry_api_url: String,

    /// Throttle slots shared by rate-limited checks.
    pub max_concurrent: usize,

    /// Minimum time a throttled operation holds its slot, in milliseconds.
    pub min_delay_ms: u64,

    /// Vulnerability API token; without one the public OSV database is used.
    #[serde(skip_serializing, default)]
    pub snyk_token: Option<String>,

    /// Verbosity level (0 = WARN, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Whether to emit JSON logs.
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY.to_string(),
            registry_api_url: DEFAULT_REGISTRY_API.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            min_delay_ms: 0,
            snyk_token: None,
            verbosity: 0,
            json_logs: false,
        }
    }
}

impl Config {
    /// Defaults overlaid with `NPQ_NPM_REGISTRY`, `NPQ_NPM_REGISTRY_API`
    /// and `SNYK_TOKEN` (or the token stored by the vendor CLI).
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(url) = non_empty_env(REGISTRY_ENV) {
            config.registry_url = url;
        }
        if let Some(url) = non_empty_env(REGISTRY_API_ENV) {
            config.registry_api_url = url;
        }
        config.snyk_token = non_empty_env(SNYK_TOKEN_ENV)
            .or_else(|| snyk_config_path().and_then(|path| read_snyk_token(&path)));

        config
    }

    /// Set registry URL.
    #[must_use]
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Set download-count API URL.
    #[must_use]
    pub fn with_registry_api_url(mut self, url: impl Into<String>) -> Self {
        self.registry_api_url = url.into();
        self
    }

    /// Set throttle limits.
    #[must_use]
    pub fn with_throttle(mut self, max_concurrent: usize, min_delay_ms: u64) -> Self {
        self.max_concurrent = max_concurrent;
        self.min_delay_ms = min_delay_ms;
        self
    }

    /// Set vulnerability API token.
    #[must_use]
    pub fn with_snyk_token(mut self, token: Option<String>) -> Self {
        self.snyk_token = token;
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    #[must_use]
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read the `api` field of the vendor CLI's config store.
fn read_snyk_token(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    value
        .get("api")
        .and_then(serde_json::Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Location of the vendor CLI's token file, when a home directory exists.
#[must_use]
pub fn snyk_config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(SNYK_CONFIG_FILE))
}

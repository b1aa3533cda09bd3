//! npm registry client.

use super::error::PkgError;
use super::metadata::PackageMetadata;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Default npm API URL (download counts).
pub const DEFAULT_REGISTRY_API: &str = "https://api.npmjs.org/";

/// Environment variable to override registry URL.
pub const REGISTRY_ENV: &str = "NPQ_NPM_REGISTRY";

/// Environment variable to override the registry API URL.
pub const REGISTRY_API_ENV: &str = "NPQ_NPM_REGISTRY_API";

/// Where package metadata comes from.
///
/// The metadata cache and the checks only talk to this trait, so runs can
/// be driven against an in-memory registry.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch the registry document for `name`.
    ///
    /// Returns `Ok(None)` when the registry reports the package as absent.
    async fn fetch_metadata(&self, name: &str) -> Result<Option<PackageMetadata>, PkgError>;

    /// Downloads of `name` over the last month.
    async fn fetch_downloads(&self, name: &str) -> Result<u64, PkgError>;
}

/// Registry client for fetching package metadata.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    api_url: Url,
    http: Client,
}

#[derive(Deserialize)]
struct DownloadPoint {
    #[serde(default)]
    downloads: u64,
}

impl RegistryClient {
    /// Create a new registry client with the given registry and API URLs.
    ///
    /// # Errors
    /// Returns an error if a URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str, api_url: &str) -> Result<Self, PkgError> {
        let base_url = parse_base(base_url)?;
        let api_url = parse_base(api_url)?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("npq/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            api_url,
            http,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the HTTP client (shared with checks that call other services).
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }
}

#[async_trait]
impl MetadataSource for RegistryClient {
    async fn fetch_metadata(&self, name: &str) -> Result<Option<PackageMetadata>, PkgError> {
        let url = self
            .base_url
            .join(&encode_name(name))
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))?;

        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(PkgError::registry(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        let metadata: PackageMetadata = serde_json::from_slice(&bytes)?;
        Ok(Some(metadata))
    }

    async fn fetch_downloads(&self, name: &str) -> Result<u64, PkgError> {
        let url = self
            .api_url
            .join(&format!("downloads/point/last-month/{name}"))
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))?;

        let response = self.http.get(url.as_str()).send().await?;
        if !response.status().is_success() {
            return Err(PkgError::registry(format!(
                "Download API returned status {} for '{name}'",
                response.status()
            )));
        }

        let point: DownloadPoint = response.json().await?;
        Ok(point.downloads)
    }
}

/// Parse a base URL, making sure `join` appends rather than replaces.
fn parse_base(raw: &str) -> Result<Url, PkgError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|e| PkgError::registry(format!("Invalid registry URL '{raw}': {e}")))
}

/// URL-encode a package name for registry requests (`@scope/name` -> `@scope%2Fname`).
#[must_use]
pub fn encode_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}

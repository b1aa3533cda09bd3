//! Check contract.
//!
//! A check is a named vetting routine in one [`Category`]. The pipeline
//! calls [`Check::validate`] once per requested package; an `Ok` value is
//! recorded as data, a [`CheckFailure`] becomes a [`Finding`] whose
//! severity is carried by the failure itself.

use crate::config::Config;
use crate::pkg::{MetadataCache, PackageMetadata, PackageRequest, PkgError, VersionRecord, VersionResolver};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

mod registry;
mod runner;

pub use registry::{CheckFactory, CheckRef, CheckRegistry};
pub use runner::{run_check, CheckRunResult};

/// Prefix of the environment variables that disable a single check.
pub const DISABLE_ENV_PREFIX: &str = "MARSHALL_DISABLE_";

/// Reporting and scheduling group of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    SupplyChainSecurity,
    PackageHealth,
    MalwareDetection,
}

impl Category {
    pub const ALL: [Self; 3] = [
        Self::SupplyChainSecurity,
        Self::PackageHealth,
        Self::MalwareDetection,
    ];

    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::SupplyChainSecurity => "SupplyChainSecurity",
            Self::PackageHealth => "PackageHealth",
            Self::MalwareDetection => "MalwareDetection",
        }
    }

    /// Friendly name used by reporters.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::SupplyChainSecurity => "Supply Chain Security",
            Self::PackageHealth => "Package Health",
            Self::MalwareDetection => "Malware Detection",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Whether a finding blocks the install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One reported outcome of one check about one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub package_string: String,
    pub message: String,
    pub severity: Severity,
    pub check_name: String,
    pub category: Category,
}

/// Failed validation, tagged with the severity it should be reported at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub severity: Severity,
    pub message: String,
}

impl CheckFailure {
    /// Blocking failure.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    /// Non-blocking failure.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CheckFailure {}

impl From<PkgError> for CheckFailure {
    fn from(err: PkgError) -> Self {
        Self::error(err.message())
    }
}

/// Opt-in limits for checks that call rate-limited services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub max_concurrent: usize,
    pub min_delay: Duration,
}

/// Dependencies handed to every check factory.
#[derive(Debug, Clone)]
pub struct SharedDeps {
    pub cache: Arc<MetadataCache>,
    pub resolver: VersionResolver,
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}

/// Registry document plus the version a request resolved to.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub metadata: Arc<PackageMetadata>,
    pub version: String,
}

impl Resolved {
    /// Manifest of the resolved version.
    #[must_use]
    pub fn record(&self) -> Option<&VersionRecord> {
        self.metadata.version(&self.version)
    }
}

impl SharedDeps {
    #[must_use]
    pub fn new(cache: Arc<MetadataCache>, http: reqwest::Client, config: Arc<Config>) -> Self {
        Self {
            resolver: VersionResolver::new(Arc::clone(&cache)),
            cache,
            http,
            config,
        }
    }

    /// Fetch the document for `pkg` and resolve its specifier to a version
    /// present in `versions`.
    pub async fn resolve(&self, pkg: &PackageRequest) -> Result<Resolved, CheckFailure> {
        let metadata = self.cache.get_metadata(&pkg.package_name).await?;
        let version = self
            .resolver
            .resolve(&pkg.package_name, &pkg.package_version)
            .await?;

        if !metadata.versions.contains_key(&version) {
            return Err(PkgError::version_not_found(&pkg.package_name, &pkg.package_version).into());
        }

        Ok(Resolved { metadata, version })
    }
}

/// A pluggable vetting routine.
#[async_trait]
pub trait Check: Send + Sync {
    /// Stable identifier, also used for the disable variable.
    fn name(&self) -> &'static str;

    fn category(&self) -> Category;

    /// Human-readable description.
    fn title(&self) -> &'static str;

    /// `false` when `MARSHALL_DISABLE_<NAME>` is set to a non-empty value.
    fn is_enabled(&self) -> bool {
        !disabled_by_env(self.name())
    }

    /// Limits applied to every `validate` call of this check.
    fn throttle_policy(&self) -> Option<ThrottlePolicy> {
        None
    }

    /// Vet one package.
    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure>;
}

/// Environment variable that disables the check called `name`.
#[must_use]
pub fn disable_env_var(name: &str) -> String {
    format!("{DISABLE_ENV_PREFIX}{}", name.to_uppercase())
}

fn disabled_by_env(name: &str) -> bool {
    std::env::var_os(disable_env_var(name)).is_some_and(|v| !v.is_empty())
}

use super::{elapsed_since, parse_timestamp, round_days, round_hours};
use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::PackageRequest;
use async_trait::async_trait;
use serde_json::json;

/// Versions younger than this many days get a warning.
const VERSION_AGE_THRESHOLD_DAYS: i64 = 7;

/// Warns about versions that were published very recently.
#[derive(Debug)]
pub struct VersionMaturityCheck {
    deps: SharedDeps,
}

impl VersionMaturityCheck {
    pub const NAME: &'static str = "version_maturity";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

#[async_trait]
impl Check for VersionMaturityCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::PackageHealth
    }

    fn title(&self) -> &'static str {
        "Checking version maturity"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let metadata = self.deps.cache.get_metadata(&pkg.package_name).await?;
        if metadata.time.is_empty() {
            return Err(CheckFailure::error(
                "Could not determine package version information",
            ));
        }

        let version = self
            .deps
            .resolver
            .resolve(&pkg.package_name, &pkg.package_version)
            .await?;

        let Some(released) = metadata.published_at(&version).and_then(parse_timestamp) else {
            return Err(CheckFailure::error(format!(
                "Could not determine release date for version {version}"
            )));
        };

        let age = elapsed_since(released);
        let days = round_days(age);
        if days < VERSION_AGE_THRESHOLD_DAYS {
            let (amount, unit) = match days {
                0 => (round_hours(age), "hours"),
                1 => (1, "day"),
                n => (n, "days"),
            };
            return Err(CheckFailure::warning(format!(
                "Detected a recently published version (published {amount} {unit} ago) - consider waiting for community review"
            )));
        }

        Ok(json!({ "version": version, "published": released.to_rfc3339() }))
    }
}

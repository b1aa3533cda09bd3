use super::{elapsed_since, parse_timestamp};
use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::PackageRequest;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;

/// Packages created less than this many days ago get a warning.
const PACKAGE_AGE_THRESHOLD_DAYS: i64 = 22;

/// Warns about brand-new package names.
#[derive(Debug)]
pub struct AgeCheck {
    deps: SharedDeps,
}

impl AgeCheck {
    pub const NAME: &'static str = "age";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

#[async_trait]
impl Check for AgeCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::PackageHealth
    }

    fn title(&self) -> &'static str {
        "Checking package maturity"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let metadata = self.deps.cache.get_metadata(&pkg.package_name).await?;

        let Some(created) = metadata.published_at("created").and_then(parse_timestamp) else {
            return Ok(serde_json::Value::Null);
        };

        if elapsed_since(created) < Duration::days(PACKAGE_AGE_THRESHOLD_DAYS) {
            return Err(CheckFailure::warning(format!(
                "Detected a newly published package (created < {PACKAGE_AGE_THRESHOLD_DAYS} days) act carefully"
            )));
        }

        Ok(json!({ "created": created.to_rfc3339() }))
    }
}

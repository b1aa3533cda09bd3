use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::{PackageRequest, VersionRecord};
use async_trait::async_trait;
use serde_json::json;

/// Flags versions the publisher marked as deprecated.
#[derive(Debug)]
pub struct DeprecationCheck {
    deps: SharedDeps,
}

impl DeprecationCheck {
    pub const NAME: &'static str = "deprecation";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

#[async_trait]
impl Check for DeprecationCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::PackageHealth
    }

    fn title(&self) -> &'static str {
        "Checking package for deprecation flag"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let resolved = self.deps.resolve(pkg).await?;

        if let Some(reason) = resolved.record().and_then(VersionRecord::deprecation) {
            return Err(CheckFailure::error(format!("Package deprecated: {reason}")));
        }

        Ok(json!({ "version": resolved.version }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures::{deps_for, doc};

    fn check() -> DeprecationCheck {
        DeprecationCheck::new(&deps_for(vec![doc(json!({
            "name": "request",
            "dist-tags": { "latest": "2.88.2" },
            "versions": {
                "2.88.0": { "version": "2.88.0" },
                "2.88.2": { "version": "2.88.2", "deprecated": "request has been deprecated" }
            }
        }))]))
    }

    #[tokio::test]
    async fn test_deprecated_latest() {
        let err = check()
            .validate(&PackageRequest::parse("request").unwrap())
            .await
            .unwrap_err();
        assert!(!err.is_warning());
        assert_eq!(err.message, "Package deprecated: request has been deprecated");
    }

    #[tokio::test]
    async fn test_older_version_is_clean() {
        let data = check()
            .validate(&PackageRequest::parse("request@2.88.0").unwrap())
            .await
            .unwrap();
        assert_eq!(data["version"], "2.88.0");
    }

    #[tokio::test]
    async fn test_unknown_version_is_an_error() {
        let err = check()
            .validate(&PackageRequest::parse("request@9.0.0").unwrap())
            .await
            .unwrap_err();
        assert!(err.message.contains("request"));
        assert!(err.message.contains("9.0.0"));
    }
}

use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::PackageRequest;
use async_trait::async_trait;
use serde_json::json;

/// Packages below this many downloads last month get a warning.
const DOWNLOAD_COUNT_THRESHOLD: u64 = 20;

/// Warns about packages almost nobody installs.
#[derive(Debug)]
pub struct DownloadsCheck {
    deps: SharedDeps,
}

impl DownloadsCheck {
    pub const NAME: &'static str = "downloads";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

#[async_trait]
impl Check for DownloadsCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::PackageHealth
    }

    fn title(&self) -> &'static str {
        "Checking package download popularity"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let downloads = self.deps.cache.get_downloads(&pkg.package_name).await?;

        if downloads < DOWNLOAD_COUNT_THRESHOLD {
            return Err(CheckFailure::warning(format!(
                "Detected a low download-count package (downloads last month < {DOWNLOAD_COUNT_THRESHOLD})"
            )));
        }

        Ok(json!({ "downloads": downloads }))
    }
}

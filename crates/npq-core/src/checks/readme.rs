use super::{PLACEHOLDER_MESSAGE, SECURITY_HOLDING_MARKER};
use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::PackageRequest;
use async_trait::async_trait;
use serde_json::json;

/// Text the registry stores when a package was published without a readme.
const MISSING_README: &str = "ERROR: No README data found!";

/// Requires a readme that is not a security placeholder.
#[derive(Debug)]
pub struct ReadmeCheck {
    deps: SharedDeps,
}

impl ReadmeCheck {
    pub const NAME: &'static str = "readme";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

#[async_trait]
impl Check for ReadmeCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::PackageHealth
    }

    fn title(&self) -> &'static str {
        "Checking availability of a README"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let metadata = self.deps.cache.get_metadata(&pkg.package_name).await?;

        let readme = match metadata.readme.as_deref().map(str::trim) {
            None | Some("" | MISSING_README) => {
                return Err(CheckFailure::error("Package has no README file available"));
            }
            Some(readme) => readme,
        };

        if readme.starts_with(SECURITY_HOLDING_MARKER) {
            return Err(CheckFailure::error(PLACEHOLDER_MESSAGE));
        }

        Ok(json!({ "length": readme.len() }))
    }
}

use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::PackageRequest;
use async_trait::async_trait;
use serde_json::json;

/// Lifecycle scripts npm runs automatically on install.
const INSTALL_SCRIPTS: [&str; 3] = ["install", "preinstall", "postinstall"];

/// Flags versions that run code at install time.
#[derive(Debug)]
pub struct ScriptsCheck {
    deps: SharedDeps,
}

impl ScriptsCheck {
    pub const NAME: &'static str = "scripts";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

#[async_trait]
impl Check for ScriptsCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::SupplyChainSecurity
    }

    fn title(&self) -> &'static str {
        "Checking package for pre/post install scripts"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let resolved = self.deps.resolve(pkg).await?;
        let Some(record) = resolved.record() else {
            return Ok(json!({ "version": resolved.version }));
        };

        for name in INSTALL_SCRIPTS {
            if let Some(script) = record.scripts.get(name).filter(|s| !s.is_empty()) {
                return Err(CheckFailure::error(format!(
                    "Detected a possible malicious intent script, act carefully: {name}: {script}"
                )));
            }
        }

        Ok(json!({ "version": resolved.version }))
    }
}

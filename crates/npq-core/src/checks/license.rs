use super::{PLACEHOLDER_MESSAGE, SECURITY_HOLDING_MARKER};
use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::PackageRequest;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Requires a declared license.
#[derive(Debug)]
pub struct LicenseCheck {
    deps: SharedDeps,
}

impl LicenseCheck {
    pub const NAME: &'static str = "license";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

#[async_trait]
impl Check for LicenseCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::PackageHealth
    }

    fn title(&self) -> &'static str {
        "Checking availability of a LICENSE"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<Value, CheckFailure> {
        let metadata = self.deps.cache.get_metadata(&pkg.package_name).await?;

        if metadata
            .readme
            .as_deref()
            .is_some_and(|readme| readme.starts_with(SECURITY_HOLDING_MARKER))
        {
            return Err(CheckFailure::error(PLACEHOLDER_MESSAGE));
        }

        let license = metadata
            .license
            .as_ref()
            .and_then(license_name)
            .or_else(|| {
                metadata
                    .latest()
                    .and_then(|record| record.license.as_ref())
                    .and_then(license_name)
            });

        match license {
            Some(license) => Ok(json!({ "license": license })),
            None => Err(CheckFailure::error("Package has no LICENSE file available")),
        }
    }
}

/// SPDX id from the string form, the legacy `{ type }` object, or the
/// legacy `licenses` array.
fn license_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map.get("type").and_then(license_name),
        Value::Array(items) => {
            let names: Vec<String> = items.iter().filter_map(license_name).collect();
            (!names.is_empty()).then(|| names.join(" OR "))
        }
        _ => None,
    }
}

use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::{PackageRequest, VersionRecord};
use async_trait::async_trait;
use semver::Version;
use serde_json::json;
use std::collections::BTreeMap;

/// Warns when a version adds executables its predecessor did not ship.
#[derive(Debug)]
pub struct NewBinCheck {
    deps: SharedDeps,
}

impl NewBinCheck {
    pub const NAME: &'static str = "new_bin";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

fn commands(record: &VersionRecord, fallback_name: &str) -> BTreeMap<String, String> {
    let name = if record.name.is_empty() {
        fallback_name
    } else {
        record.name.as_str()
    };
    record
        .bin
        .as_ref()
        .map(|bin| bin.commands(name))
        .unwrap_or_default()
}

#[async_trait]
impl Check for NewBinCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::PackageHealth
    }

    fn title(&self) -> &'static str {
        "Checking for new binaries introduced in package.json"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let resolved = self.deps.resolve(pkg).await?;
        let (Some(record), Ok(target)) = (resolved.record(), Version::parse(&resolved.version))
        else {
            return Ok(serde_json::Value::Null);
        };

        let previous = resolved
            .metadata
            .version_keys()
            .filter_map(|v| Version::parse(v).ok().map(|parsed| (parsed, v)))
            .filter(|(parsed, _)| *parsed < target)
            .max_by(|a, b| a.0.cmp(&b.0));

        let Some((_, previous_key)) = previous else {
            return Ok(serde_json::Value::Null);
        };
        let Some(previous_record) = resolved.metadata.version(previous_key) else {
            return Ok(serde_json::Value::Null);
        };

        let current = commands(record, &pkg.package_name);
        let before = commands(previous_record, &pkg.package_name);
        let added: Vec<String> = current
            .iter()
            .filter(|(name, _)| !before.contains_key(*name))
            .map(|(name, command)| format!("'{name}' (command: '{command}')"))
            .collect();

        if added.is_empty() {
            return Ok(json!({ "previous": previous_key }));
        }

        let noun = if added.len() == 1 {
            "a new binary"
        } else {
            "new binaries"
        };
        Err(CheckFailure::warning(format!(
            "Package '{}' introduces {noun} {} compared to version '{previous_key}'.",
            pkg.package_string,
            added.join(", ")
        )))
    }
}

//! Package request parsing.
//!
//! Parses install requests like:
//! - `express`
//! - `left-pad@0.0.1`
//! - `react@^18.0.0`
//! - `@types/node`
//! - `@types/node@next`

use super::error::PkgError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version spec used when the request names none.
pub const DEFAULT_VERSION_SPEC: &str = "latest";

/// A parsed, immutable request to vet one package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRequest {
    /// Full package name (e.g., "@scope/name" or "name").
    pub package_name: String,
    /// Exact version, dist-tag or range. Defaults to `latest`.
    pub package_version: String,
    /// The original `name@spec` text as given by the user.
    pub package_string: String,
}

impl PackageRequest {
    /// Parse a package request string.
    ///
    /// # Errors
    /// Returns an error if the request is empty or malformed.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(PkgError::spec_invalid("Empty package spec"));
        }

        let (name, range) = if input.starts_with('@') {
            Self::split_scoped(input)?
        } else {
            Self::split_unscoped(input)?
        };

        Ok(Self {
            package_name: name.to_string(),
            package_version: range.unwrap_or(DEFAULT_VERSION_SPEC).to_string(),
            package_string: input.to_string(),
        })
    }

    /// Build a request from an already-split name and version spec.
    #[must_use]
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            package_name: name.to_string(),
            package_version: version.to_string(),
            package_string: format!("{name}@{version}"),
        }
    }

    fn split_scoped(input: &str) -> Result<(&str, Option<&str>), PkgError> {
        let Some(slash_pos) = input.find('/') else {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: missing '/' in '{input}'"
            )));
        };

        if slash_pos == 1 {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty scope in '{input}'"
            )));
        }

        let after_slash = &input[slash_pos + 1..];
        if after_slash.is_empty() || after_slash.starts_with('@') {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty name in '{input}'"
            )));
        }

        match after_slash.find('@') {
            Some(at_pos) => {
                let range = &after_slash[at_pos + 1..];
                if range.is_empty() {
                    return Err(PkgError::spec_invalid(format!(
                        "Invalid package spec: empty version range in '{input}'"
                    )));
                }
                Ok((&input[..slash_pos + 1 + at_pos], Some(range)))
            }
            None => Ok((input, None)),
        }
    }

    fn split_unscoped(input: &str) -> Result<(&str, Option<&str>), PkgError> {
        let (name, range) = match input.find('@') {
            Some(at_pos) => (&input[..at_pos], Some(&input[at_pos + 1..])),
            None => (input, None),
        };

        if name.is_empty() {
            return Err(PkgError::spec_invalid(format!(
                "Invalid package spec: empty name in '{input}'"
            )));
        }

        if range.is_some_and(str::is_empty) {
            return Err(PkgError::spec_invalid(format!(
                "Invalid package spec: empty version range in '{input}'"
            )));
        }

        for c in name.chars() {
            if !c.is_alphanumeric() && c != '-' && c != '_' && c != '.' {
                return Err(PkgError::spec_invalid(format!(
                    "Invalid character '{c}' in package name '{name}'"
                )));
            }
        }

        Ok((name, range))
    }

    /// Check if this is a scoped package.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.package_name.starts_with('@')
    }

    /// Read requests from the dependencies of a `package.json`.
    ///
    /// Each entry becomes `name@range`. `devDependencies` are appended when
    /// `include_dev` is set.
    ///
    /// # Errors
    /// Returns an error if the manifest cannot be read or parsed.
    pub fn from_manifest(path: &Path, include_dev: bool) -> Result<Vec<Self>, PkgError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PkgError::manifest_invalid(format!("Failed to read {}: {e}", path.display()))
        })?;

        let manifest: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            PkgError::manifest_invalid(format!("Invalid JSON in {}: {e}", path.display()))
        })?;

        let mut sections = vec!["dependencies"];
        if include_dev {
            sections.push("devDependencies");
        }

        let mut requests = Vec::new();
        for section in sections {
            let Some(deps) = manifest.get(section).and_then(|v| v.as_object()) else {
                continue;
            };
            for (name, range) in deps {
                let range = range.as_str().ok_or_else(|| {
                    PkgError::manifest_invalid(format!(
                        "Invalid range for '{name}': expected string"
                    ))
                })?;
                requests.push(Self::new(name, range));
            }
        }

        Ok(requests)
    }
}

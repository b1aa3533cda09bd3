//! Pipeline output and per-package aggregation.

use crate::check::{CheckRunResult, Finding, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Check name of the synthetic finding for packages the registry lacks.
pub const NOT_FOUND_CHECK: &str = "not_found";

/// Message fragment that marks a finding as a malicious-package verdict.
const MALICIOUS_MARKER: &str = "malicious package";

/// Everything a run produced, keyed by package string.
///
/// Each entry holds the slice of every executed check that concerns that
/// package, in check registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineResult {
    packages: BTreeMap<String, Vec<CheckRunResult>>,
}

/// Aggregated verdict for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageReport {
    pub package: String,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl PackageReport {
    /// Whether one of the errors is a malicious-package verdict.
    #[must_use]
    pub fn is_malicious(&self) -> bool {
        self.errors.iter().any(is_malicious)
    }
}

fn is_malicious(finding: &Finding) -> bool {
    finding.severity == Severity::Error
        && finding.message.to_lowercase().contains(MALICIOUS_MARKER)
}

impl PipelineResult {
    /// Make sure `package_string` has an entry, even without findings.
    pub(crate) fn register(&mut self, package_string: &str) {
        self.packages.entry(package_string.to_string()).or_default();
    }

    /// File the part of `run` that concerns each registered package.
    pub(crate) fn absorb(&mut self, run: &CheckRunResult) {
        for (package, checks) in &mut self.packages {
            checks.push(run.for_package(package));
        }
    }

    pub(crate) fn insert(&mut self, package_string: &str, run: CheckRunResult) {
        self.packages
            .entry(package_string.to_string())
            .or_default()
            .push(run);
    }

    /// Package strings, sorted.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Raw per-check results for one package.
    #[must_use]
    pub fn get(&self, package_string: &str) -> Option<&[CheckRunResult]> {
        self.packages.get(package_string).map(Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Per-package errors and warnings.
    ///
    /// A package with a malicious-package error reports only that error and
    /// no warnings.
    #[must_use]
    pub fn aggregate(&self) -> Vec<PackageReport> {
        self.packages
            .iter()
            .map(|(package, checks)| aggregate_package(package, checks))
            .collect()
    }

    /// Errors across all packages, after aggregation.
    #[must_use]
    pub fn count_errors(&self) -> usize {
        self.aggregate().iter().map(|r| r.errors.len()).sum()
    }

    /// Warnings across all packages, after aggregation.
    #[must_use]
    pub fn count_warnings(&self) -> usize {
        self.aggregate().iter().map(|r| r.warnings.len()).sum()
    }
}

fn aggregate_package(package: &str, checks: &[CheckRunResult]) -> PackageReport {
    let errors: Vec<Finding> = checks.iter().flat_map(|c| c.errors.iter().cloned()).collect();

    if let Some(verdict) = errors.iter().find(|f| is_malicious(f)) {
        return PackageReport {
            package: package.to_string(),
            errors: vec![verdict.clone()],
            warnings: Vec::new(),
        };
    }

    PackageReport {
        package: package.to_string(),
        warnings: checks
            .iter()
            .flat_map(|c| c.warnings.iter().cloned())
            .collect(),
        errors,
    }
}

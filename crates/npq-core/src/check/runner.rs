//! Per-check execution across packages.

use super::{Category, Check, CheckFailure, Finding, Severity};
use crate::pkg::PackageRequest;
use crate::throttle::Throttle;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Everything one check produced during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRunResult {
    pub check_name: String,
    pub category: Category,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    /// Success values keyed by package string.
    pub data: BTreeMap<String, serde_json::Value>,
}

impl CheckRunResult {
    #[must_use]
    pub fn new(check_name: &str, category: Category) -> Self {
        Self {
            check_name: check_name.to_string(),
            category,
            errors: Vec::new(),
            warnings: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    /// Record a failure for `package_string` under this check.
    pub fn push_failure(&mut self, package_string: &str, failure: CheckFailure) {
        let finding = Finding {
            package_string: package_string.to_string(),
            message: failure.message,
            severity: failure.severity,
            check_name: self.check_name.clone(),
            category: self.category,
        };
        match finding.severity {
            Severity::Error => self.errors.push(finding),
            Severity::Warning => self.warnings.push(finding),
        }
    }

    /// Findings and data that concern `package_string` only.
    #[must_use]
    pub fn for_package(&self, package_string: &str) -> Self {
        let keep = |f: &&Finding| f.package_string == package_string;
        Self {
            check_name: self.check_name.clone(),
            category: self.category,
            errors: self.errors.iter().filter(keep).cloned().collect(),
            warnings: self.warnings.iter().filter(keep).cloned().collect(),
            data: self
                .data
                .get(package_string)
                .map(|v| BTreeMap::from([(package_string.to_string(), v.clone())]))
                .unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn has_findings(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }
}

/// Validate every package with `check`, each in its own task.
///
/// A failing or panicking unit only produces a finding for its own package.
/// When the check declares a throttle policy, the shared `throttle` is
/// reconfigured with it and every `validate` call goes through it.
pub async fn run_check(
    check: Arc<dyn Check>,
    packages: &[PackageRequest],
    throttle: &Throttle,
) -> CheckRunResult {
    let throttle = check.throttle_policy().map(|policy| {
        throttle.configure(policy.max_concurrent, policy.min_delay);
        throttle.clone()
    });

    let handles: Vec<_> = packages
        .iter()
        .cloned()
        .map(|pkg| {
            let check = Arc::clone(&check);
            let throttle = throttle.clone();
            tokio::spawn(async move {
                match throttle {
                    Some(throttle) => throttle.throttle(|| check.validate(&pkg)).await,
                    None => check.validate(&pkg).await,
                }
            })
        })
        .collect();

    let outcomes = futures::future::join_all(handles).await;

    let mut result = CheckRunResult::new(check.name(), check.category());
    for (pkg, outcome) in packages.iter().zip(outcomes) {
        match outcome {
            Ok(Ok(data)) => {
                result.data.insert(pkg.package_string.clone(), data);
            }
            Ok(Err(failure)) => {
                debug!(
                    check = check.name(),
                    package = %pkg.package_string,
                    severity = ?failure.severity,
                    "check reported a finding"
                );
                result.push_failure(&pkg.package_string, failure);
            }
            Err(join_err) => {
                let failure = CheckFailure::error(format!(
                    "{} check failed unexpectedly: {}",
                    check.name(),
                    join_error_message(join_err)
                ));
                warn!(
                    check = check.name(),
                    package = %pkg.package_string,
                    message = %failure.message,
                    "check task aborted"
                );
                result.push_failure(&pkg.package_string, failure);
            }
        }
    }

    result
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::ThrottlePolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails by package name: `err-*` errors, `warn-*` warns, `boom` panics.
    #[derive(Default)]
    struct ByName {
        calls: AtomicUsize,
        policy: Option<ThrottlePolicy>,
    }

    #[async_trait]
    impl Check for ByName {
        fn name(&self) -> &'static str {
            "by_name"
        }

        fn category(&self) -> Category {
            Category::SupplyChainSecurity
        }

        fn title(&self) -> &'static str {
            "Judging packages by their name"
        }

        fn throttle_policy(&self) -> Option<ThrottlePolicy> {
            self.policy
        }

        async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = pkg.package_name.as_str();
            if name == "boom" {
                panic!("validator exploded");
            }
            if name.starts_with("err-") {
                return Err(CheckFailure::error(format!("{name} is bad")));
            }
            if name.starts_with("warn-") {
                return Err(CheckFailure::warning(format!("{name} is iffy")));
            }
            Ok(serde_json::json!({ "ok": name }))
        }
    }

    fn requests(names: &[&str]) -> Vec<PackageRequest> {
        names.iter().map(|n| PackageRequest::new(n, "1.0.0")).collect()
    }

    #[tokio::test]
    async fn test_outcomes_are_split_by_severity() {
        let check = Arc::new(ByName::default());
        let pkgs = requests(&["good", "err-a", "warn-b"]);
        let result = run_check(check.clone(), &pkgs, &Throttle::default()).await;

        assert_eq!(check.calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].package_string, "err-a@1.0.0");
        assert_eq!(result.errors[0].check_name, "by_name");
        assert_eq!(result.errors[0].category, Category::SupplyChainSecurity);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].message, "warn-b is iffy");
        assert_eq!(result.data.len(), 1);
        assert!(result.data.contains_key("good@1.0.0"));
    }

    #[tokio::test]
    async fn test_panic_is_isolated_to_its_package() {
        let check = Arc::new(ByName::default());
        let pkgs = requests(&["boom", "good"]);
        let result = run_check(check, &pkgs, &Throttle::default()).await;

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].package_string, "boom@1.0.0");
        assert!(result.errors[0].message.contains("validator exploded"));
        assert!(result.data.contains_key("good@1.0.0"));
    }

    #[tokio::test]
    async fn test_policy_reconfigures_shared_throttle() {
        let check = Arc::new(ByName {
            policy: Some(ThrottlePolicy {
                max_concurrent: 1,
                min_delay: Duration::from_millis(20),
            }),
            ..ByName::default()
        });
        let throttle = Throttle::default();
        let start = tokio::time::Instant::now();
        let result = run_check(check, &requests(&["a", "b", "c"]), &throttle).await;

        assert_eq!(result.data.len(), 3);
        assert_eq!(throttle.limits(), (1, Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_for_package_slices_one_package() {
        let check = Arc::new(ByName::default());
        let pkgs = requests(&["err-a", "warn-b", "good"]);
        let result = run_check(check, &pkgs, &Throttle::default()).await;

        let slice = result.for_package("warn-b@1.0.0");
        assert!(slice.errors.is_empty());
        assert_eq!(slice.warnings.len(), 1);
        assert!(slice.data.is_empty());
        assert!(!result.for_package("good@1.0.0").has_findings());
    }
}

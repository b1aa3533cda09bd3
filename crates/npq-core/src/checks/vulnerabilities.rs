//! Known-vulnerability and malware lookup.
//!
//! With an API token the commercial vulnerability database is queried,
//! which also reports packages known to be malicious. Without one the
//! public OSV database is used.

use crate::check::{Category, Check, CheckFailure, SharedDeps, ThrottlePolicy};
use crate::pkg::PackageRequest;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const SNYK_API_URL: &str = "https://snyk.io/api/v1/test/npm";
const SNYK_PACKAGE_PAGE: &str = "https://snyk.io/vuln/npm:";
const OSV_QUERY_URL: &str = "https://api.osv.dev/v1/query";

/// Where vulnerability data is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulnerabilityEndpoints {
    /// Token-authenticated test endpoint; `/<name>/<version>` is appended.
    pub snyk_api: String,
    /// Public advisory page prefix; the encoded name is appended.
    pub snyk_package_page: String,
    pub osv_query: String,
}

impl Default for VulnerabilityEndpoints {
    fn default() -> Self {
        Self {
            snyk_api: SNYK_API_URL.to_string(),
            snyk_package_page: SNYK_PACKAGE_PAGE.to_string(),
            osv_query: OSV_QUERY_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnykReport {
    #[serde(default)]
    vulnerabilities: Vec<serde_json::Value>,
    #[serde(rename = "isMaliciousPackage", default)]
    is_malicious_package: bool,
}

#[derive(Debug, Deserialize)]
struct OsvReport {
    #[serde(default)]
    vulns: Vec<serde_json::Value>,
}

/// Reports known vulnerabilities and malicious packages.
#[derive(Debug)]
pub struct VulnerabilitiesCheck {
    deps: SharedDeps,
    endpoints: VulnerabilityEndpoints,
}

impl VulnerabilitiesCheck {
    pub const NAME: &'static str = "vulnerabilities";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self::with_endpoints(deps, VulnerabilityEndpoints::default())
    }

    #[must_use]
    pub fn with_endpoints(deps: &SharedDeps, endpoints: VulnerabilityEndpoints) -> Self {
        Self {
            deps: deps.clone(),
            endpoints,
        }
    }

    async fn query_snyk(&self, token: &str, name: &str, version: &str) -> Option<SnykReport> {
        let url = format!("{}/{}/{version}", self.endpoints.snyk_api, encode_component(name));
        let response = self
            .deps
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, format!("token {token}"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match response {
            Ok(response) => response.json().await.ok(),
            Err(err) => {
                debug!(package = name, error = %err, "vulnerability API query failed");
                None
            }
        }
    }

    async fn query_osv(&self, name: &str, version: &str) -> Option<OsvReport> {
        let body = json!({
            "version": version,
            "package": { "name": name, "ecosystem": "npm" }
        });
        let response = self
            .deps
            .http
            .post(&self.endpoints.osv_query)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match response {
            Ok(response) => response.json().await.ok(),
            Err(err) => {
                debug!(package = name, error = %err, "OSV query failed");
                None
            }
        }
    }
}

fn encode_component(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn query_failed() -> CheckFailure {
    CheckFailure::error("Unable to query vulnerabilities for packages")
}

#[async_trait]
impl Check for VulnerabilitiesCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::MalwareDetection
    }

    fn title(&self) -> &'static str {
        "Checking for known vulnerabilities"
    }

    fn throttle_policy(&self) -> Option<ThrottlePolicy> {
        Some(ThrottlePolicy {
            max_concurrent: 1,
            min_delay: Duration::from_millis(1000),
        })
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let name = pkg.package_name.as_str();
        let version = self
            .deps
            .resolver
            .resolve(name, &pkg.package_version)
            .await?;

        if let Some(token) = self.deps.config.snyk_token.as_deref() {
            let report = self
                .query_snyk(token, name, &version)
                .await
                .ok_or_else(query_failed)?;
            let page = format!("{}{}", self.endpoints.snyk_package_page, encode_component(name));

            if report.is_malicious_package {
                return Err(CheckFailure::error(format!("Malicious package found: {page}")));
            }
            let count = report.vulnerabilities.len();
            if count > 0 {
                return Err(CheckFailure::error(format!(
                    "{count} vulnerable path(s) found: {page}"
                )));
            }
            return Ok(json!({ "issuesCount": 0, "isMaliciousPackage": false }));
        }

        let report = self.query_osv(name, &version).await.ok_or_else(query_failed)?;
        let count = report.vulns.len();
        if count > 0 {
            return Err(CheckFailure::error(format!(
                "{count} vulnerabilities found by OSV for {name}"
            )));
        }

        Ok(json!({ "issuesCount": 0, "isMaliciousPackage": false }))
    }
}

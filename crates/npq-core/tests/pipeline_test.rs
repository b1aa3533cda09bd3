//! End-to-end runs of the vetting pipeline against a mock registry.

use async_trait::async_trait;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use npq_core::check::{disable_env_var, Category, CheckRef, CheckRegistry};
use npq_core::checks::{
    AgeCheck, DeprecationCheck, DownloadsCheck, LicenseCheck, NewBinCheck, ReadmeCheck,
    ScriptsCheck, VersionMaturityCheck,
};
use npq_core::pkg::MetadataSource;
use npq_core::{
    Check, CheckFailure, Config, Error, PackageMetadata, PackageRequest, Pipeline, PkgError,
    Severity, NOT_FOUND_CHECK,
};
use serde_json::{json, Value};
use serial_test::serial;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn days_ago(days: i64) -> String {
    (Utc::now() - Duration::days(days)).to_rfc3339()
}

fn express_doc() -> Value {
    json!({
        "name": "express",
        "dist-tags": { "latest": "4.18.2" },
        "versions": {
            "4.18.1": { "name": "express", "version": "4.18.1", "license": "MIT" },
            "4.18.2": { "name": "express", "version": "4.18.2", "license": "MIT" }
        },
        "time": {
            "created": "2010-12-29T19:38:25.450Z",
            "4.18.1": "2022-04-29T19:41:47.000Z",
            "4.18.2": "2022-10-08T20:11:34.000Z"
        },
        "license": "MIT",
        "readme": "# express\n\nFast, unopinionated, minimalist web framework"
    })
}

fn left_pad_doc() -> Value {
    json!({
        "name": "left-pad",
        "dist-tags": { "latest": "0.0.1" },
        "versions": {
            "0.0.1": { "name": "left-pad", "version": "0.0.1", "license": "WTFPL" }
        },
        "time": {
            "created": days_ago(400),
            "0.0.1": days_ago(2)
        },
        "license": "WTFPL",
        "readme": "# left-pad"
    })
}

async fn package(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "express" => Json(express_doc()).into_response(),
        "left-pad" => Json(left_pad_doc()).into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response(),
    }
}

async fn downloads(Path(name): Path<String>) -> Json<Value> {
    Json(json!({ "downloads": 1_000_000, "package": name }))
}

async fn serve_registry() -> String {
    let app = Router::new()
        .route("/downloads/point/last-month/:name", get(downloads))
        .route("/:name", get(package));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

/// Built-in checks that only need the registry.
fn offline_checks() -> CheckRegistry {
    CheckRegistry::new(vec![
        CheckRef::new(AgeCheck::NAME, |deps| Arc::new(AgeCheck::new(deps))),
        CheckRef::new(DeprecationCheck::NAME, |deps| Arc::new(DeprecationCheck::new(deps))),
        CheckRef::new(DownloadsCheck::NAME, |deps| Arc::new(DownloadsCheck::new(deps))),
        CheckRef::new(LicenseCheck::NAME, |deps| Arc::new(LicenseCheck::new(deps))),
        CheckRef::new(NewBinCheck::NAME, |deps| Arc::new(NewBinCheck::new(deps))),
        CheckRef::new(ReadmeCheck::NAME, |deps| Arc::new(ReadmeCheck::new(deps))),
        CheckRef::new(ScriptsCheck::NAME, |deps| Arc::new(ScriptsCheck::new(deps))),
        CheckRef::new(VersionMaturityCheck::NAME, |deps| {
            Arc::new(VersionMaturityCheck::new(deps))
        }),
    ])
}

async fn mock_pipeline() -> Pipeline {
    let url = serve_registry().await;
    Pipeline::new(
        Config::default()
            .with_registry_url(&url)
            .with_registry_api_url(&url),
    )
    .unwrap()
    .with_registry(offline_checks())
}

fn reqs(specs: &[&str]) -> Vec<PackageRequest> {
    specs.iter().map(|s| PackageRequest::parse(s).unwrap()).collect()
}

#[tokio::test]
#[serial]
async fn test_clean_and_fresh_packages() {
    let pipeline = mock_pipeline().await;
    let result = pipeline
        .process(&reqs(&["express", "left-pad@0.0.1"]))
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.count_errors(), 0);
    assert_eq!(result.count_warnings(), 1);

    let reports = result.aggregate();
    let express = reports.iter().find(|r| r.package == "express").unwrap();
    assert!(express.errors.is_empty() && express.warnings.is_empty());

    let left_pad = reports.iter().find(|r| r.package == "left-pad@0.0.1").unwrap();
    assert_eq!(left_pad.warnings.len(), 1);
    let warning = &left_pad.warnings[0];
    assert_eq!(warning.check_name, VersionMaturityCheck::NAME);
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.category, Category::PackageHealth);
    assert_eq!(
        warning.message,
        "Detected a recently published version (published 2 days ago) - consider waiting for community review"
    );

    // One slice per executed check, even for clean packages.
    assert_eq!(result.get("express").unwrap().len(), 8);
}

#[tokio::test]
#[serial]
async fn test_single_unknown_package_fails_run() {
    let pipeline = mock_pipeline().await;
    let err = pipeline
        .process(&reqs(&["no-such-pkg-xyz"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PackageNotFound { ref name } if name == "no-such-pkg-xyz"));
}

#[tokio::test]
#[serial]
async fn test_unknown_among_many_is_a_finding() {
    let pipeline = mock_pipeline().await;
    let result = pipeline
        .process(&reqs(&["express", "no-such-pkg-xyz@1.0.0"]))
        .await
        .unwrap();

    let missing = result.get("no-such-pkg-xyz@1.0.0").unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].check_name, NOT_FOUND_CHECK);
    assert_eq!(
        missing[0].errors[0].message,
        "Package not found: no-such-pkg-xyz"
    );
    assert_eq!(result.count_errors(), 1);
}

/// Serves fixed documents and counts every fetch.
struct CountingSource {
    docs: HashMap<String, PackageMetadata>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl CountingSource {
    fn new(docs: Vec<Value>) -> Self {
        Self {
            docs: docs
                .into_iter()
                .map(|d| {
                    let doc: PackageMetadata = serde_json::from_value(d).unwrap();
                    (doc.name.clone(), doc)
                })
                .collect(),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    fn fetches(&self, name: &str) -> usize {
        self.fetches.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MetadataSource for CountingSource {
    async fn fetch_metadata(&self, name: &str) -> Result<Option<PackageMetadata>, PkgError> {
        *self.fetches.lock().unwrap().entry(name.to_string()).or_default() += 1;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        Ok(self.docs.get(name).cloned())
    }

    async fn fetch_downloads(&self, _name: &str) -> Result<u64, PkgError> {
        Ok(1_000_000)
    }
}

#[tokio::test]
#[serial]
async fn test_metadata_fetched_once_per_name() {
    let source = Arc::new(CountingSource::new(vec![express_doc(), left_pad_doc()]));
    let pipeline = Pipeline::with_source(Config::default(), source.clone())
        .with_registry(offline_checks());

    pipeline
        .process(&reqs(&["express", "left-pad@0.0.1", "express@4.18.1", "ghost"]))
        .await
        .unwrap();

    assert_eq!(source.fetches("express"), 1);
    assert_eq!(source.fetches("left-pad"), 1);
    assert_eq!(source.fetches("ghost"), 1);
}

#[tokio::test]
#[serial]
async fn test_each_run_starts_with_a_fresh_cache() {
    let source = Arc::new(CountingSource::new(vec![express_doc()]));
    let pipeline = Pipeline::with_source(Config::default(), source.clone())
        .with_registry(offline_checks());

    pipeline.process(&reqs(&["express"])).await.unwrap();
    pipeline.process(&reqs(&["express"])).await.unwrap();

    assert_eq!(source.fetches("express"), 2);
}

#[tokio::test]
#[serial]
async fn test_disabled_check_does_not_run() {
    let source = Arc::new(CountingSource::new(vec![left_pad_doc()]));
    let pipeline = Pipeline::with_source(Config::default(), source).with_registry(offline_checks());

    let var = disable_env_var(VersionMaturityCheck::NAME);
    assert_eq!(var, "MARSHALL_DISABLE_VERSION_MATURITY");
    std::env::set_var(&var, "1");
    let result = pipeline.process(&reqs(&["left-pad@0.0.1"])).await;
    std::env::remove_var(&var);

    let result = result.unwrap();
    assert_eq!(result.count_warnings(), 0);
    let checks = result.get("left-pad@0.0.1").unwrap();
    assert_eq!(checks.len(), 7);
    assert!(checks
        .iter()
        .all(|c| c.check_name != VersionMaturityCheck::NAME));
}

/// Flags everything as malicious and counts its calls.
struct Verdict {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Check for Verdict {
    fn name(&self) -> &'static str {
        "verdict"
    }

    fn category(&self) -> Category {
        Category::MalwareDetection
    }

    fn title(&self) -> &'static str {
        "Scanning for known malware"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<Value, CheckFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if pkg.package_name == "left-pad" {
            return Err(CheckFailure::error("Malicious package found: left-pad"));
        }
        Ok(Value::Null)
    }
}

#[tokio::test]
#[serial]
async fn test_malicious_verdict_hides_other_findings() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let registry = offline_checks().with_check(CheckRef::new("verdict", move |_| {
        Arc::new(Verdict {
            calls: Arc::clone(&counter),
        })
    }));

    let source = Arc::new(CountingSource::new(vec![express_doc(), left_pad_doc()]));
    let pipeline = Pipeline::with_source(Config::default(), source).with_registry(registry);
    let result = pipeline
        .process(&reqs(&["express", "left-pad@0.0.1"]))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let reports = result.aggregate();
    let left_pad = reports.iter().find(|r| r.package == "left-pad@0.0.1").unwrap();
    assert!(left_pad.is_malicious());
    assert_eq!(left_pad.errors.len(), 1);
    assert_eq!(left_pad.errors[0].check_name, "verdict");
    assert!(left_pad.warnings.is_empty());

    assert_eq!(result.count_errors(), 1);
    assert_eq!(result.count_warnings(), 0);
}

//! Pipeline executor.
//!
//! One call to [`Pipeline::process`] is one run: warm the metadata cache
//! for every requested package, drop the ones the registry does not know,
//! discover and build the checks, run them (categories, checks and
//! packages all concurrently), then file every finding under its package.

use crate::check::{run_check, Category, Check, CheckFailure, CheckRegistry, CheckRunResult, SharedDeps};
use crate::config::Config;
use crate::error::Error;
use crate::pkg::{Lookup, MetadataCache, MetadataSource, PackageRequest, PkgError, RegistryClient};
use crate::report::{PipelineResult, NOT_FOUND_CHECK};
use crate::throttle::Throttle;
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives vetting runs against one metadata source.
pub struct Pipeline {
    config: Arc<Config>,
    source: Arc<dyn MetadataSource>,
    http: reqwest::Client,
    registry: CheckRegistry,
    throttle: Throttle,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline over the npm registry named in `config`, with every
    /// built-in check.
    ///
    /// # Errors
    /// Fails on an unusable registry URL or a zero throttle size.
    pub fn new(config: Config) -> Result<Self, Error> {
        if config.max_concurrent == 0 {
            return Err(Error::config("max_concurrent must be at least 1"));
        }
        let client = RegistryClient::new(&config.registry_url, &config.registry_api_url)?;
        let http = client.http().clone();
        Ok(Self::with_source(config, Arc::new(client)).with_http(http))
    }

    /// Pipeline over an arbitrary metadata source.
    #[must_use]
    pub fn with_source(config: Config, source: Arc<dyn MetadataSource>) -> Self {
        Self {
            throttle: Throttle::new(config.max_concurrent, config.min_delay()),
            config: Arc::new(config),
            source,
            http: reqwest::Client::new(),
            registry: CheckRegistry::builtin(),
        }
    }

    /// Replace the set of checks.
    #[must_use]
    pub fn with_registry(mut self, registry: CheckRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the HTTP client handed to checks.
    #[must_use]
    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// The limiter shared by checks that opt into throttling.
    #[must_use]
    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Vet `packages` and collect every finding.
    ///
    /// # Errors
    /// Fails when the only requested package does not exist, or when no
    /// usable checks can be discovered. Everything else, including network
    /// failures inside checks, is reported as a finding.
    pub async fn process(&self, packages: &[PackageRequest]) -> Result<PipelineResult, Error> {
        let packages = dedupe(packages);
        let cache = Arc::new(MetadataCache::new(Arc::clone(&self.source)));

        info!(packages = packages.len(), "warming metadata cache");
        let lookups = join_all(packages.iter().map(|p| cache.get_info(&p.package_name))).await;

        info!("filtering unknown packages");
        let requested = packages.len();
        let mut present = Vec::with_capacity(requested);
        let mut missing = Vec::new();
        for (pkg, lookup) in packages.into_iter().zip(lookups) {
            match lookup {
                Ok(Lookup::Found(_)) => present.push(pkg),
                Ok(Lookup::NotFound) => {
                    warn!(package = %pkg.package_name, "package not found in registry");
                    missing.push(pkg);
                }
                Err(err) => {
                    warn!(package = %pkg.package_name, error = %err, "metadata fetch failed");
                    present.push(pkg);
                }
            }
        }

        if requested == 1 {
            if let Some(pkg) = missing.first() {
                return Err(Error::PackageNotFound {
                    name: pkg.package_name.clone(),
                });
            }
        }

        let mut result = PipelineResult::default();
        if present.is_empty() {
            info!(missing = missing.len(), "nothing left to check");
            record_missing(&mut result, &missing);
            return Ok(result);
        }

        info!("discovering checks");
        let refs = self.registry.discover()?;
        let deps = SharedDeps::new(cache, self.http.clone(), Arc::clone(&self.config));
        let checks: Vec<Arc<dyn Check>> = CheckRegistry::build(&refs, &deps)?
            .into_iter()
            .filter(|check| {
                let enabled = check.is_enabled();
                if !enabled {
                    debug!(check = check.name(), "check disabled by environment");
                }
                enabled
            })
            .collect();

        info!(
            checks = checks.len(),
            packages = present.len(),
            "executing checks"
        );
        let runs = self.execute(checks, &present).await;

        info!("aggregating findings");
        for pkg in &present {
            result.register(&pkg.package_string);
        }
        for run in &runs {
            result.absorb(run);
        }
        record_missing(&mut result, &missing);

        info!(
            packages = result.len(),
            errors = result.count_errors(),
            warnings = result.count_warnings(),
            "run complete"
        );
        Ok(result)
    }

    /// Run categories concurrently, and the checks of each category
    /// concurrently. Results come back in category order, then
    /// registration order.
    async fn execute(
        &self,
        checks: Vec<Arc<dyn Check>>,
        packages: &[PackageRequest],
    ) -> Vec<CheckRunResult> {
        let mut by_category: BTreeMap<Category, Vec<Arc<dyn Check>>> = BTreeMap::new();
        for check in checks {
            by_category.entry(check.category()).or_default().push(check);
        }

        let categories = by_category.into_iter().map(|(category, checks)| async move {
            debug!(category = category.id(), checks = checks.len(), "running category");
            join_all(
                checks
                    .into_iter()
                    .map(|check| run_check(check, packages, &self.throttle)),
            )
            .await
        });

        join_all(categories).await.into_iter().flatten().collect()
    }
}

fn dedupe(packages: &[PackageRequest]) -> Vec<PackageRequest> {
    let mut seen = HashSet::new();
    packages
        .iter()
        .filter(|p| seen.insert(p.package_string.clone()))
        .cloned()
        .collect()
}

fn record_missing(result: &mut PipelineResult, missing: &[PackageRequest]) {
    for pkg in missing {
        let mut run = CheckRunResult::new(NOT_FOUND_CHECK, Category::PackageHealth);
        run.push_failure(
            &pkg.package_string,
            CheckFailure::error(PkgError::not_found(&pkg.package_name).message()),
        );
        result.insert(&pkg.package_string, run);
    }
}

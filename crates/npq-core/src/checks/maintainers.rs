//! Maintainer e-mail domain liveness.
//!
//! An e-mail domain that no longer resolves can be re-registered by anyone,
//! who then controls password resets for the maintainer's npm account.

use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::{PackageRequest, Person};
use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Answers whether a domain currently resolves.
#[async_trait]
pub trait DomainResolver: Send + Sync {
    async fn resolves(&self, domain: &str) -> bool;
}

/// DNS lookups through the system resolver configuration.
pub struct HickoryDomainResolver {
    resolver: TokioResolver,
}

impl HickoryDomainResolver {
    /// Use the system configuration, falling back to public resolvers when
    /// it cannot be read.
    #[must_use]
    pub fn new() -> Self {
        let resolver = match TokioResolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(err) => {
                debug!(error = %err, "system resolver config unavailable, using defaults");
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };
        Self { resolver }
    }
}

impl Default for HickoryDomainResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HickoryDomainResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HickoryDomainResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl DomainResolver for HickoryDomainResolver {
    async fn resolves(&self, domain: &str) -> bool {
        match self.resolver.lookup_ip(domain).await {
            Ok(lookup) => lookup.iter().next().is_some(),
            Err(err) => {
                debug!(domain, error = %err, "domain lookup failed");
                false
            }
        }
    }
}

/// Flags maintainers whose e-mail domain no longer resolves.
pub struct ExpiredDomainsCheck {
    deps: SharedDeps,
    resolver: Arc<dyn DomainResolver>,
}

impl fmt::Debug for ExpiredDomainsCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiredDomainsCheck").finish_non_exhaustive()
    }
}

impl ExpiredDomainsCheck {
    pub const NAME: &'static str = "maintainers_expired_emails";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self::with_resolver(deps, Arc::new(HickoryDomainResolver::new()))
    }

    #[must_use]
    pub fn with_resolver(deps: &SharedDeps, resolver: Arc<dyn DomainResolver>) -> Self {
        Self {
            deps: deps.clone(),
            resolver,
        }
    }
}

fn email_domain(person: &Person) -> Option<&str> {
    person
        .email
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim())
        .filter(|d| !d.is_empty())
}

#[async_trait]
impl Check for ExpiredDomainsCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::SupplyChainSecurity
    }

    fn title(&self) -> &'static str {
        "Detecting expired domains for authors account"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let metadata = self.deps.cache.get_metadata(&pkg.package_name).await?;
        let maintainers = metadata
            .latest()
            .map(|r| r.maintainers.as_slice())
            .filter(|m| !m.is_empty())
            .unwrap_or(metadata.maintainers.as_slice());

        let domains: BTreeSet<&str> = maintainers
            .iter()
            .filter(|m| !m.email.is_empty())
            .filter_map(email_domain)
            .collect();

        let lookups = domains.iter().map(|domain| async move {
            (*domain, self.resolver.resolves(domain).await)
        });
        let results = futures::future::join_all(lookups).await;

        if let Some((domain, _)) = results.iter().find(|(_, ok)| !ok) {
            return Err(CheckFailure::error(format!(
                "Unable to resolve domain for maintainer e-mail, could be an expired account: {domain}"
            )));
        }

        Ok(json!({ "domains": domains }))
    }
}

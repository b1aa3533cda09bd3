use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::{PackageRequest, Repository};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;
use url::Url;

/// Requires a reachable source repository or homepage.
#[derive(Debug)]
pub struct RepoCheck {
    deps: SharedDeps,
}

impl RepoCheck {
    pub const NAME: &'static str = "repo";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self { deps: deps.clone() }
    }

    /// `true` when the URL answers with anything but a transport failure or 404.
    async fn reachable(&self, url: &str) -> bool {
        match self.deps.http.get(url).send().await {
            Ok(response) => response.status() != StatusCode::NOT_FOUND,
            Err(err) => {
                debug!(url, error = %err, "repository probe failed");
                false
            }
        }
    }
}

/// Browsable `https://host/path` form of a repository URL such as
/// `git+https://github.com/org/repo.git` or `git://github.com/org/repo`.
fn browsable_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str().filter(|h| !h.is_empty())?;
    Url::parse(&format!("https://{host}{}", parsed.path()))
        .ok()
        .map(String::from)
}

#[async_trait]
impl Check for RepoCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::SupplyChainSecurity
    }

    fn title(&self) -> &'static str {
        "Identifying package repository"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let metadata = self.deps.cache.get_metadata(&pkg.package_name).await?;
        let latest = metadata.latest();

        let repository = latest
            .and_then(|r| r.repository.as_ref())
            .or(metadata.repository.as_ref())
            .and_then(Repository::url);
        let homepage = latest
            .and_then(|r| r.homepage.as_deref())
            .or(metadata.homepage.as_deref())
            .filter(|h| !h.is_empty());

        if let Some(repository) = repository {
            let Some(url) = browsable_url(repository) else {
                return Err(CheckFailure::error(
                    "No valid repository is associated with the package",
                ));
            };
            if !self.reachable(&url).await {
                return Err(CheckFailure::error(format!(
                    "The repository associated with the package ({url}) does not exist or is unreachable at the moment."
                )));
            }
            return Ok(json!({ "repository": url }));
        }

        if let Some(homepage) = homepage {
            if !self.reachable(homepage).await {
                return Err(CheckFailure::error(format!(
                    "The homepage associated with the package ({homepage}) does not exist or is unreachable at the moment."
                )));
            }
            return Ok(json!({ "homepage": homepage }));
        }

        Err(CheckFailure::error(
            "The package has no associated repository or homepage.",
        ))
    }
}

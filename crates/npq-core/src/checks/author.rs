//! Publisher reputation.
//!
//! Looks at the `_npmUser` that published the requested version and how
//! long that user has been publishing this package.

use super::{elapsed_since, parse_timestamp, round_days};
use crate::check::{Category, Check, CheckFailure, SharedDeps};
use crate::pkg::{PackageRequest, Person};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regex_lite::Regex;
use serde_json::json;
use std::sync::OnceLock;

/// A first-time publisher of a version this recent is an error.
const FIRST_PUBLISH_WINDOW_DAYS: i64 = 21;
/// Only versions published within this window are inspected further.
const RECENT_VERSION_DAYS: i64 = 45;
const NEW_PUBLISHER_ERROR_DAYS: i64 = 7;
const NEW_PUBLISHER_WARNING_DAYS: i64 = 30;

/// Flags versions published by users new to the package.
#[derive(Debug)]
pub struct AuthorCheck {
    deps: SharedDeps,
}

impl AuthorCheck {
    pub const NAME: &'static str = "author";

    #[must_use]
    pub fn new(deps: &SharedDeps) -> Self {
        Self { deps: deps.clone() }
    }
}

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)^[a-z0-9_'+\-.]*[a-z0-9_'+\-]@([a-z0-9][a-z0-9\-]*\.)+[a-z]{2,}$")
                .ok()
        })
        .as_ref()
}

/// Simple address check: no leading dot, no `..`.
fn is_valid_email(email: &str) -> bool {
    !email.starts_with('.')
        && !email.contains("..")
        && email_pattern().is_some_and(|re| re.is_match(email))
}

fn first_time_message(user: &Person, days: i64) -> String {
    format!(
        "The user {} <{}> published this package for the first time only {days} days ago",
        user.name, user.email
    )
}

#[async_trait]
impl Check for AuthorCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> Category {
        Category::SupplyChainSecurity
    }

    fn title(&self) -> &'static str {
        "Identifying package author"
    }

    async fn validate(&self, pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
        let resolved = self.deps.resolve(pkg).await?;
        let metadata = &resolved.metadata;

        let Some(user) = resolved
            .record()
            .and_then(|r| r.npm_user.as_ref())
            .filter(|u| !u.email.is_empty())
        else {
            return Err(CheckFailure::error(
                "Could not determine publishing user for this package version",
            ));
        };

        if !is_valid_email(&user.email) {
            return Err(CheckFailure::error(
                "The publishing user has no valid email address",
            ));
        }

        let published_at = |version: &str| metadata.published_at(version).and_then(parse_timestamp);
        let Some(version_published) = published_at(resolved.version.as_str()) else {
            return Ok(json!({ "publisher": user.email }));
        };

        let first_by_user: Option<(&str, DateTime<Utc>)> = metadata
            .versions
            .iter()
            .filter(|(_, record)| record.npm_user.as_ref().is_some_and(|u| u.email == user.email))
            .filter_map(|(version, _)| {
                published_at(version.as_str()).map(|t| (version.as_str(), t))
            })
            .min_by_key(|(_, t)| *t);

        let version_age = round_days(elapsed_since(version_published));

        match first_by_user {
            Some((first, first_published)) if first != resolved.version => {
                if version_age <= RECENT_VERSION_DAYS {
                    let tenure = round_days(
                        (version_published - first_published).max(Duration::zero()),
                    );
                    if tenure <= NEW_PUBLISHER_ERROR_DAYS {
                        return Err(CheckFailure::error(first_time_message(user, tenure)));
                    }
                    if tenure <= NEW_PUBLISHER_WARNING_DAYS {
                        return Err(CheckFailure::warning(first_time_message(user, tenure)));
                    }
                }
            }
            _ => {
                if version_age <= FIRST_PUBLISH_WINDOW_DAYS {
                    return Err(CheckFailure::error(first_time_message(user, version_age)));
                }
            }
        }

        Ok(json!({
            "publisher": user.email,
            "published": version_published.to_rfc3339()
        }))
    }
}

//! Built-in checks.

use crate::check::CheckRef;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

mod age;
mod author;
mod deprecation;
mod downloads;
mod license;
mod maintainers;
mod new_bin;
mod readme;
mod repo;
mod scripts;
mod version_maturity;
mod vulnerabilities;

pub use age::AgeCheck;
pub use author::AuthorCheck;
pub use deprecation::DeprecationCheck;
pub use downloads::DownloadsCheck;
pub use license::LicenseCheck;
pub use maintainers::{DomainResolver, ExpiredDomainsCheck, HickoryDomainResolver};
pub use new_bin::NewBinCheck;
pub use readme::ReadmeCheck;
pub use repo::RepoCheck;
pub use scripts::ScriptsCheck;
pub use version_maturity::VersionMaturityCheck;
pub use vulnerabilities::{VulnerabilitiesCheck, VulnerabilityEndpoints};

/// Readme/license text npm serves for packages pulled for security reasons.
pub(crate) const SECURITY_HOLDING_MARKER: &str = "# Security holding package";

pub(crate) const PLACEHOLDER_MESSAGE: &str =
    "Package flagged for security issues and served as place-holder";

/// Every built-in check, in registration order.
#[must_use]
pub fn builtin() -> Vec<CheckRef> {
    vec![
        CheckRef::new(AgeCheck::NAME, |deps| Arc::new(AgeCheck::new(deps))),
        CheckRef::new(AuthorCheck::NAME, |deps| Arc::new(AuthorCheck::new(deps))),
        CheckRef::new(DeprecationCheck::NAME, |deps| Arc::new(DeprecationCheck::new(deps))),
        CheckRef::new(DownloadsCheck::NAME, |deps| Arc::new(DownloadsCheck::new(deps))),
        CheckRef::new(ExpiredDomainsCheck::NAME, |deps| {
            Arc::new(ExpiredDomainsCheck::new(deps))
        }),
        CheckRef::new(LicenseCheck::NAME, |deps| Arc::new(LicenseCheck::new(deps))),
        CheckRef::new(NewBinCheck::NAME, |deps| Arc::new(NewBinCheck::new(deps))),
        CheckRef::new(ReadmeCheck::NAME, |deps| Arc::new(ReadmeCheck::new(deps))),
        CheckRef::new(RepoCheck::NAME, |deps| Arc::new(RepoCheck::new(deps))),
        CheckRef::new(ScriptsCheck::NAME, |deps| Arc::new(ScriptsCheck::new(deps))),
        CheckRef::new(VersionMaturityCheck::NAME, |deps| {
            Arc::new(VersionMaturityCheck::new(deps))
        }),
        CheckRef::new(VulnerabilitiesCheck::NAME, |deps| {
            Arc::new(VulnerabilitiesCheck::new(deps))
        }),
    ]
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Time elapsed since `then`, clamped at zero.
pub(crate) fn elapsed_since(then: DateTime<Utc>) -> Duration {
    (Utc::now() - then).max(Duration::zero())
}

/// Whole days in `d`, rounded to nearest.
pub(crate) fn round_days(d: Duration) -> i64 {
    round_div(d.num_milliseconds(), Duration::days(1).num_milliseconds())
}

/// Whole hours in `d`, rounded to nearest.
pub(crate) fn round_hours(d: Duration) -> i64 {
    round_div(d.num_milliseconds(), Duration::hours(1).num_milliseconds())
}

fn round_div(value: i64, unit: i64) -> i64 {
    (value + unit / 2).div_euclid(unit)
}

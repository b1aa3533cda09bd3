//! Version resolution using semver.
//!
//! Turns a requested specifier (exact version, dist-tag or range) into one
//! concrete version that exists in the registry document.

use super::cache::MetadataCache;
use super::error::PkgError;
use super::metadata::PackageMetadata;
use semver::{Version, VersionReq};
use std::sync::Arc;
use tracing::debug;

/// Resolves specifiers against the shared metadata cache.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    cache: Arc<MetadataCache>,
}

impl VersionResolver {
    #[must_use]
    pub fn new(cache: Arc<MetadataCache>) -> Self {
        Self { cache }
    }

    /// Resolve `spec` for `name` to a concrete version string.
    ///
    /// # Rules
    /// 1. A fully-qualified semver version is returned unchanged, without a
    ///    registry lookup.
    /// 2. A dist-tag present in the document resolves to its target.
    /// 3. Anything else is treated as a range; the highest satisfying
    ///    version wins.
    ///
    /// # Errors
    /// Returns an error naming the package and the specifier when nothing
    /// matches, or the cache error when the document cannot be fetched.
    pub async fn resolve(&self, name: &str, spec: &str) -> Result<String, PkgError> {
        let spec = spec.trim();
        if Version::parse(spec).is_ok() {
            return Ok(spec.to_string());
        }

        let metadata = self.cache.get_metadata(name).await?;
        let resolved = resolve_in(&metadata, name, spec)?;
        debug!(package = name, spec, version = %resolved, "resolved version");
        Ok(resolved)
    }
}

/// Resolve a specifier against an already-fetched document.
///
/// # Errors
/// Returns an error when no version, tag or range matches.
pub fn resolve_in(metadata: &PackageMetadata, name: &str, spec: &str) -> Result<String, PkgError> {
    if let Some(tagged) = metadata.dist_tag(spec) {
        return Ok(tagged.to_string());
    }

    if Version::parse(spec).is_ok() {
        return if metadata.versions.contains_key(spec) {
            Ok(spec.to_string())
        } else {
            Err(PkgError::version_not_found(name, spec))
        };
    }

    match max_satisfying(metadata.version_keys(), spec) {
        Ok(Some(version)) => Ok(version),
        Ok(None) => Err(PkgError::version_not_found(name, spec)),
        Err(_) if looks_like_tag(spec) => Err(PkgError::dist_tag_not_found(name, spec)),
        Err(_) => Err(PkgError::version_not_found(name, spec)),
    }
}

/// Highest version among `versions` satisfying `range`.
///
/// Keys that are not valid semver are ignored. Supports OR ranges like
/// `^1.0.0 || ^2.0.0`.
///
/// # Errors
/// Returns an error if `range` cannot be parsed.
pub fn max_satisfying<'a>(
    versions: impl IntoIterator<Item = &'a str>,
    range: &str,
) -> Result<Option<String>, PkgError> {
    let reqs = parse_alternatives(range)?;

    Ok(versions
        .into_iter()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| reqs.iter().any(|req| req.matches(v)))
        .max()
        .map(|v| v.to_string()))
}

/// Tags are bare words: no digits, comparators or wildcards.
fn looks_like_tag(spec: &str) -> bool {
    !spec.is_empty()
        && !spec
            .chars()
            .any(|c| c.is_ascii_digit() || matches!(c, '^' | '~' | '<' | '>' | '=' | '*' | '|' | ' '))
}

fn parse_alternatives(range: &str) -> Result<Vec<VersionReq>, PkgError> {
    if !range.contains("||") {
        return Ok(vec![parse_range(range)?]);
    }

    let reqs: Vec<VersionReq> = range
        .split("||")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .filter_map(|alt| parse_range(alt).ok())
        .collect();

    if reqs.is_empty() {
        return Err(PkgError::spec_invalid(format!(
            "Invalid version range '{range}': no valid alternatives"
        )));
    }

    Ok(reqs)
}

/// Parse a single version range, handling npm-specific syntax.
///
/// Handles:
/// - Standard semver ranges: ^1.0.0, ~1.0.0, >=1.0.0, etc.
/// - Hyphen ranges: 1.0.0 - 2.0.0
/// - X-ranges: 1.x, 1.0.x, *
/// - Space-separated comparators: >= 2.1.2 < 3.0.0
fn parse_range(range: &str) -> Result<VersionReq, PkgError> {
    let range = range.trim();
    let invalid = |e: semver::Error| {
        PkgError::spec_invalid(format!("Invalid version range '{range}': {e}"))
    };

    if let Some((start, end)) = range.split_once(" - ") {
        let (start, end) = (start.trim(), end.trim());
        if !start.is_empty() && !end.is_empty() {
            return VersionReq::parse(&format!(">={start}, <={end}")).map_err(invalid);
        }
    }

    if range == "*" || range.ends_with(".x") || range.ends_with(".X") || range.ends_with(".*") {
        return VersionReq::parse(&convert_x_range(range)).map_err(invalid);
    }

    VersionReq::parse(&convert_space_separated_comparators(range)).map_err(invalid)
}

/// Convert space-separated comparators to comma-separated.
///
/// npm allows `>= 2.1.2 < 3.0.0`; the semver crate wants `>=2.1.2, <3.0.0`.
fn convert_space_separated_comparators(range: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            comparators.push(format!("{pending_op}{token}"));
            pending_op.clear();
        } else {
            pending_op.push_str(token);
        }
    }

    if comparators.is_empty() {
        return range.to_string();
    }
    comparators.join(", ")
}

/// Convert x-range to semver range.
fn convert_x_range(range: &str) -> String {
    let parts: Vec<&str> = range.split('.').collect();

    match parts.as_slice() {
        ["*" | "x" | "X"] => return ">=0.0.0".to_string(),
        [major, "x" | "X" | "*"] => {
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor, "x" | "X" | "*"] => {
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    range.replace(['x', 'X'], "0")
}

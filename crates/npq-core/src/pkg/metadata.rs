//! Typed registry metadata (packument) model.
//!
//! Only the fields read by the pipeline and the built-in checks are
//! modeled; everything else in the registry document is ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Registry document for one package name.
///
/// Fields with an unexpected shape are dropped rather than failing the
/// whole document; old versions in particular carry all sorts of values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub name: String,
    #[serde(rename = "dist-tags", default, deserialize_with = "string_map")]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "records")]
    pub versions: BTreeMap<String, VersionRecord>,
    /// Publish timestamps keyed by version, plus `created` and `modified`.
    /// Unpublished packages carry an object under `unpublished`.
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub time: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, deserialize_with = "people", skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Person>,
}

/// Manifest of one published version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub version: String,
    /// Deprecation message. Some old documents use a boolean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub bin: Option<BinField>,
    #[serde(default, deserialize_with = "people", skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Person>,
    #[serde(
        rename = "_npmUser",
        default,
        deserialize_with = "person",
        skip_serializing_if = "Option::is_none"
    )]
    pub npm_user: Option<Person>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<serde_json::Value>,
}

impl VersionRecord {
    /// Deprecation reason, if this version is deprecated.
    #[must_use]
    pub fn deprecation(&self) -> Option<&str> {
        match self.deprecated.as_ref()? {
            serde_json::Value::String(reason) if !reason.is_empty() => Some(reason.as_str()),
            serde_json::Value::Bool(true) => Some("deprecated"),
            _ => None,
        }
    }
}

/// The `bin` field: either a single path or a command map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinField {
    Path(String),
    Map(BTreeMap<String, String>),
}

impl BinField {
    /// Normalize to a command map. A bare path is keyed by the package name.
    #[must_use]
    pub fn commands(&self, package_name: &str) -> BTreeMap<String, String> {
        match self {
            Self::Path(path) => BTreeMap::from([(package_name.to_string(), path.clone())]),
            Self::Map(map) => map.clone(),
        }
    }
}

/// A maintainer, author or publishing user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub email: String,
}

impl Person {
    /// Parse the legacy `"Name <email> (url)"` string form.
    fn from_legacy(raw: &str) -> Self {
        let email = raw
            .split_once('<')
            .and_then(|(_, rest)| rest.split_once('>'))
            .map(|(email, _)| email.trim().to_string())
            .unwrap_or_default();
        let name = raw.split('<').next().unwrap_or_default().trim().to_string();
        Self { name, email }
    }

    fn from_value(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::from_legacy(&s)),
            serde_json::Value::Object(_) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }
}

/// Accept maintainers as objects or legacy strings, skipping anything else.
fn people<'de, D>(deserializer: D) -> Result<Vec<Person>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(items)) => items,
        _ => Vec::new(),
    };
    Ok(raw.into_iter().filter_map(Person::from_value).collect())
}

/// A single person as an object or legacy string.
fn person<'de, D>(deserializer: D) -> Result<Option<Person>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<serde_json::Value>::deserialize(deserializer)?.and_then(Person::from_value))
}

/// Keep the value when it has the expected shape, drop it otherwise.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(Option::<serde_json::Value>::deserialize(deserializer)?
        .and_then(|value| serde_json::from_value(value).ok()))
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// A string-to-string map; entries with other values are skipped.
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(serde_json::Value::Object(entries)) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) => Some((key, s)),
            _ => None,
        })
        .collect())
}

/// Version records; anything that is not an object is skipped.
fn records<'de, D>(deserializer: D) -> Result<BTreeMap<String, VersionRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(serde_json::Value::Object(entries)) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| {
            if !value.is_object() {
                return None;
            }
            serde_json::from_value(value).ok().map(|record| (key, record))
        })
        .collect())
}

/// The `repository` field: a bare URL or `{ type, url }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Repository {
    Url(String),
    Detailed {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
}

impl Repository {
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url.as_str()),
            Self::Detailed { url, .. } => url.as_deref(),
        }
        .filter(|url| !url.is_empty())
    }
}

impl PackageMetadata {
    /// Version pointed to by a dist-tag.
    #[must_use]
    pub fn dist_tag(&self, tag: &str) -> Option<&str> {
        self.dist_tags.get(tag).map(String::as_str)
    }

    /// Version pointed to by `latest`.
    #[must_use]
    pub fn latest_version(&self) -> Option<&str> {
        self.dist_tag("latest")
    }

    /// Manifest of one version.
    #[must_use]
    pub fn version(&self, version: &str) -> Option<&VersionRecord> {
        self.versions.get(version)
    }

    /// Manifest of the `latest` version.
    #[must_use]
    pub fn latest(&self) -> Option<&VersionRecord> {
        self.latest_version().and_then(|v| self.version(v))
    }

    /// All version keys as published.
    pub fn version_keys(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    /// Publish timestamp of a version (or `created`/`modified`).
    #[must_use]
    pub fn published_at(&self, key: &str) -> Option<&str> {
        self.time.get(key).and_then(serde_json::Value::as_str)
    }
}

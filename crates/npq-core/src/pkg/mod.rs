//! Registry-facing package layer.
//!
//! Provides utilities for:
//! - Parsing install requests (name@spec)
//! - Fetching package metadata and download counts from the npm registry
//! - Memoizing metadata for one run, one fetch per name
//! - Resolving version specifiers using semver

pub mod cache;
pub mod error;
pub mod metadata;
pub mod registry;
pub mod spec;
pub mod version;

pub use cache::{Lookup, MetadataCache};
pub use error::{codes as pkg_codes, PkgError};
pub use metadata::{BinField, PackageMetadata, Person, Repository, VersionRecord};
pub use registry::{
    encode_name, MetadataSource, RegistryClient, DEFAULT_REGISTRY, DEFAULT_REGISTRY_API,
    REGISTRY_API_ENV, REGISTRY_ENV,
};
pub use spec::{PackageRequest, DEFAULT_VERSION_SPEC};
pub use version::{max_satisfying, resolve_in, VersionResolver};

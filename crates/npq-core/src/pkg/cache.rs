//! Per-run package metadata cache.
//!
//! The first request for a name starts the registry fetch and stores the
//! in-flight future; every later request for that name, concurrent or not,
//! awaits the same future. A name is therefore fetched at most once per
//! run, and failures are remembered just like successes.

use super::error::PkgError;
use super::metadata::PackageMetadata;
use super::registry::MetadataSource;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Result of looking up a package name in the registry.
#[derive(Debug, Clone)]
pub enum Lookup {
    Found(Arc<PackageMetadata>),
    /// The registry reported the package as absent.
    NotFound,
}

impl Lookup {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Lookup, PkgError>>>;

/// Memoizes registry metadata for the lifetime of one pipeline run.
pub struct MetadataCache {
    source: Arc<dyn MetadataSource>,
    entries: Mutex<HashMap<String, SharedFetch>>,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.entries.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("MetadataCache").field("entries", &len).finish()
    }
}

impl MetadataCache {
    #[must_use]
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a package, fetching it on first use.
    ///
    /// # Errors
    /// Returns the transport error of the (single) fetch for this name.
    pub async fn get_info(&self, name: &str) -> Result<Lookup, PkgError> {
        let fetch = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = entries.get(name) {
                debug!(package = name, "metadata cache hit");
                existing.clone()
            } else {
                debug!(package = name, "metadata cache miss, fetching");
                let fetch = self.start_fetch(name);
                entries.insert(name.to_string(), fetch.clone());
                fetch
            }
        };

        fetch.await
    }

    /// Look up a package that is expected to exist.
    ///
    /// # Errors
    /// Returns `PKG_NOT_FOUND` when the registry has no such package, or the
    /// transport error of the fetch.
    pub async fn get_metadata(&self, name: &str) -> Result<Arc<PackageMetadata>, PkgError> {
        match self.get_info(name).await? {
            Lookup::Found(metadata) => Ok(metadata),
            Lookup::NotFound => Err(PkgError::not_found(name)),
        }
    }

    /// Last-month download count. Not memoized: only one check asks for it.
    pub async fn get_downloads(&self, name: &str) -> Result<u64, PkgError> {
        self.source.fetch_downloads(name).await
    }

    /// Number of distinct names requested so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start_fetch(&self, name: &str) -> SharedFetch {
        let source = Arc::clone(&self.source);
        let name = name.to_string();
        async move {
            let lookup = match source.fetch_metadata(&name).await? {
                Some(metadata) => Lookup::Found(Arc::new(metadata)),
                None => Lookup::NotFound,
            };
            Ok(lookup)
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl MetadataSource for SlowSource {
        async fn fetch_metadata(&self, name: &str) -> Result<Option<PackageMetadata>, PkgError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            match name {
                "missing" => Ok(None),
                "broken" => Err(PkgError::registry("connection reset")),
                _ => Ok(Some(PackageMetadata {
                    name: name.to_string(),
                    ..PackageMetadata::default()
                })),
            }
        }

        async fn fetch_downloads(&self, _name: &str) -> Result<u64, PkgError> {
            Ok(0)
        }
    }

    fn cache() -> (Arc<SlowSource>, MetadataCache) {
        let source = Arc::new(SlowSource {
            fetches: AtomicUsize::new(0),
        });
        let cache = MetadataCache::new(source.clone());
        (source, cache)
    }

    #[tokio::test]
    async fn test_sequential_calls_fetch_once() {
        let (source, cache) = cache();
        let first = cache.get_metadata("express").await.unwrap();
        let second = cache.get_metadata("express").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_coalesce() {
        let (source, cache) = cache();
        let calls = (0..10).map(|_| cache.get_info("express"));
        let results = futures::future::join_all(calls).await;
        assert!(results.iter().all(|r| matches!(r, Ok(Lookup::Found(_)))));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_memoized() {
        let (source, cache) = cache();
        assert!(!cache.get_info("missing").await.unwrap().is_found());
        let err = cache.get_metadata("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates_without_refetch() {
        let (source, cache) = cache();
        assert!(cache.get_info("broken").await.is_err());
        assert!(cache.get_info("broken").await.is_err());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_names_fetch_separately() {
        let (source, cache) = cache();
        let _ = cache.get_info("a").await;
        let _ = cache.get_info("b").await;
        assert_eq!(cache.len(), 2);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }
}

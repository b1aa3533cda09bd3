//! Check discovery and instantiation.

use super::{Check, SharedDeps};
use crate::checks;
use crate::error::Error;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Builds one check instance from the shared run dependencies.
pub type CheckFactory = Arc<dyn Fn(&SharedDeps) -> Arc<dyn Check> + Send + Sync>;

/// A discoverable check: its name and how to construct it.
#[derive(Clone)]
pub struct CheckRef {
    pub name: &'static str,
    pub factory: CheckFactory,
}

impl CheckRef {
    pub fn new<F>(name: &'static str, factory: F) -> Self
    where
        F: Fn(&SharedDeps) -> Arc<dyn Check> + Send + Sync + 'static,
    {
        Self {
            name,
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for CheckRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRef").field("name", &self.name).finish_non_exhaustive()
    }
}

/// The set of checks a pipeline may run.
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    refs: Vec<CheckRef>,
}

impl CheckRegistry {
    /// Registry over an explicit list of checks.
    #[must_use]
    pub fn new(refs: Vec<CheckRef>) -> Self {
        Self { refs }
    }

    /// Registry with every built-in check.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(checks::builtin())
    }

    /// Add one more check.
    #[must_use]
    pub fn with_check(mut self, check: CheckRef) -> Self {
        self.refs.push(check);
        self
    }

    /// Drop the check called `name`, if registered.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.refs.retain(|r| r.name != name);
        self
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.refs.iter().map(|r| r.name)
    }

    /// Enumerate the available checks.
    ///
    /// Fails when there are none, or when two share a name.
    pub fn discover(&self) -> Result<Vec<CheckRef>, Error> {
        if self.refs.is_empty() {
            return Err(Error::NoChecks);
        }

        let mut seen = HashSet::new();
        for r in &self.refs {
            if !seen.insert(r.name) {
                return Err(Error::DuplicateCheck(r.name.to_string()));
            }
        }

        Ok(self.refs.clone())
    }

    /// Instantiate every discovered check with the run's dependencies.
    ///
    /// Fails when a factory builds a check whose name differs from the one
    /// it was registered under.
    pub fn build(refs: &[CheckRef], deps: &SharedDeps) -> Result<Vec<Arc<dyn Check>>, Error> {
        refs.iter()
            .map(|r| {
                let check = (r.factory)(deps);
                if check.name() == r.name {
                    Ok(check)
                } else {
                    Err(Error::MalformedCheck {
                        registered: r.name.to_string(),
                        built: check.name().to_string(),
                    })
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{Category, CheckFailure};
    use crate::config::Config;
    use crate::pkg::{MetadataCache, MetadataSource, PackageMetadata, PackageRequest, PkgError};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Check for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn category(&self) -> Category {
            Category::PackageHealth
        }

        fn title(&self) -> &'static str {
            "Named probe"
        }

        async fn validate(&self, _pkg: &PackageRequest) -> Result<serde_json::Value, CheckFailure> {
            Ok(serde_json::Value::Null)
        }
    }

    struct Empty;

    #[async_trait]
    impl MetadataSource for Empty {
        async fn fetch_metadata(&self, _name: &str) -> Result<Option<PackageMetadata>, PkgError> {
            Ok(None)
        }

        async fn fetch_downloads(&self, _name: &str) -> Result<u64, PkgError> {
            Ok(0)
        }
    }

    fn deps() -> SharedDeps {
        SharedDeps::new(
            Arc::new(MetadataCache::new(Arc::new(Empty))),
            reqwest::Client::new(),
            Arc::new(Config::default()),
        )
    }

    fn named(name: &'static str) -> CheckRef {
        CheckRef::new(name, move |_| Arc::new(Named(name)))
    }

    #[test]
    fn test_empty_registry_is_fatal() {
        let err = CheckRegistry::default().discover().unwrap_err();
        assert!(matches!(err, Error::NoChecks));
    }

    #[test]
    fn test_duplicate_names_are_fatal() {
        let registry = CheckRegistry::new(vec![named("a"), named("b"), named("a")]);
        let err = registry.discover().unwrap_err();
        assert!(matches!(err, Error::DuplicateCheck(name) if name == "a"));
    }

    #[test]
    fn test_build_instantiates_in_order() {
        let registry = CheckRegistry::new(vec![named("a")]).with_check(named("b"));
        let refs = registry.discover().unwrap();
        let checks = CheckRegistry::build(&refs, &deps()).unwrap();
        let names: Vec<_> = checks.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_build_rejects_mismatched_factory() {
        let refs = vec![CheckRef::new("expected", |_| Arc::new(Named("other")))];
        let err = CheckRegistry::build(&refs, &deps()).err().unwrap();
        assert!(matches!(err, Error::MalformedCheck { .. }));
    }

    #[test]
    fn test_builtin_set() {
        let registry = CheckRegistry::builtin();
        let refs = registry.discover().unwrap();
        assert_eq!(refs.len(), 12);
        assert!(registry.names().any(|n| n == "vulnerabilities"));
        assert_eq!(registry.without("vulnerabilities").names().count(), 11);
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use log::{debug, warn};
use pyx_pep440::Version;
use tokio::time::{sleep, timeout};

use super::{AvailableVersion, MetadataProvider, PackageMetadata, ProviderError};
use crate::config::ResolverConfig;
use crate::requirement::PackageName;
use crate::{Error, Result};

type Outcome<T> = std::result::Result<Arc<T>, ProviderError>;

/// Metadata fetched during one resolution run.
///
/// Keyed by name for version lists and by (name, version) for package
/// metadata. Terminal failures are cached as well so a missing package is
/// asked for once. A cache belongs to exactly one run and is dropped with it.
#[derive(Debug, Default)]
pub struct MetadataCache {
    versions: HashMap<PackageName, Outcome<Vec<AvailableVersion>>>,
    metadata: HashMap<(PackageName, Version), Outcome<PackageMetadata>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn versions(&self, name: &PackageName) -> Option<&Outcome<Vec<AvailableVersion>>> {
        self.versions.get(name)
    }

    pub fn metadata(&self, name: &PackageName, version: &Version) -> Option<&Outcome<PackageMetadata>> {
        self.metadata.get(&(name.clone(), version.clone()))
    }

    pub fn contains_versions(&self, name: &PackageName) -> bool {
        self.versions.contains_key(name)
    }

    /// Number of cached entries of both kinds
    pub fn len(&self) -> usize {
        self.versions.len() + self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_versions(
        &mut self,
        name: PackageName,
        outcome: std::result::Result<Vec<AvailableVersion>, ProviderError>,
    ) -> Outcome<Vec<AvailableVersion>> {
        let outcome = outcome.map(Arc::new);
        self.versions.insert(name, outcome.clone());
        outcome
    }

    fn store_versions(
        &mut self,
        name: PackageName,
        outcome: std::result::Result<Vec<AvailableVersion>, ProviderError>,
    ) {
        self.versions.insert(name, outcome.map(Arc::new));
    }

    fn insert_metadata(
        &mut self,
        name: PackageName,
        version: Version,
        outcome: std::result::Result<PackageMetadata, ProviderError>,
    ) -> Outcome<PackageMetadata> {
        let outcome = outcome.map(Arc::new);
        self.metadata.insert((name, version), outcome.clone());
        outcome
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
    timeout: Duration,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }

    fn into_error(self, err: ProviderError) -> Error {
        match err {
            ProviderError::NotFound(name) => Error::NotFound(name),
            ProviderError::Transient { name, message } => Error::Transient {
                name,
                attempts: self.max_retries + 1,
                message,
            },
        }
    }
}

/// Run `fetch` under the timeout, retrying transient failures with
/// exponential backoff until the retry bound is spent.
async fn fetch_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    name: &PackageName,
    mut fetch: F,
) -> std::result::Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match timeout(policy.timeout, fetch()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Transient {
                name: name.to_string(),
                message: format!("timed out after {}ms", policy.timeout.as_millis()),
            }),
        };

        match outcome {
            Err(ProviderError::Transient { message, .. }) if attempt <= policy.max_retries => {
                let delay = policy.delay(attempt);
                warn!(
                    "Metadata lookup for {} failed ({}), retry {}/{} in {}ms",
                    name,
                    message,
                    attempt,
                    policy.max_retries,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// A provider bound to one resolution run.
///
/// Owns the run's [`MetadataCache`]; every lookup goes through the cache
/// first and through timeout and retry handling on a miss.
pub struct ProviderSession<'a> {
    provider: &'a dyn MetadataProvider,
    cache: MetadataCache,
    policy: RetryPolicy,
    concurrency: usize,
}

impl<'a> ProviderSession<'a> {
    pub fn new(provider: &'a dyn MetadataProvider, config: &ResolverConfig) -> Self {
        Self {
            provider,
            cache: MetadataCache::new(),
            policy: RetryPolicy {
                max_retries: config.max_retries,
                backoff: config.retry_backoff(),
                timeout: config.fetch_timeout(),
            },
            concurrency: config.prefetch_concurrency.max(1),
        }
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Versions of `name` in source order
    pub async fn versions(&mut self, name: &PackageName) -> Result<Arc<Vec<AvailableVersion>>> {
        let outcome = match self.cache.versions(name) {
            Some(outcome) => outcome.clone(),
            None => {
                let provider = self.provider;
                let fetched = fetch_with_retry(self.policy, name, || provider.list_versions(name)).await;
                self.cache.insert_versions(name.clone(), fetched)
            }
        };
        outcome.map_err(|err| self.policy.into_error(err))
    }

    /// Requirements, extras and hashes of one version
    pub async fn metadata(&mut self, name: &PackageName, version: &Version) -> Result<Arc<PackageMetadata>> {
        let outcome = match self.cache.metadata(name, version) {
            Some(outcome) => outcome.clone(),
            None => {
                let provider = self.provider;
                let fetched =
                    fetch_with_retry(self.policy, name, || provider.get_requirements(name, version)).await;
                self.cache.insert_metadata(name.clone(), version.clone(), fetched)
            }
        };
        outcome.map_err(|err| self.policy.into_error(err))
    }

    /// Fetch version lists for every uncached name concurrently.
    ///
    /// Results are merged in the order of `names`, failures included, so
    /// later lookups observe exactly what a sequential fetch would have.
    pub async fn prefetch_versions(&mut self, names: &[PackageName]) {
        let mut missing: Vec<PackageName> = names
            .iter()
            .filter(|name| !self.cache.contains_versions(name))
            .cloned()
            .collect();
        missing.dedup();

        if missing.is_empty() {
            return;
        }

        debug!("Prefetching versions for {} packages", missing.len());

        let provider = self.provider;
        let policy = self.policy;
        let fetched: Vec<_> = stream::iter(missing)
            .map(|name| async move {
                let outcome = fetch_with_retry(policy, &name, || provider.list_versions(&name)).await;
                (name, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (name, outcome) in fetched {
            self.cache.store_versions(name, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }

    fn fast_config(max_retries: u32) -> ResolverConfig {
        ResolverConfig {
            max_retries,
            retry_backoff_ms: 1,
            fetch_timeout_ms: 50,
            ..ResolverConfig::default()
        }
    }

    /// Fails with a transient error a fixed number of times before delegating
    struct Flaky {
        inner: InMemoryProvider,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetadataProvider for Flaky {
        async fn list_versions(&self, name: &PackageName) -> std::result::Result<Vec<AvailableVersion>, ProviderError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(ProviderError::Transient {
                    name: name.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            self.inner.list_versions(name).await
        }

        async fn get_requirements(
            &self,
            name: &PackageName,
            version: &Version,
        ) -> std::result::Result<PackageMetadata, ProviderError> {
            self.inner.get_requirements(name, version).await
        }
    }

    /// Never answers in time
    struct Stalled;

    #[async_trait]
    impl MetadataProvider for Stalled {
        async fn list_versions(&self, _name: &PackageName) -> std::result::Result<Vec<AvailableVersion>, ProviderError> {
            sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        async fn get_requirements(
            &self,
            name: &PackageName,
            _version: &Version,
        ) -> std::result::Result<PackageMetadata, ProviderError> {
            Err(ProviderError::NotFound(name.to_string()))
        }
    }

    fn index() -> InMemoryProvider {
        InMemoryProvider::builder()
            .release("a", "1.0", &[])
            .release("a", "2.0", &["b>=1"])
            .release("b", "1.0", &[])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_versions_are_cached() {
        let provider = Flaky {
            inner: index(),
            failures: 0,
            calls: AtomicUsize::new(0),
        };
        let config = fast_config(0);
        let mut session = ProviderSession::new(&provider, &config);

        let first = session.versions(&name("a")).await.unwrap();
        let second = session.versions(&name("A")).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_cache() {
        let provider = Flaky {
            inner: index(),
            failures: 0,
            calls: AtomicUsize::new(0),
        };
        let config = fast_config(0);

        for _ in 0..2 {
            let mut session = ProviderSession::new(&provider, &config);
            session.versions(&name("a")).await.unwrap();
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let _ = env_logger::builder().is_test(true).try_init();
        let provider = Flaky {
            inner: index(),
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let config = fast_config(3);
        let mut session = ProviderSession::new(&provider, &config);

        let versions = session.versions(&name("b")).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_bound_is_respected() {
        let provider = Flaky {
            inner: index(),
            failures: 10,
            calls: AtomicUsize::new(0),
        };
        let config = fast_config(2);
        let mut session = ProviderSession::new(&provider, &config);

        let err = session.versions(&name("a")).await.unwrap_err();
        assert!(matches!(err, Error::Transient { attempts: 3, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let config = fast_config(1);
        let mut session = ProviderSession::new(&Stalled, &config);

        let err = session.versions(&name("a")).await.unwrap_err();
        match err {
            Error::Transient { message, attempts, .. } => {
                assert_eq!(attempts, 2);
                assert!(message.contains("timed out"));
            }
            other => panic!("expected a transient error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_cached() {
        let provider = Flaky {
            inner: index(),
            failures: 0,
            calls: AtomicUsize::new(0),
        };
        let config = fast_config(3);
        let mut session = ProviderSession::new(&provider, &config);

        assert!(matches!(session.versions(&name("zzz")).await, Err(Error::NotFound(_))));
        assert!(matches!(session.versions(&name("zzz")).await, Err(Error::NotFound(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prefetch_fills_cache() {
        let provider = index();
        let config = fast_config(0);
        let mut session = ProviderSession::new(&provider, &config);

        session.prefetch_versions(&[name("a"), name("b"), name("missing")]).await;
        assert!(session.cache().contains_versions(&name("a")));
        assert!(session.cache().contains_versions(&name("b")));
        assert!(matches!(
            session.cache().versions(&name("missing")),
            Some(Err(ProviderError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_prefetched_versions_are_reused() {
        let provider = Flaky {
            inner: index(),
            failures: 0,
            calls: AtomicUsize::new(0),
        };
        let config = fast_config(0);
        let mut session = ProviderSession::new(&provider, &config);

        session.prefetch_versions(&[name("a"), name("b")]).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        assert_eq!(session.versions(&name("a")).await.unwrap().len(), 2);
        assert_eq!(session.versions(&name("b")).await.unwrap().len(), 1);
        session.prefetch_versions(&[name("a")]).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_metadata_lookup() {
        let provider = index();
        let config = fast_config(0);
        let mut session = ProviderSession::new(&provider, &config);

        let version: Version = "2.0".parse().unwrap();
        let metadata = session.metadata(&name("a"), &version).await.unwrap();
        assert_eq!(metadata.requires.len(), 1);
        assert!(session.cache().metadata(&name("a"), &version).is_some());

        let missing: Version = "3.0".parse().unwrap();
        assert!(matches!(session.metadata(&name("a"), &missing).await, Err(Error::NotFound(_))));
    }
}

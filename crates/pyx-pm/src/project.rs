use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::ResolverConfig;
use crate::lock::LockDocument;
use crate::provider::MetadataProvider;
use crate::requirement::{MarkerEnvironment, Requirement};
use crate::solver::{CancellationToken, Request, Resolver, Upgrade};
use crate::Result;

/// A set of declared requirements bound to a lock file.
///
/// This is the entry point for locking: it reads the previous lock, feeds
/// its versions to the resolver as preferences and replaces the file only
/// when resolution succeeds.
#[derive(Debug, Clone)]
pub struct Project {
    lock_path: PathBuf,
    requirements: Vec<Requirement>,
    environment: MarkerEnvironment,
    config: ResolverConfig,
    upgrade: Upgrade,
}

impl Project {
    /// Create a project from requirement strings
    pub fn new(
        lock_path: impl Into<PathBuf>,
        requirements: &[&str],
        environment: MarkerEnvironment,
        config: ResolverConfig,
    ) -> Result<Self> {
        let requirements = requirements
            .iter()
            .map(|requirement| Requirement::parse(requirement))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            lock_path: lock_path.into(),
            requirements,
            environment,
            config,
            upgrade: Upgrade::None,
        })
    }

    /// Which locked packages may move to newer versions
    pub fn with_upgrade(mut self, upgrade: Upgrade) -> Self {
        self.upgrade = upgrade;
        self
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The current lock, if one exists. A corrupt lock is an error, never
    /// silently replaced.
    pub fn load_lock(&self) -> Result<Option<LockDocument>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }
        LockDocument::read_from(&self.lock_path).map(Some)
    }

    /// Whether the lock exists and was resolved from the current requirements
    pub fn is_lock_current(&self) -> Result<bool> {
        Ok(self
            .load_lock()?
            .is_some_and(|lock| lock.is_up_to_date(&self.requirements)))
    }

    /// Resolve, preferring the versions of the existing lock, and write
    /// the new lock. Nothing is written when resolution fails.
    pub async fn lock(&self, provider: &dyn MetadataProvider, cancel: &CancellationToken) -> Result<LockDocument> {
        let pins = match self.load_lock()? {
            Some(previous) => {
                debug!("Using {} locked versions as preferences", previous.entries.len());
                previous.pins()
            }
            None => Default::default(),
        };
        self.resolve_and_write(provider, cancel, self.request().with_pins(pins))
            .await
    }

    /// Resolve from scratch, ignoring the existing lock, and write the result
    pub async fn lock_fresh(
        &self,
        provider: &dyn MetadataProvider,
        cancel: &CancellationToken,
    ) -> Result<LockDocument> {
        self.resolve_and_write(provider, cancel, self.request()).await
    }

    fn request(&self) -> Request {
        self.requirements
            .iter()
            .cloned()
            .fold(Request::new(self.environment.clone()), Request::require)
            .upgrade(self.upgrade.clone())
    }

    async fn resolve_and_write(
        &self,
        provider: &dyn MetadataProvider,
        cancel: &CancellationToken,
        request: Request,
    ) -> Result<LockDocument> {
        let graph = Resolver::new(provider, self.config.clone())
            .resolve_with(&request, cancel)
            .await?;

        let document = LockDocument::from_graph(&graph, &self.requirements);
        document.write_to(&self.lock_path)?;
        info!("Locked {} packages to {}", document.entries.len(), self.lock_path.display());
        Ok(document)
    }
}

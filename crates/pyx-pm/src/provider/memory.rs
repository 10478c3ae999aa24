use std::collections::BTreeSet;

use async_trait::async_trait;
use indexmap::IndexMap;
use pyx_pep440::Version;
use serde::{Deserialize, Serialize};

use super::{AvailableVersion, MetadataProvider, PackageMetadata, ProviderError};
use crate::hash::ArtifactHash;
use crate::requirement::{normalize_name, PackageName, Requirement};
use crate::Result;

/// Source identity used when a release does not name one
pub const DEFAULT_SOURCE: &str = "pypi";

#[derive(Debug, Clone)]
struct Release {
    version: Version,
    source: String,
    metadata: PackageMetadata,
}

/// A release as written in a fixture or passed to the builder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawRelease {
    version: String,
    source: Option<String>,
    requires: Vec<String>,
    extras: Vec<String>,
    hashes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    packages: IndexMap<String, Vec<RawRelease>>,
}

/// A package index snapshot held in memory.
///
/// Releases keep insertion order, which is the source order reported by
/// [`MetadataProvider::list_versions`].
///
/// ```
/// use pyx_pm::provider::InMemoryProvider;
///
/// let index = InMemoryProvider::builder()
///     .release("requests", "2.31.0", &["urllib3>=1.21", "PySocks; extra == 'socks'"])
///     .release("urllib3", "2.0.7", &[])
///     .build()
///     .unwrap();
/// assert_eq!(index.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    packages: IndexMap<PackageName, Vec<Release>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryProviderBuilder {
        InMemoryProviderBuilder::new()
    }

    /// Load an index from a JSON fixture.
    ///
    /// ```json
    /// {"packages": {"a": [{"version": "1.0", "requires": ["b>=1"], "hashes": ["sha256:..."]}]}}
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let fixture: Fixture = serde_json::from_str(json)?;
        let mut provider = Self::new();
        for (name, releases) in fixture.packages {
            for raw in releases {
                provider.add_raw(&name, raw)?;
            }
        }
        Ok(provider)
    }

    /// Add one release
    pub fn add_release(
        &mut self,
        name: PackageName,
        version: Version,
        source: impl Into<String>,
        metadata: PackageMetadata,
    ) {
        self.packages.entry(name).or_default().push(Release {
            version,
            source: source.into(),
            metadata,
        });
    }

    fn add_raw(&mut self, name: &str, raw: RawRelease) -> Result<()> {
        let name = PackageName::new(name)?;
        let version: Version = raw.version.parse().map_err(crate::requirement::ParseError::from)?;

        let requires = raw
            .requires
            .iter()
            .map(|requirement| Requirement::parse(requirement))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // extras referenced by markers are declared implicitly
        let mut extras: BTreeSet<String> = raw.extras.iter().map(|extra| normalize_name(extra)).collect();
        for requirement in &requires {
            if let Some(marker) = &requirement.marker {
                extras.extend(marker.extra_names());
            }
        }

        let mut hashes = raw
            .hashes
            .iter()
            .map(|hash| ArtifactHash::parse(hash))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        hashes.sort();
        hashes.dedup();

        let source = raw.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        self.add_release(name, version, source, PackageMetadata { requires, extras, hashes });
        Ok(())
    }

    /// Number of distinct package names
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.packages.keys()
    }
}

#[async_trait]
impl MetadataProvider for InMemoryProvider {
    async fn list_versions(&self, name: &PackageName) -> std::result::Result<Vec<AvailableVersion>, ProviderError> {
        let releases = self
            .packages
            .get(name)
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))?;

        Ok(releases
            .iter()
            .map(|release| AvailableVersion {
                version: release.version.clone(),
                source: release.source.clone(),
            })
            .collect())
    }

    async fn get_requirements(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> std::result::Result<PackageMetadata, ProviderError> {
        self.packages
            .get(name)
            .and_then(|releases| releases.iter().find(|release| &release.version == version))
            .map(|release| release.metadata.clone())
            .ok_or_else(|| ProviderError::NotFound(format!("{}=={}", name, version)))
    }
}

/// Builder for [`InMemoryProvider`].
///
/// Entries are validated together in [`InMemoryProviderBuilder::build`].
#[derive(Debug, Default)]
pub struct InMemoryProviderBuilder {
    releases: Vec<(String, RawRelease)>,
}

impl InMemoryProviderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a release from the default source
    pub fn release(self, name: &str, version: &str, requires: &[&str]) -> Self {
        self.push(name, version, None, requires)
    }

    /// Add a release from a named source
    pub fn release_from(self, source: &str, name: &str, version: &str, requires: &[&str]) -> Self {
        self.push(name, version, Some(source), requires)
    }

    /// Declare extras on the most recently added release
    pub fn extras(mut self, extras: &[&str]) -> Self {
        if let Some((_, raw)) = self.releases.last_mut() {
            raw.extras.extend(extras.iter().map(|extra| extra.to_string()));
        }
        self
    }

    /// Attach artifact hashes (`algorithm:digest`) to the most recently added release
    pub fn hashes(mut self, hashes: &[&str]) -> Self {
        if let Some((_, raw)) = self.releases.last_mut() {
            raw.hashes.extend(hashes.iter().map(|hash| hash.to_string()));
        }
        self
    }

    fn push(mut self, name: &str, version: &str, source: Option<&str>, requires: &[&str]) -> Self {
        self.releases.push((
            name.to_string(),
            RawRelease {
                version: version.to_string(),
                source: source.map(str::to_string),
                requires: requires.iter().map(|requirement| requirement.to_string()).collect(),
                ..RawRelease::default()
            },
        ));
        self
    }

    pub fn build(self) -> Result<InMemoryProvider> {
        let mut provider = InMemoryProvider::new();
        for (name, raw) in self.releases {
            provider.add_raw(&name, raw)?;
        }
        Ok(provider)
    }
}

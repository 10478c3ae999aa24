//! Package metadata access.
//!
//! The resolver never talks to an index directly. It consumes the
//! [`MetadataProvider`] contract through a [`ProviderSession`], which owns
//! the per-run [`MetadataCache`] and applies timeouts and retries.

mod cache;
mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use pyx_pep440::Version;
use thiserror::Error;

use crate::hash::ArtifactHash;
use crate::requirement::{PackageName, Requirement};

pub use cache::{MetadataCache, ProviderSession};
pub use memory::{InMemoryProvider, InMemoryProviderBuilder};

/// Failure reported by a metadata provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The name (or the version of it) does not exist in the index
    #[error("Package \"{0}\" not found")]
    NotFound(String),
    /// A retryable lookup failure
    #[error("Metadata lookup for \"{name}\" failed: {message}")]
    Transient { name: String, message: String },
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }
}

/// A version offered by an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableVersion {
    pub version: Version,
    /// Identity of the index offering this version
    pub source: String,
}

/// Metadata of one released version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    /// Dependencies, extras' dependencies included with `extra == "..."` markers
    pub requires: Vec<Requirement>,
    /// Extras this version declares
    pub extras: BTreeSet<String>,
    /// Digests of the artifacts of this version
    pub hashes: Vec<ArtifactHash>,
}

/// Queryable package index.
///
/// `list_versions` returns versions in source order; a provider may list
/// the same version once per source.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn list_versions(&self, name: &PackageName) -> Result<Vec<AvailableVersion>, ProviderError>;

    async fn get_requirements(&self, name: &PackageName, version: &Version) -> Result<PackageMetadata, ProviderError>;
}

//! Dependency resolution and lock files for Python packages.
//!
//! Given PEP 508 requirements, a target marker environment and an optional
//! previous lock, pyx-pm selects one version per package through a
//! backtracking search over a [`provider::MetadataProvider`], records the
//! result as a [`lock::LockDocument`] and verifies artifacts against the
//! recorded hashes.
//!
//! # Modules
//!
//! - [`requirement`]: requirement and marker parsing and evaluation
//! - [`provider`]: the metadata boundary, per-run caching and retries
//! - [`solver`]: the resolver
//! - [`lock`]: lock documents and their fingerprints
//! - [`hash`] / [`integrity`]: artifact digests and verification
//! - [`project`]: requirements bound to a lock file on disk
//!
//! ```
//! use pyx_pm::provider::InMemoryProvider;
//! use pyx_pm::requirement::MarkerEnvironment;
//! use pyx_pm::solver::{CancellationToken, Request, Resolver};
//! use pyx_pm::{lock, ResolverConfig};
//!
//! # tokio_test::block_on(async {
//! let index = InMemoryProvider::builder()
//!     .release("flask", "3.0.0", &["click>=8"])
//!     .release("click", "8.1.7", &[])
//!     .build()
//!     .unwrap();
//!
//! let request = Request::parse(&["flask"], MarkerEnvironment::cpython("3.12.1")).unwrap();
//! let graph = Resolver::new(&index, ResolverConfig::default())
//!     .resolve_with(&request, &CancellationToken::new())
//!     .await
//!     .unwrap();
//!
//! let document = lock::serialize(&graph, request.requirements());
//! assert_eq!(document.entries.len(), 2);
//! # });
//! ```

pub mod config;
pub mod hash;
pub mod integrity;
pub mod lock;
pub mod project;
pub mod provider;
pub mod requirement;
pub mod solver;

mod error;

pub use config::{ResolverConfig, VerifyConfig};
pub use error::{Error, Result};
pub use hash::{ArtifactHash, HashAlgorithm};
pub use integrity::{IntegrityError, Verifier};
pub use lock::{LockDocument, LockEntry};
pub use project::Project;
pub use requirement::{MarkerEnvironment, PackageName, Requirement};
pub use solver::{ConflictReport, ResolutionGraph, Resolver};

pub use pyx_pep440::{Version, VersionSpecifiers};

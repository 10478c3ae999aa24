//! Lock documents.
//!
//! A lock records one resolution: the exact version, source, artifact
//! hashes, environment markers and activated extras of every package, plus
//! a fingerprint of the requirement set it was resolved from.
//!
//! ```json
//! {
//!   "header": {"fingerprint": "sha256:...", "schema_version": 1},
//!   "entries": [
//!     {"name": "click", "version": "8.1.7", "source": "pypi", "hashes": [{"algorithm": "sha256", "digest": "..."}]}
//!   ]
//! }
//! ```

mod document;
mod fingerprint;

pub use document::{LockDocument, LockEntry, LockHeader, SCHEMA_VERSION};
pub use fingerprint::{canonical_requirements, fingerprint};

use crate::requirement::Requirement;
use crate::solver::ResolutionGraph;
use crate::Result;

/// Build the lock document for a resolved graph
pub fn serialize(graph: &ResolutionGraph, requirements: &[Requirement]) -> LockDocument {
    LockDocument::from_graph(graph, requirements)
}

/// Parse and validate lock bytes; any problem is a [`crate::Error::Format`]
pub fn deserialize(bytes: &[u8]) -> Result<LockDocument> {
    LockDocument::from_slice(bytes)
}

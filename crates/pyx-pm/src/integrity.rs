//! Artifact integrity verification against locked hashes.
//!
//! Verification fails closed: an entry without hashes, a digest set that
//! shares no algorithm with the entry, or a mismatch is always an error.

use std::collections::BTreeSet;

use log::{debug, warn};
use thiserror::Error;

use crate::config::VerifyConfig;
use crate::hash::{ArtifactHash, HashAlgorithm};
use crate::lock::{LockDocument, LockEntry};
use crate::Result;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("{name} {version} has no recorded hashes")]
    NoHashes { name: String, version: String },

    #[error("None of the digests for {name} {version} use a recorded algorithm ({recorded})")]
    NoCommonAlgorithm {
        name: String,
        version: String,
        recorded: String,
    },

    #[error("No {algorithm} digest supplied for {name} {version}")]
    MissingAlgorithm {
        name: String,
        version: String,
        algorithm: HashAlgorithm,
    },

    #[error("Hash mismatch for {name} {version}: {actual} does not match any recorded {algorithm} digest")]
    Mismatch {
        name: String,
        version: String,
        algorithm: HashAlgorithm,
        actual: String,
    },

    #[error("{} locked packages failed verification", .0.len())]
    Document(Vec<IntegrityError>),
}

/// Checks artifact digests against lock entries.
///
/// By default one matching algorithm is enough. With
/// `require_all_algorithms` every algorithm recorded on the entry needs a
/// supplied digest, and all of them must match.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    require_all_algorithms: bool,
}

impl Verifier {
    pub fn new(config: &VerifyConfig) -> Self {
        Self {
            require_all_algorithms: config.require_all_algorithms,
        }
    }

    pub fn require_all_algorithms(mut self, require: bool) -> Self {
        self.require_all_algorithms = require;
        self
    }

    /// Verify fetched digests against an entry
    pub fn verify(&self, entry: &LockEntry, digests: &[ArtifactHash]) -> Result<()> {
        self.check(entry, digests).map_err(Into::into)
    }

    /// Boolean form of [`Verifier::verify`]
    pub fn matches(&self, entry: &LockEntry, digests: &[ArtifactHash]) -> bool {
        self.check(entry, digests).is_ok()
    }

    /// Hash artifact bytes with every algorithm the entry records and verify
    pub fn verify_bytes(&self, entry: &LockEntry, bytes: &[u8]) -> Result<()> {
        let algorithms: BTreeSet<HashAlgorithm> = entry.hashes.iter().map(|hash| hash.algorithm).collect();
        let digests: Vec<ArtifactHash> = algorithms
            .into_iter()
            .map(|algorithm| ArtifactHash::compute(algorithm, bytes))
            .collect();
        self.verify(entry, &digests)
    }

    /// Verify every entry of a lock, collecting all failures.
    ///
    /// `digests_for` supplies the digests of the fetched artifact of an
    /// entry; an empty list counts as nothing to compare against.
    pub fn verify_document<F>(&self, document: &LockDocument, mut digests_for: F) -> Result<()>
    where
        F: FnMut(&LockEntry) -> Vec<ArtifactHash>,
    {
        let failures: Vec<IntegrityError> = document
            .entries
            .iter()
            .filter_map(|entry| self.check(entry, &digests_for(entry)).err())
            .collect();

        if failures.is_empty() {
            debug!("Verified {} locked packages", document.entries.len());
            Ok(())
        } else {
            Err(IntegrityError::Document(failures).into())
        }
    }

    fn check(&self, entry: &LockEntry, digests: &[ArtifactHash]) -> std::result::Result<(), IntegrityError> {
        if entry.hashes.is_empty() {
            return Err(IntegrityError::NoHashes {
                name: entry.name.clone(),
                version: entry.version.clone(),
            });
        }

        let comparable: Vec<&ArtifactHash> = digests
            .iter()
            .filter(|digest| entry.hashes_for(digest.algorithm).next().is_some())
            .collect();
        if comparable.is_empty() {
            let recorded: BTreeSet<&str> = entry.hashes.iter().map(|hash| hash.algorithm.as_str()).collect();
            return Err(IntegrityError::NoCommonAlgorithm {
                name: entry.name.clone(),
                version: entry.version.clone(),
                recorded: recorded.into_iter().collect::<Vec<_>>().join(", "),
            });
        }

        if self.require_all_algorithms {
            let recorded: BTreeSet<HashAlgorithm> = entry.hashes.iter().map(|hash| hash.algorithm).collect();
            if let Some(algorithm) = recorded
                .into_iter()
                .find(|algorithm| !comparable.iter().any(|digest| digest.algorithm == *algorithm))
            {
                warn!("No {} digest to check {} {} against", algorithm, entry.name, entry.version);
                return Err(IntegrityError::MissingAlgorithm {
                    name: entry.name.clone(),
                    version: entry.version.clone(),
                    algorithm,
                });
            }
        }

        let mut first_mismatch = None;
        let mut matched = false;
        for digest in comparable {
            let actual = digest.digest.to_ascii_lowercase();
            if entry.hashes_for(digest.algorithm).any(|hash| hash.digest == actual) {
                matched = true;
            } else if first_mismatch.is_none() {
                first_mismatch = Some((digest.algorithm, actual));
            }
        }

        match first_mismatch {
            Some((algorithm, actual)) if self.require_all_algorithms || !matched => {
                warn!("Hash mismatch for {} {} ({})", entry.name, entry.version, algorithm);
                Err(IntegrityError::Mismatch {
                    name: entry.name.clone(),
                    version: entry.version.clone(),
                    algorithm,
                    actual,
                })
            }
            _ => Ok(()),
        }
    }
}

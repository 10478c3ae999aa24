use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use pyx_pep440::Version;

use crate::hash::ArtifactHash;
use crate::provider::{AvailableVersion, PackageMetadata};
use crate::requirement::{MarkerEnvironment, PackageName, Requirement};

/// A concrete package version under consideration.
///
/// Carries the metadata fetched for it and the extras activated on it so
/// far. Extras only ever grow while the candidate stays selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: PackageName,
    pub version: Version,
    pub source: String,
    pub extras: BTreeSet<String>,
    metadata: Arc<PackageMetadata>,
}

impl Candidate {
    pub fn new(name: PackageName, available: AvailableVersion, metadata: Arc<PackageMetadata>) -> Self {
        Self {
            name,
            version: available.version,
            source: available.source,
            extras: BTreeSet::new(),
            metadata,
        }
    }

    /// All declared dependencies, extra-gated ones included
    pub fn requires(&self) -> &[Requirement] {
        &self.metadata.requires
    }

    pub fn hashes(&self) -> &[ArtifactHash] {
        &self.metadata.hashes
    }

    /// Extras this version declares
    pub fn declared_extras(&self) -> &BTreeSet<String> {
        &self.metadata.extras
    }

    /// Dependencies applying in `env`.
    ///
    /// With no extra, the base dependencies. With an extra, only the
    /// dependencies that extra adds on top of the base set.
    pub fn requirements_for(&self, env: &MarkerEnvironment, extra: Option<&str>) -> Vec<Requirement> {
        let none = BTreeSet::new();
        match extra {
            None => self
                .requires()
                .iter()
                .filter(|requirement| requirement.evaluate_markers_with(env, &none))
                .cloned()
                .collect(),
            Some(extra) => {
                let only: BTreeSet<String> = [extra.to_string()].into_iter().collect();
                self.requires()
                    .iter()
                    .filter(|requirement| {
                        requirement.evaluate_markers_with(env, &only) && !requirement.evaluate_markers_with(env, &none)
                    })
                    .cloned()
                    .collect()
            }
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        write!(f, " {}", self.version)
    }
}

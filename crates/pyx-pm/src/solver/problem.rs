use std::collections::BTreeSet;
use std::fmt;

use pyx_pep440::Version;

use super::graph::Requirer;
use crate::requirement::{PackageName, Requirement};

/// A requirement taking part in a conflict, with who asked for it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConflictingRequirement {
    pub requirer: Requirer,
    pub requirement: Requirement,
}

/// A selection that was in place when the conflict was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub name: PackageName,
    pub version: Version,
}

/// Why resolution failed.
///
/// Holds the requirements that jointly cannot be satisfied, the names the
/// index did not know, and the chain of selections that led there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    pub requirements: Vec<ConflictingRequirement>,
    pub missing: Vec<PackageName>,
    pub chain: Vec<ChainLink>,
}

impl ConflictReport {
    /// Every package named by the report: requirers, targets and missing names
    pub fn packages(&self) -> BTreeSet<PackageName> {
        let mut names: BTreeSet<PackageName> = self.missing.iter().cloned().collect();
        for conflicting in &self.requirements {
            names.insert(conflicting.requirement.name.clone());
            if let Requirer::Package { name, .. } = &conflicting.requirer {
                names.insert(name.clone());
            }
        }
        names
    }

    pub fn mentions(&self, name: &str) -> bool {
        self.packages().iter().any(|package| package.as_str() == name)
    }

    /// Human readable explanation
    pub fn describe(&self) -> String {
        let mut lines = vec!["Could not find a set of versions satisfying all requirements:".to_string()];

        for conflicting in &self.requirements {
            lines.push(format!("  - {} requires {}", conflicting.requirer, conflicting.requirement));
        }

        for name in &self.missing {
            lines.push(format!("  - no package named {} exists", name));
        }

        if !self.chain.is_empty() {
            let chain: Vec<String> = self
                .chain
                .iter()
                .map(|link| format!("{} {}", link.name, link.version))
                .collect();
            lines.push(format!("Selections at the time: {}", chain.join(" -> ")));
        }

        lines.join("\n")
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A conflict as tracked during the search.
///
/// `culprits` are the decisions whose change might resolve it; the search
/// jumps back to the most recent of them.
#[derive(Debug, Clone, Default)]
pub(crate) struct Conflict {
    pub culprits: BTreeSet<PackageName>,
    pub requirements: BTreeSet<ConflictingRequirement>,
    pub missing: BTreeSet<PackageName>,
    pub chain: Vec<ChainLink>,
}

impl Conflict {
    /// Fold `other` into this conflict, forgetting `resolved` as a culprit
    pub fn absorb(&mut self, other: Conflict, resolved: &PackageName) {
        self.culprits.extend(other.culprits.into_iter().filter(|name| name != resolved));
        self.requirements.extend(other.requirements);
        self.missing.extend(other.missing);
        if self.chain.is_empty() {
            self.chain = other.chain;
        }
    }

    pub fn into_report(self) -> ConflictReport {
        ConflictReport {
            requirements: self.requirements.into_iter().collect(),
            missing: self.missing.into_iter().collect(),
            chain: self.chain,
        }
    }
}

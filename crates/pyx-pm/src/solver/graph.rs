use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use pyx_pep440::Version;

use super::candidate::Candidate;
use crate::requirement::{MarkerTree, PackageName, Requirement};

/// Who asked for a requirement
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Requirer {
    /// The declared input
    Root,
    /// A selected package version
    Package { name: PackageName, version: Version },
}

impl fmt::Display for Requirer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirer::Root => f.write_str("the root requirement set"),
            Requirer::Package { name, version } => write!(f, "{} {}", name, version),
        }
    }
}

/// A requirement edge from a requirer to the package it names
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub requirer: Requirer,
    pub requirement: Requirement,
}

/// The outcome of a successful resolution: one candidate per name plus
/// every requirement edge that applied in the target environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionGraph {
    packages: BTreeMap<PackageName, Candidate>,
    edges: Vec<Edge>,
}

impl ResolutionGraph {
    /// Build a graph; edges are sorted by target name and deduplicated
    pub(crate) fn new(packages: BTreeMap<PackageName, Candidate>, mut edges: Vec<Edge>) -> Self {
        edges.sort_by(|a, b| {
            (&a.requirement.name, &a.requirer, &a.requirement).cmp(&(&b.requirement.name, &b.requirer, &b.requirement))
        });
        edges.dedup();
        Self { packages, edges }
    }

    pub fn get(&self, name: &str) -> Option<&Candidate> {
        self.packages.get(name)
    }

    /// Selected candidates ordered by name
    pub fn packages(&self) -> impl Iterator<Item = &Candidate> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges pointing at `name`
    pub fn incoming<'a>(&'a self, name: &'a PackageName) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| &edge.requirement.name == name)
    }

    /// Edges whose target is missing or whose selected candidate does not
    /// satisfy them. Empty for every graph the resolver returns.
    pub fn unsatisfied_edges(&self) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|edge| match self.packages.get(&edge.requirement.name) {
                Some(candidate) => {
                    !edge.requirement.satisfies(&candidate.version)
                        || edge
                            .requirement
                            .source
                            .as_ref()
                            .is_some_and(|source| source != &candidate.source)
                        || edge
                            .requirement
                            .extras
                            .iter()
                            .any(|extra| candidate.declared_extras().contains(extra) && !candidate.extras.contains(extra))
                }
                None => true,
            })
            .collect()
    }

    /// Environment condition under which `name` is needed.
    ///
    /// The disjunction of the extra-free markers on incoming edges, or
    /// `None` when any incoming edge is unconditional.
    pub fn markers_for(&self, name: &PackageName) -> Option<MarkerTree> {
        let mut markers = BTreeSet::new();
        for edge in self.incoming(name) {
            match edge.requirement.marker.as_ref().and_then(MarkerTree::without_extras) {
                Some(marker) => markers.insert(marker),
                None => return None,
            };
        }
        MarkerTree::any(markers.into_iter().collect())
    }
}

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{trace, warn};
use pyx_pep440::Version;

use super::candidate::Candidate;
use super::graph::{Edge, Requirer, ResolutionGraph};
use super::problem::{Conflict, ConflictingRequirement};
use crate::requirement::{MarkerEnvironment, PackageName, Requirement};

/// A requirement asserted against a package name during the search.
///
/// `causes` names the decisions that brought it into existence; undoing
/// any of them could retract it.
#[derive(Debug, Clone)]
pub(crate) struct Assertion {
    pub requirement: Requirement,
    pub requirer: Requirer,
    pub causes: BTreeSet<PackageName>,
}

impl Assertion {
    pub fn root(requirement: Requirement) -> Self {
        Self {
            requirement,
            requirer: Requirer::Root,
            causes: BTreeSet::new(),
        }
    }

    /// Whether a version from `source` satisfies this assertion
    pub fn accepts(&self, version: &Version, source: &str) -> bool {
        self.requirement.satisfies(version)
            && self
                .requirement
                .source
                .as_deref()
                .map_or(true, |required| required == source)
    }

    pub fn conflicting(&self) -> ConflictingRequirement {
        ConflictingRequirement {
            requirer: self.requirer.clone(),
            requirement: self.requirement.clone(),
        }
    }
}

/// Reversible changes, replayed backwards by [`SearchState::undo_to`]
#[derive(Debug)]
enum Change {
    Asserted(PackageName),
    Selected(PackageName),
    ExtraActivated(PackageName, String),
}

/// Dependencies waiting to be injected for a selected package
enum Activation {
    Base(PackageName),
    Extra(PackageName, String),
}

/// The mutable search state: requirements asserted per name, the partial
/// graph of selections and a trail of changes for rewinding.
#[derive(Debug)]
pub(crate) struct SearchState {
    environment: MarkerEnvironment,
    assertions: BTreeMap<PackageName, Vec<Assertion>>,
    selected: BTreeMap<PackageName, Candidate>,
    trail: Vec<Change>,
}

impl SearchState {
    pub fn new(environment: MarkerEnvironment) -> Self {
        Self {
            environment,
            assertions: BTreeMap::new(),
            selected: BTreeMap::new(),
            trail: Vec::new(),
        }
    }

    /// Current trail position, for a later [`SearchState::undo_to`]
    pub fn mark(&self) -> usize {
        self.trail.len()
    }

    pub fn assertions(&self, name: &PackageName) -> &[Assertion] {
        self.assertions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn selection(&self, name: &PackageName) -> Option<&Candidate> {
        self.selected.get(name)
    }

    /// Names with requirements but no selection yet, in name order
    pub fn pending(&self) -> Vec<PackageName> {
        self.assertions
            .keys()
            .filter(|name| !self.selected.contains_key(*name))
            .cloned()
            .collect()
    }

    /// Assert a requirement.
    ///
    /// Fails when the name is already selected with a version the
    /// requirement rejects, or when extras it activates pull in such a
    /// requirement.
    pub fn push_requirement(&mut self, assertion: Assertion) -> Result<(), Conflict> {
        let mut work = VecDeque::new();
        self.assert(assertion, &mut work)?;
        self.activate(work)
    }

    /// Select `candidate` and inject its dependencies and those of every
    /// requested extra.
    ///
    /// # Panics
    ///
    /// If the candidate violates a requirement already asserted on its
    /// name; callers only commit candidates drawn from the filtered
    /// alternatives.
    pub fn commit(&mut self, candidate: Candidate) -> Result<(), Conflict> {
        let name = candidate.name.clone();
        assert!(
            self.assertions(&name)
                .iter()
                .all(|assertion| assertion.accepts(&candidate.version, &candidate.source)),
            "committed {} which violates a requirement on {}",
            candidate,
            name
        );
        assert!(!self.selected.contains_key(&name), "{} is already selected", name);

        let requested: BTreeSet<String> = self
            .assertions(&name)
            .iter()
            .flat_map(|assertion| assertion.requirement.extras.iter().cloned())
            .collect();

        self.selected.insert(name.clone(), candidate);
        self.trail.push(Change::Selected(name.clone()));

        let mut work = VecDeque::from([Activation::Base(name.clone())]);
        for extra in requested {
            self.enable_extra(&name, extra, &mut work);
        }
        self.activate(work)
    }

    /// Rewind every change made after `mark`
    pub fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            match self.trail.pop() {
                Some(Change::Asserted(name)) => {
                    if let Some(assertions) = self.assertions.get_mut(&name) {
                        assertions.pop();
                        if assertions.is_empty() {
                            self.assertions.remove(&name);
                        }
                    }
                }
                Some(Change::Selected(name)) => {
                    self.selected.remove(&name);
                }
                Some(Change::ExtraActivated(name, extra)) => {
                    if let Some(candidate) = self.selected.get_mut(&name) {
                        candidate.extras.remove(&extra);
                    }
                }
                None => break,
            }
        }
    }

    /// The selections and every asserted edge
    pub fn into_graph(self) -> ResolutionGraph {
        let edges = self
            .assertions
            .into_values()
            .flatten()
            .map(|assertion| Edge {
                requirer: assertion.requirer,
                requirement: assertion.requirement,
            })
            .collect();
        ResolutionGraph::new(self.selected, edges)
    }

    fn assert(&mut self, assertion: Assertion, work: &mut VecDeque<Activation>) -> Result<(), Conflict> {
        let name = assertion.requirement.name.clone();
        trace!("{} requires {}", assertion.requirer, assertion.requirement);

        let (accepted, new_extras) = match self.selected.get(&name) {
            Some(selected) => (
                assertion.accepts(&selected.version, &selected.source),
                assertion
                    .requirement
                    .extras
                    .iter()
                    .filter(|extra| !selected.extras.contains(*extra))
                    .cloned()
                    .collect::<Vec<_>>(),
            ),
            None => (true, Vec::new()),
        };

        if !accepted {
            let mut culprits = assertion.causes.clone();
            culprits.insert(name.clone());
            return Err(Conflict {
                culprits,
                requirements: [assertion.conflicting()].into_iter().collect(),
                ..Conflict::default()
            });
        }

        self.assertions.entry(name.clone()).or_default().push(assertion);
        self.trail.push(Change::Asserted(name.clone()));

        for extra in new_extras {
            self.enable_extra(&name, extra, work);
        }
        Ok(())
    }

    fn enable_extra(&mut self, name: &PackageName, extra: String, work: &mut VecDeque<Activation>) {
        let Some(candidate) = self.selected.get_mut(name) else {
            return;
        };
        if candidate.extras.contains(&extra) {
            return;
        }
        if !candidate.declared_extras().contains(&extra) {
            warn!("{} does not provide the extra \"{}\"", candidate, extra);
            return;
        }

        candidate.extras.insert(extra.clone());
        self.trail.push(Change::ExtraActivated(name.clone(), extra.clone()));
        work.push_back(Activation::Extra(name.clone(), extra));
    }

    fn activate(&mut self, mut work: VecDeque<Activation>) -> Result<(), Conflict> {
        while let Some(activation) = work.pop_front() {
            let (name, extra) = match activation {
                Activation::Base(name) => (name, None),
                Activation::Extra(name, extra) => (name, Some(extra)),
            };
            let Some(candidate) = self.selected.get(&name) else {
                continue;
            };

            let requirer = Requirer::Package {
                name: name.clone(),
                version: candidate.version.clone(),
            };
            let requirements = candidate.requirements_for(&self.environment, extra.as_deref());

            let mut causes: BTreeSet<PackageName> = self
                .assertions(&name)
                .iter()
                .flat_map(|assertion| assertion.causes.iter().cloned())
                .collect();
            causes.insert(name.clone());

            for requirement in requirements {
                let assertion = Assertion {
                    requirement,
                    requirer: requirer.clone(),
                    causes: causes.clone(),
                };
                self.assert(assertion, &mut work)?;
            }
        }
        Ok(())
    }
}

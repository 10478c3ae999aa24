use log::{debug, info, warn};

use super::cancel::CancellationToken;
use super::candidate::Candidate;
use super::decisions::{Decisions, Frame};
use super::graph::ResolutionGraph;
use super::policy::Policy;
use super::problem::Conflict;
use super::request::Request;
use super::state::{Assertion, SearchState};
use crate::config::ResolverConfig;
use crate::provider::{AvailableVersion, MetadataProvider, ProviderSession};
use crate::requirement::PackageName;
use crate::{Error, Result};

/// Dependency resolver.
///
/// Runs a backtracking search over one explicit decision stack. Each step
/// picks the pending package with the fewest acceptable versions (ties go
/// to the smaller name), tries its versions in policy order and, when a
/// package runs out of versions, jumps back to the most recent decision
/// that contributed to the failure.
pub struct Resolver<'a> {
    provider: &'a dyn MetadataProvider,
    config: ResolverConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(provider: &'a dyn MetadataProvider, config: ResolverConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a request
    pub async fn resolve(&self, request: &Request) -> Result<ResolutionGraph> {
        self.resolve_with(request, &CancellationToken::new()).await
    }

    /// Resolve a request, stopping early once `cancel` is triggered.
    ///
    /// Every run gets its own metadata cache; nothing is shared with
    /// previous or concurrent runs.
    pub async fn resolve_with(&self, request: &Request, cancel: &CancellationToken) -> Result<ResolutionGraph> {
        let policy = Policy::new()
            .allow_prereleases(self.config.allow_prereleases)
            .pins(request.pins().clone())
            .upgrade(request.upgrade_strategy().clone());

        let run = Run {
            session: ProviderSession::new(self.provider, &self.config),
            state: SearchState::new(request.environment().clone()),
            decisions: Decisions::new(),
            policy,
            cancel,
            max_rounds: self.config.max_rounds,
            rounds: 0,
        };
        run.execute(request).await
    }
}

/// State of one resolution run
struct Run<'a, 'c> {
    session: ProviderSession<'a>,
    state: SearchState,
    decisions: Decisions,
    policy: Policy,
    cancel: &'c CancellationToken,
    max_rounds: usize,
    rounds: usize,
}

impl Run<'_, '_> {
    async fn execute(mut self, request: &Request) -> Result<ResolutionGraph> {
        info!("Resolving {} requirements", request.requirements().len());

        for requirement in request.requirements() {
            if !requirement.evaluate_markers(request.environment()) {
                debug!("Skipping {}: marker does not match the environment", requirement);
                continue;
            }
            if let Err(conflict) = self.state.push_requirement(Assertion::root(requirement.clone())) {
                return Err(conflict.into_report().into());
            }
        }

        loop {
            self.checkpoint()?;

            let pending = self.state.pending();
            if pending.is_empty() {
                break;
            }

            self.session.prefetch_versions(&pending).await;

            let mut best: Option<(PackageName, Vec<AvailableVersion>)> = None;
            for name in pending {
                let candidates = self.candidates(&name).await?;
                if best.as_ref().map_or(true, |(_, current)| candidates.len() < current.len()) {
                    best = Some((name, candidates));
                }
            }
            let Some((name, candidates)) = best else {
                break;
            };

            if candidates.is_empty() {
                let conflict = self.dead_end(&name).await?;
                self.advance(Some(conflict)).await?;
            } else {
                debug!("Deciding {} ({} candidates)", name, candidates.len());
                self.decisions.push(Frame::new(name, candidates, self.state.mark()));
                self.advance(None).await?;
            }
        }

        let graph = self.state.into_graph();
        info!("Resolved {} packages in {} rounds", graph.len(), self.rounds);
        Ok(graph)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!("Resolution cancelled after {} rounds", self.rounds);
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Acceptable versions of `name` in the order they will be tried.
    /// An unknown name has none.
    async fn candidates(&mut self, name: &PackageName) -> Result<Vec<AvailableVersion>> {
        let versions = match self.session.versions(name).await {
            Ok(versions) => versions,
            Err(Error::NotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        Ok(self
            .policy
            .select_preferred(name, &versions, self.state.assertions(name)))
    }

    /// Explain why `name` has no acceptable version
    async fn dead_end(&mut self, name: &PackageName) -> Result<Conflict> {
        let (versions, missing) = match self.session.versions(name).await {
            Ok(versions) => (versions.to_vec(), false),
            Err(Error::NotFound(_)) => (Vec::new(), true),
            Err(err) => return Err(err),
        };

        let minimal = self
            .policy
            .minimal_conflict(name, &versions, self.state.assertions(name));
        debug!("No version of {} satisfies {} requirements", name, minimal.len());

        let mut conflict = Conflict {
            chain: self.decisions.chain(),
            ..Conflict::default()
        };
        for assertion in &minimal {
            conflict.culprits.extend(assertion.causes.iter().cloned());
            conflict.requirements.insert(assertion.conflicting());
        }
        if missing {
            conflict.missing.insert(name.clone());
        }
        Ok(conflict)
    }

    /// Commit the next workable alternative of the top frame.
    ///
    /// A pending conflict is first resolved by jumping back to the most
    /// recent frame among its culprits. A frame that runs out of
    /// alternatives fails in turn, with its collected culprits plus those
    /// of the requirements that shaped its alternatives. Failing with no
    /// culprits left means no decision can help: the conflict is final.
    async fn advance(&mut self, mut pending: Option<Conflict>) -> Result<()> {
        loop {
            if let Some(conflict) = pending.take() {
                let Some(level) = self.decisions.deepest_of(&conflict.culprits) else {
                    info!("Resolution failed after {} rounds", self.rounds);
                    return Err(conflict.into_report().into());
                };
                let Some(frame) = self.decisions.revert_to_level(level) else {
                    return Err(conflict.into_report().into());
                };
                debug!("Backjumping to {} at level {}", frame.name, level);
                self.state.undo_to(frame.trail_mark);
                let resolved = frame.name.clone();
                frame.conflict.absorb(conflict, &resolved);
            }

            let Some(frame) = self.decisions.top_mut() else {
                return Ok(());
            };
            let name = frame.name.clone();
            let mark = frame.trail_mark;

            let Some(alternative) = frame.take_next() else {
                let failure = match self.decisions.pop() {
                    Some(frame) => self.exhausted(frame),
                    None => Conflict::default(),
                };
                pending = Some(failure);
                continue;
            };
            let remaining = frame.remaining();

            self.checkpoint()?;
            if self.rounds >= self.max_rounds {
                return Err(Error::ResolutionTooDeep(self.max_rounds));
            }
            self.rounds += 1;

            match self.try_commit(&name, alternative).await? {
                Ok(()) => return Ok(()),
                Err(mut conflict) => {
                    debug!("Rejected {} ({} alternatives left)", name, remaining);
                    if conflict.chain.is_empty() {
                        conflict.chain = self.decisions.chain();
                    }
                    self.state.undo_to(mark);
                    if let Some(frame) = self.decisions.top_mut() {
                        frame.conflict.absorb(conflict, &name);
                    }
                }
            }
        }
    }

    /// The failure of a frame whose alternatives are all spent
    fn exhausted(&self, frame: Frame) -> Conflict {
        debug!("Exhausted all versions of {}", frame.name);
        let mut failure = frame.conflict;
        for assertion in self.state.assertions(&frame.name) {
            failure.culprits.extend(assertion.causes.iter().cloned());
            failure.requirements.insert(assertion.conflicting());
        }
        failure.culprits.remove(&frame.name);
        failure
    }

    /// Fetch metadata for one alternative and commit it
    async fn try_commit(
        &mut self,
        name: &PackageName,
        alternative: AvailableVersion,
    ) -> Result<std::result::Result<(), Conflict>> {
        let metadata = match self.session.metadata(name, &alternative.version).await {
            Ok(metadata) => metadata,
            Err(Error::NotFound(_)) => {
                warn!("No metadata for {} {}, skipping it", name, alternative.version);
                return Ok(Err(Conflict::default()));
            }
            Err(err) => return Err(err),
        };

        let candidate = Candidate::new(name.clone(), alternative, metadata);
        debug!("Selecting {}", candidate);
        Ok(self.state.commit(candidate))
    }
}

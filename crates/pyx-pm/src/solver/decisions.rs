use std::collections::BTreeSet;

use pyx_pep440::Version;

use super::problem::{ChainLink, Conflict};
use crate::provider::AvailableVersion;
use crate::requirement::PackageName;

/// A decision point: one package name, its ordered alternatives and the
/// position in the search state trail to rewind to when leaving it.
#[derive(Debug)]
pub(crate) struct Frame {
    pub name: PackageName,
    alternatives: Vec<AvailableVersion>,
    next: usize,
    /// Alternative currently selected or being tried
    pub chosen: Option<Version>,
    pub trail_mark: usize,
    /// Culprits collected from the alternatives that failed so far
    pub conflict: Conflict,
}

impl Frame {
    pub fn new(name: PackageName, alternatives: Vec<AvailableVersion>, trail_mark: usize) -> Self {
        Self {
            name,
            alternatives,
            next: 0,
            chosen: None,
            trail_mark,
            conflict: Conflict::default(),
        }
    }

    /// Move on to the next untried alternative
    pub fn take_next(&mut self) -> Option<AvailableVersion> {
        let alternative = self.alternatives.get(self.next).cloned()?;
        self.next += 1;
        self.chosen = Some(alternative.version.clone());
        Some(alternative)
    }

    pub fn remaining(&self) -> usize {
        self.alternatives.len() - self.next
    }
}

/// The decision stack.
///
/// The level of a frame is its index; reverting to a level discards every
/// frame above it.
#[derive(Debug, Default)]
pub(crate) struct Decisions {
    frames: Vec<Frame>,
}

impl Decisions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open frames
    pub fn level(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Level of the most recent frame deciding one of `names`
    pub fn deepest_of(&self, names: &BTreeSet<PackageName>) -> Option<usize> {
        self.frames.iter().rposition(|frame| names.contains(&frame.name))
    }

    /// Drop every frame above `level` and return the frame at `level`
    pub fn revert_to_level(&mut self, level: usize) -> Option<&mut Frame> {
        self.frames.truncate(level + 1);
        self.frames.last_mut()
    }

    /// Current selections from the bottom of the stack up
    pub fn chain(&self) -> Vec<ChainLink> {
        self.frames
            .iter()
            .filter_map(|frame| {
                frame.chosen.as_ref().map(|version| ChainLink {
                    name: frame.name.clone(),
                    version: version.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }

    fn frame(package: &str, versions: &[&str], mark: usize) -> Frame {
        let alternatives = versions
            .iter()
            .map(|v| AvailableVersion {
                version: v.parse().unwrap(),
                source: "pypi".to_string(),
            })
            .collect();
        Frame::new(name(package), alternatives, mark)
    }

    #[test]
    fn test_take_next() {
        let mut f = frame("a", &["2.0", "1.0"], 0);
        assert_eq!(f.remaining(), 2);
        assert_eq!(f.take_next().unwrap().version.to_string(), "2.0");
        assert_eq!(f.chosen.as_ref().unwrap().to_string(), "2.0");
        assert_eq!(f.take_next().unwrap().version.to_string(), "1.0");
        assert!(f.take_next().is_none());
        assert_eq!(f.remaining(), 0);
    }

    #[test]
    fn test_deepest_of() {
        let mut decisions = Decisions::new();
        decisions.push(frame("a", &["1"], 0));
        decisions.push(frame("b", &["1"], 2));
        decisions.push(frame("c", &["1"], 5));

        let culprits: BTreeSet<PackageName> = [name("a"), name("b")].into_iter().collect();
        assert_eq!(decisions.deepest_of(&culprits), Some(1));
        assert_eq!(decisions.deepest_of(&BTreeSet::new()), None);
    }

    #[test]
    fn test_revert_to_level() {
        let mut decisions = Decisions::new();
        decisions.push(frame("a", &["1"], 0));
        decisions.push(frame("b", &["1"], 2));
        decisions.push(frame("c", &["1"], 5));

        let top = decisions.revert_to_level(0).unwrap();
        assert_eq!(top.name.as_str(), "a");
        assert_eq!(decisions.level(), 1);
    }

    #[test]
    fn test_chain_lists_selections() {
        let mut decisions = Decisions::new();
        decisions.push(frame("a", &["1.0"], 0));
        decisions.push(frame("b", &["2.0"], 1));
        if let Some(top) = decisions.top_mut() {
            top.take_next();
        }

        let chain = decisions.chain();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name.as_str(), "b");
        assert_eq!(chain[0].version.to_string(), "2.0");
    }
}

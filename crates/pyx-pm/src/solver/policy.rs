use std::collections::BTreeMap;

use super::request::{Pin, Upgrade};
use super::state::Assertion;
use crate::provider::AvailableVersion;
use crate::requirement::PackageName;

/// Policy for ordering the versions of a package.
///
/// Newest first, except that a lock pin still satisfying the constraints
/// is tried before everything else unless the package is being upgraded.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// Consider pre-releases even when final releases match
    pub allow_prereleases: bool,
    /// Versions recorded by an existing lock
    pub pins: BTreeMap<PackageName, Pin>,
    /// Packages whose pins are ignored
    pub upgrade: Upgrade,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_prereleases(mut self, allow: bool) -> Self {
        self.allow_prereleases = allow;
        self
    }

    pub fn pins(mut self, pins: BTreeMap<PackageName, Pin>) -> Self {
        self.pins = pins;
        self
    }

    pub fn upgrade(mut self, upgrade: Upgrade) -> Self {
        self.upgrade = upgrade;
        self
    }

    /// The pin to honour for `name`, if any
    pub fn preferred_pin(&self, name: &PackageName) -> Option<&Pin> {
        if self.upgrade.includes(name) {
            return None;
        }
        self.pins.get(name)
    }

    /// Versions of `name` acceptable under `assertions`, best first.
    ///
    /// A version listed by several sources keeps its first listing among
    /// the sources the assertions allow. Pre-releases are dropped while a
    /// final release matches, unless enabled globally or named by one of the
    /// specifiers.
    pub(crate) fn select_preferred(
        &self,
        name: &PackageName,
        versions: &[AvailableVersion],
        assertions: &[Assertion],
    ) -> Vec<AvailableVersion> {
        let mut matching: Vec<AvailableVersion> = Vec::new();
        for available in versions {
            if !assertions
                .iter()
                .all(|assertion| assertion.accepts(&available.version, &available.source))
            {
                continue;
            }
            if matching.iter().any(|seen| seen.version == available.version) {
                continue;
            }
            matching.push(available.clone());
        }

        let prereleases_allowed = self.allow_prereleases
            || assertions
                .iter()
                .any(|assertion| assertion.requirement.specifiers.mentions_prerelease());
        if !prereleases_allowed && matching.iter().any(|available| !available.version.is_prerelease()) {
            matching.retain(|available| !available.version.is_prerelease());
        }

        matching.sort_by(|a, b| b.version.cmp(&a.version));

        if let Some(pin) = self.preferred_pin(name) {
            let pinned = matching.iter().position(|available| {
                available.version == pin.version
                    && pin.source.as_ref().map_or(true, |source| source == &available.source)
            });
            if let Some(position) = pinned {
                let preferred = matching.remove(position);
                matching.insert(0, preferred);
            }
        }

        matching
    }

    /// Shrink `assertions` to a minimal subset that still leaves no
    /// acceptable version. Never returns an empty set for a non-empty input.
    pub(crate) fn minimal_conflict(
        &self,
        name: &PackageName,
        versions: &[AvailableVersion],
        assertions: &[Assertion],
    ) -> Vec<Assertion> {
        let mut kept = assertions.to_vec();
        let mut index = kept.len();
        while index > 0 {
            index -= 1;
            if kept.len() == 1 {
                break;
            }
            let mut trial = kept.clone();
            trial.remove(index);
            if self.select_preferred(name, versions, &trial).is_empty() {
                kept = trial;
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirement::Requirement;
    use crate::solver::graph::Requirer;
    use std::collections::BTreeSet;

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }

    fn available(versions: &[&str]) -> Vec<AvailableVersion> {
        versions
            .iter()
            .map(|v| AvailableVersion {
                version: v.parse().unwrap(),
                source: "pypi".to_string(),
            })
            .collect()
    }

    fn assertion(requirement: &str) -> Assertion {
        Assertion {
            requirement: Requirement::parse(requirement).unwrap(),
            requirer: Requirer::Root,
            causes: BTreeSet::new(),
        }
    }

    fn order(policy: &Policy, versions: &[AvailableVersion], requirements: &[&str]) -> Vec<String> {
        let assertions: Vec<Assertion> = requirements.iter().map(|r| assertion(r)).collect();
        policy
            .select_preferred(&name("a"), versions, &assertions)
            .iter()
            .map(|a| a.version.to_string())
            .collect()
    }

    #[test]
    fn test_prefer_newest() {
        let versions = available(&["1.0", "2.0", "1.5"]);
        assert_eq!(order(&Policy::new(), &versions, &["a"]), vec!["2.0", "1.5", "1.0"]);
        assert_eq!(order(&Policy::new(), &versions, &["a<2"]), vec!["1.5", "1.0"]);
    }

    #[test]
    fn test_pin_first_unless_upgrading() {
        let versions = available(&["1.0", "2.0", "1.5"]);
        let pins: BTreeMap<PackageName, Pin> = [(name("a"), Pin::new("1.0".parse().unwrap()))].into_iter().collect();

        let pinned = Policy::new().pins(pins.clone());
        assert_eq!(order(&pinned, &versions, &["a>=1.0"]), vec!["1.0", "2.0", "1.5"]);

        // a pin outside the constraints is ignored
        assert_eq!(order(&pinned, &versions, &["a>=1.2"]), vec!["2.0", "1.5"]);

        let upgrading = Policy::new().pins(pins.clone()).upgrade(Upgrade::All);
        assert_eq!(order(&upgrading, &versions, &["a"]), vec!["2.0", "1.5", "1.0"]);

        let other = Policy::new()
            .pins(pins)
            .upgrade(Upgrade::Packages([name("b")].into_iter().collect()));
        assert_eq!(order(&other, &versions, &["a"]), vec!["1.0", "2.0", "1.5"]);
    }

    #[test]
    fn test_prereleases() {
        let versions = available(&["1.0", "2.0b1"]);
        assert_eq!(order(&Policy::new(), &versions, &["a"]), vec!["1.0"]);
        assert_eq!(order(&Policy::new(), &versions, &["a>=2.0b1"]), vec!["2.0b1"]);
        assert_eq!(order(&Policy::new(), &versions, &["a>1.0"]), vec!["2.0b1"]);
        assert_eq!(
            order(&Policy::new().allow_prereleases(true), &versions, &["a"]),
            vec!["2.0b1", "1.0"]
        );
    }

    #[test]
    fn test_source_restriction_and_duplicates() {
        let versions = vec![
            AvailableVersion {
                version: "1.0".parse().unwrap(),
                source: "pypi".to_string(),
            },
            AvailableVersion {
                version: "1.0.0".parse().unwrap(),
                source: "internal".to_string(),
            },
        ];

        let any = Policy::new().select_preferred(&name("a"), &versions, &[assertion("a")]);
        assert_eq!(any.len(), 1);
        assert_eq!(any[0].source, "pypi");

        let mut restricted = assertion("a");
        restricted.requirement = restricted.requirement.with_source("internal");
        let internal = Policy::new().select_preferred(&name("a"), &versions, &[restricted]);
        assert_eq!(internal.len(), 1);
        assert_eq!(internal[0].source, "internal");
    }

    #[test]
    fn test_minimal_conflict() {
        let versions = available(&["1.0", "2.0", "3.0"]);
        let assertions = vec![assertion("a>=1"), assertion("a>=2.5"), assertion("a<2"), assertion("a!=1.5")];
        let minimal = Policy::new().minimal_conflict(&name("a"), &versions, &assertions);
        let kept: Vec<String> = minimal.iter().map(|a| a.requirement.to_string()).collect();
        assert_eq!(kept, vec!["a>=2.5", "a<2"]);
    }

    #[test]
    fn test_minimal_conflict_keeps_one_for_missing_package() {
        let assertions = vec![assertion("a>=1"), assertion("a<3")];
        let minimal = Policy::new().minimal_conflict(&name("a"), &[], &assertions);
        assert_eq!(minimal.len(), 1);
        assert_eq!(minimal[0].requirement.to_string(), "a>=1");
    }
}

//! Version specifiers and specifier sets

mod specifier;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::version::{Version, VersionParseError};

pub use specifier::VersionSpecifier;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecifierParseError {
    #[error("Invalid operator in \"{specifier}\", expected one of: {expected}")]
    InvalidOperator { specifier: String, expected: String },
    #[error("Missing version in specifier \"{0}\"")]
    MissingVersion(String),
    #[error("Wildcards are only allowed with == and != and without dev or local segments: \"{0}\"")]
    InvalidWildcard(String),
    #[error("Local versions are only allowed with ==, != and ===: \"{0}\"")]
    LocalNotAllowed(String),
    #[error("~= requires at least two release segments: \"{0}\"")]
    CompatibleNeedsTwoSegments(String),
    #[error("Empty specifier in \"{0}\"")]
    EmptySpecifier(String),
    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),
}

/// Comparison operator of a version specifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Equal,
    EqualStar,
    NotEqual,
    NotEqualStar,
    TildeEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    ExactEqual,
}

/// Operator spellings, longest first so prefix matching is unambiguous
const OPERATOR_PREFIXES: [&str; 8] = ["===", "~=", "==", "!=", "<=", ">=", "<", ">"];

impl Operator {
    /// Parse an operator token (wildcard forms are decided by the version part)
    pub fn parse(op: &str) -> Option<Operator> {
        match op {
            "==" => Some(Operator::Equal),
            "!=" => Some(Operator::NotEqual),
            "~=" => Some(Operator::TildeEqual),
            "<" => Some(Operator::LessThan),
            "<=" => Some(Operator::LessThanEqual),
            ">" => Some(Operator::GreaterThan),
            ">=" => Some(Operator::GreaterThanEqual),
            "===" => Some(Operator::ExactEqual),
            _ => None,
        }
    }

    /// Split a leading operator token from the rest of a specifier
    pub(crate) fn split_prefix(input: &str) -> Option<(&'static str, &str)> {
        OPERATOR_PREFIXES
            .iter()
            .find(|prefix| input.starts_with(**prefix))
            .map(|prefix| (*prefix, &input[prefix.len()..]))
    }

    pub fn supported_operators() -> &'static [&'static str] {
        &OPERATOR_PREFIXES
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal | Operator::EqualStar => "==",
            Operator::NotEqual | Operator::NotEqualStar => "!=",
            Operator::TildeEqual => "~=",
            Operator::LessThan => "<",
            Operator::LessThanEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanEqual => ">=",
            Operator::ExactEqual => "===",
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Operator::EqualStar | Operator::NotEqualStar)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comma separated set of specifiers, all of which must hold.
///
/// An empty set accepts every version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl VersionSpecifiers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_specifiers(specifiers: Vec<VersionSpecifier>) -> Self {
        Self(specifiers)
    }

    /// Check whether a version satisfies every specifier in the set
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|spec| spec.contains(version))
    }

    /// Canonical form: sorted by version then operator, duplicates removed.
    pub fn normalize(&self) -> Self {
        let mut specs = self.0.clone();
        specs.sort();
        specs.dedup();
        Self(specs)
    }

    /// The conjunction of two sets
    pub fn intersect(&self, other: &VersionSpecifiers) -> Self {
        let mut specs = self.0.clone();
        specs.extend(other.0.iter().cloned());
        Self(specs).normalize()
    }

    /// Whether any specifier names a pre-release explicitly.
    ///
    /// Installers admit pre-releases for a name once a specifier mentions one.
    pub fn mentions_prerelease(&self) -> bool {
        self.0.iter().any(|spec| {
            !matches!(spec.operator(), Operator::NotEqual | Operator::NotEqualStar)
                && spec.version().is_prerelease()
        })
    }

    pub fn push(&mut self, specifier: VersionSpecifier) {
        self.0.push(specifier);
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionSpecifier> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for VersionSpecifiers {
    type Err = SpecifierParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::new());
        }

        let mut specs = Vec::new();
        for part in trimmed.split(',') {
            if part.trim().is_empty() {
                return Err(SpecifierParseError::EmptySpecifier(trimmed.to_string()));
            }
            specs.push(part.parse::<VersionSpecifier>()?);
        }
        Ok(Self(specs))
    }
}

impl fmt::Display for VersionSpecifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|spec| spec.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl<'a> IntoIterator for &'a VersionSpecifiers {
    type Item = &'a VersionSpecifier;
    type IntoIter = std::slice::Iter<'a, VersionSpecifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(s: &str) -> VersionSpecifiers {
        s.parse().unwrap()
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_set() {
        let set = specs(">=1, <2");
        assert_eq!(set.len(), 2);
        assert!(set.contains(&v("1.5")));
        assert!(!set.contains(&v("2.0")));
        assert!(!set.contains(&v("0.9")));
    }

    #[test]
    fn test_empty_set_accepts_everything() {
        let set = specs("  ");
        assert!(set.is_empty());
        assert!(set.contains(&v("0.0.1")));
        assert!(set.contains(&v("99.0a1")));
    }

    #[test]
    fn test_parse_set_errors() {
        assert!(matches!(
            ">=1,,<2".parse::<VersionSpecifiers>(),
            Err(SpecifierParseError::EmptySpecifier(_))
        ));
        assert!(">=1,<".parse::<VersionSpecifiers>().is_err());
        assert!(">=1,2".parse::<VersionSpecifiers>().is_err());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let set = specs("<2, >=1.0, >=1, !=1.5");
        let normalized = set.normalize();
        assert_eq!(normalized.to_string(), ">=1.0,!=1.5,<2");
        assert_eq!(normalized.normalize(), normalized);
    }

    #[test]
    fn test_intersect() {
        let range = specs(">=1,<2").intersect(&specs(">=1.3"));
        assert!(range.contains(&v("1.5")));
        assert!(!range.contains(&v("1.2")));
        assert!(!range.contains(&v("2.0")));
    }

    #[test]
    fn test_mentions_prerelease() {
        assert!(specs(">=1.0b1").mentions_prerelease());
        assert!(!specs(">=1.0,!=1.1a1").mentions_prerelease());
        assert!(!specs("").mentions_prerelease());
    }

    #[test]
    fn test_split_prefix_prefers_longest() {
        assert_eq!(Operator::split_prefix("===1.0"), Some(("===", "1.0")));
        assert_eq!(Operator::split_prefix("<=1.0"), Some(("<=", "1.0")));
        assert_eq!(Operator::split_prefix("<1.0"), Some(("<", "1.0")));
        assert_eq!(Operator::split_prefix("1.0"), None);
    }
}

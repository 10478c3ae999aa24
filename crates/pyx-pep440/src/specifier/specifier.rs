//! Single version specifier implementation

use std::fmt;
use std::str::FromStr;

use super::{Operator, SpecifierParseError};
use crate::version::Version;

/// A single version specifier (e.g., ">= 1.0")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionSpecifier {
    version: Version,
    operator: Operator,
}

impl VersionSpecifier {
    /// Create a new specifier, validating operator/version combinations
    pub fn new(operator: Operator, version: Version) -> Result<Self, SpecifierParseError> {
        let spec = VersionSpecifier { version, operator };

        if spec.version.is_local()
            && !matches!(operator, Operator::Equal | Operator::NotEqual | Operator::ExactEqual)
        {
            return Err(SpecifierParseError::LocalNotAllowed(spec.to_string()));
        }

        if operator.is_wildcard() && (spec.version.dev().is_some() || spec.version.is_local()) {
            return Err(SpecifierParseError::InvalidWildcard(spec.to_string()));
        }

        if operator == Operator::TildeEqual && spec.version.release().len() < 2 {
            return Err(SpecifierParseError::CompatibleNeedsTwoSegments(spec.to_string()));
        }

        Ok(spec)
    }

    /// Shorthand for `==version`
    pub fn equals(version: Version) -> Self {
        VersionSpecifier {
            version,
            operator: Operator::Equal,
        }
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Check whether a concrete version satisfies this specifier
    pub fn contains(&self, candidate: &Version) -> bool {
        let spec = &self.version;

        match self.operator {
            Operator::Equal => self.equal(candidate),
            Operator::NotEqual => !self.equal(candidate),
            Operator::EqualStar => prefix_match(candidate, spec, spec.release().len()),
            Operator::NotEqualStar => !prefix_match(candidate, spec, spec.release().len()),
            Operator::TildeEqual => {
                let prefix = spec.release().len() - 1;
                candidate.without_local() >= *spec && prefix_match(candidate, spec, prefix)
            }
            Operator::LessThanEqual => candidate.without_local() <= *spec,
            Operator::GreaterThanEqual => candidate.without_local() >= *spec,
            Operator::LessThan => {
                let public = candidate.without_local();
                if public >= *spec {
                    return false;
                }
                // <V never admits a pre-release of V itself unless V is one
                !(!spec.is_prerelease() && public.is_prerelease() && public.same_release(spec))
            }
            Operator::GreaterThan => {
                let public = candidate.without_local();
                if public <= *spec {
                    return false;
                }
                // >V never admits a post-release of V itself unless V is one
                !(!spec.is_postrelease() && public.is_postrelease() && public.same_release(spec))
            }
            Operator::ExactEqual => candidate.to_string() == spec.to_string(),
        }
    }

    fn equal(&self, candidate: &Version) -> bool {
        if self.version.is_local() {
            candidate == &self.version
        } else {
            candidate.without_local() == self.version
        }
    }
}

/// Epoch equal and the first `len` release segments equal (zero padded)
fn prefix_match(candidate: &Version, spec: &Version, len: usize) -> bool {
    if candidate.epoch() != spec.epoch() {
        return false;
    }
    (0..len).all(|i| {
        candidate.release().get(i).copied().unwrap_or(0) == spec.release().get(i).copied().unwrap_or(0)
    })
}

impl FromStr for VersionSpecifier {
    type Err = SpecifierParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (op_str, rest) = Operator::split_prefix(trimmed).ok_or_else(|| {
            SpecifierParseError::InvalidOperator {
                specifier: trimmed.to_string(),
                expected: Operator::supported_operators().join(", "),
            }
        })?;
        let rest = rest.trim();

        if rest.is_empty() {
            return Err(SpecifierParseError::MissingVersion(trimmed.to_string()));
        }

        let (operator, version_str) = match rest.strip_suffix(".*") {
            Some(prefix) => {
                let operator = match op_str {
                    "==" => Operator::EqualStar,
                    "!=" => Operator::NotEqualStar,
                    _ => return Err(SpecifierParseError::InvalidWildcard(trimmed.to_string())),
                };
                (operator, prefix)
            }
            None => {
                let operator = Operator::parse(op_str).ok_or_else(|| SpecifierParseError::InvalidOperator {
                    specifier: trimmed.to_string(),
                    expected: Operator::supported_operators().join(", "),
                })?;
                (operator, rest)
            }
        };

        let version = version_str.parse::<Version>()?;
        Self::new(operator, version)
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operator.is_wildcard() {
            write!(f, "{}{}.*", self.operator.as_str(), self.version)
        } else {
            write!(f, "{}{}", self.operator.as_str(), self.version)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> VersionSpecifier {
        s.parse().unwrap()
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn check(specifier: &str, matching: &[&str], failing: &[&str]) {
        let parsed = spec(specifier);
        for version in matching {
            assert!(parsed.contains(&v(version)), "{} should contain {}", specifier, version);
        }
        for version in failing {
            assert!(!parsed.contains(&v(version)), "{} should not contain {}", specifier, version);
        }
    }

    #[test]
    fn test_parse_operators() {
        assert_eq!(spec(">=1.0").operator(), Operator::GreaterThanEqual);
        assert_eq!(spec("<= 2").operator(), Operator::LessThanEqual);
        assert_eq!(spec("~=1.4.5").operator(), Operator::TildeEqual);
        assert_eq!(spec("===1.0").operator(), Operator::ExactEqual);
        assert_eq!(spec("==1.*").operator(), Operator::EqualStar);
        assert_eq!(spec("!=1.2.*").operator(), Operator::NotEqualStar);
        assert_eq!(spec(" > 3.0a1 ").to_string(), ">3.0a1");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "=>1.0".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::InvalidOperator { .. })
        ));
        assert!(matches!(
            "1.0".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::InvalidOperator { .. })
        ));
        assert!(matches!(
            ">=".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::MissingVersion(_))
        ));
        assert!(matches!(
            ">=1.*".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::InvalidWildcard(_))
        ));
        assert!(matches!(
            "~=1".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::CompatibleNeedsTwoSegments(_))
        ));
        assert!(matches!(
            ">=1.0+local".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::LocalNotAllowed(_))
        ));
        assert!(matches!(
            "==1.0.x".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_equal() {
        check("==1.0", &["1.0", "1.0.0", "1.0+local"], &["1.0.1", "1.0a1", "1.0.post1"]);
        check("==1.0+local", &["1.0+local"], &["1.0", "1.0+other"]);
        check("!=1.0", &["1.1", "0.9"], &["1.0", "1.0+local"]);
    }

    #[test]
    fn test_wildcards() {
        check("==1.1.*", &["1.1", "1.1.0", "1.1.5", "1.1a1", "1.1.post1", "1.1.dev1"], &["1.2", "1.10", "2!1.1"]);
        check("!=1.1.*", &["1.2", "1.0"], &["1.1.3"]);
    }

    #[test]
    fn test_compatible_release() {
        check("~=2.2", &["2.2", "2.3", "2.9.1"], &["3.0", "2.1", "2.2a1"]);
        check("~=1.4.5", &["1.4.5", "1.4.9"], &["1.5.0", "1.4.4"]);
        check("~=1.4.5a4", &["1.4.5a4", "1.4.5", "1.4.6"], &["1.5.0", "1.4.5a3"]);
    }

    #[test]
    fn test_inclusive_ordered() {
        check(">=1.0", &["1.0", "1.0.post1", "2.0", "1.0+local"], &["0.9", "1.0a1"]);
        check("<=1.0", &["1.0", "0.1", "1.0a1", "1.0+local"], &["1.0.post1", "1.1"]);
    }

    #[test]
    fn test_exclusive_ordered() {
        check("<2.0", &["1.9", "1.9.9", "1.0+local"], &["2.0", "2.0a1", "2.0.dev1", "2.0rc1", "2.0a0.post1"]);
        check("<2.0rc1", &["2.0a1", "2.0b3"], &["2.0rc1", "2.0"]);
        check(">1.7", &["1.7.1", "1.8", "1.8.dev0"], &["1.7", "1.7.post2", "1.7+local"]);
        check(">1.7.post2", &["1.7.post3", "1.8"], &["1.7.post2", "1.7.post1"]);
    }

    #[test]
    fn test_arbitrary_equality() {
        check("===1.0", &["1.0"], &["1.0.0", "1.0+local"]);
    }
}

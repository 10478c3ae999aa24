//! PEP 440 version parsing, normalization and ordering

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use thiserror::Error;

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(
        r"(?xi)
        ^\s*
        v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?P<pre>
            [-_.]?
            (?P<pre_l>alpha|beta|preview|pre|rc|a|b|c)
            [-_.]?
            (?P<pre_n>[0-9]+)?
        )?
        (?P<post>
            (?:-(?P<post_n1>[0-9]+))
            |
            (?:
                [-_.]?
                (?P<post_l>post|rev|r)
                [-_.]?
                (?P<post_n2>[0-9]+)?
            )
        )?
        (?P<dev>
            [-_.]?
            (?P<dev_l>dev)
            [-_.]?
            (?P<dev_n>[0-9]+)?
        )?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$"
    )
    .unwrap();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("Invalid version \"{0}\"")]
    Invalid(String),
    #[error("Version segment \"{segment}\" in \"{version}\" does not fit in 64 bits")]
    SegmentOverflow { version: String, segment: String },
}

/// Pre-release phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreReleaseKind {
    Alpha,
    Beta,
    Rc,
}

impl PreReleaseKind {
    /// Canonical label
    pub fn as_str(&self) -> &'static str {
        match self {
            PreReleaseKind::Alpha => "a",
            PreReleaseKind::Beta => "b",
            PreReleaseKind::Rc => "rc",
        }
    }
}

/// A pre-release marker such as `a1` or `rc2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreRelease {
    pub kind: PreReleaseKind,
    pub number: u64,
}

/// One dot-separated piece of a local version label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalSegment {
    Number(u64),
    String(String),
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (LocalSegment::Number(a), LocalSegment::Number(b)) => a.cmp(b),
            (LocalSegment::String(a), LocalSegment::String(b)) => a.cmp(b),
            // Numeric segments always sort after alphanumeric ones
            (LocalSegment::Number(_), LocalSegment::String(_)) => Ordering::Greater,
            (LocalSegment::String(_), LocalSegment::Number(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalSegment::Number(n) => write!(f, "{}", n),
            LocalSegment::String(s) => f.write_str(s),
        }
    }
}

/// A parsed PEP 440 version.
///
/// Equality and ordering are structural: `1.0` and `1.0.0` are equal, and
/// `1.0.dev0 < 1.0a1 < 1.0 < 1.0.post1 < 1.0+local`.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<PreRelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

impl Version {
    /// Create a final release version from its release segments
    pub fn new(release: impl Into<Vec<u64>>) -> Self {
        let mut release = release.into();
        if release.is_empty() {
            release.push(0);
        }
        Self {
            epoch: 0,
            release,
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_pre(mut self, kind: PreReleaseKind, number: u64) -> Self {
        self.pre = Some(PreRelease { kind, number });
        self
    }

    pub fn with_post(mut self, number: u64) -> Self {
        self.post = Some(number);
        self
    }

    pub fn with_dev(mut self, number: u64) -> Self {
        self.dev = Some(number);
        self
    }

    pub fn with_local(mut self, local: Vec<LocalSegment>) -> Self {
        self.local = local;
        self
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn pre(&self) -> Option<PreRelease> {
        self.pre
    }

    pub fn post(&self) -> Option<u64> {
        self.post
    }

    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    pub fn local(&self) -> &[LocalSegment] {
        &self.local
    }

    /// Pre-releases and development releases
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// The public part of this version (local label dropped)
    pub fn without_local(&self) -> Version {
        Version {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Compare epoch and release only, ignoring trailing zeros
    pub fn same_release(&self, other: &Version) -> bool {
        self.epoch == other.epoch && compare_release(&self.release, &other.release) == Ordering::Equal
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (Some(pre), _, _) => PreKey::Pre(pre),
            (None, _, _) => PreKey::Final,
        }
    }

    fn dev_key(&self) -> (u8, u64) {
        match self.dev {
            Some(n) => (0, n),
            None => (1, 0),
        }
    }

    fn parse_number(version: &str, segment: &str) -> Result<u64, VersionParseError> {
        segment
            .parse::<u64>()
            .map_err(|_| VersionParseError::SegmentOverflow {
                version: version.to_string(),
                segment: segment.to_string(),
            })
    }

    fn optional_number(version: &str, caps: &Captures<'_>, group: &str) -> Result<u64, VersionParseError> {
        match caps.name(group) {
            Some(m) => Self::parse_number(version, m.as_str()),
            None => Ok(0),
        }
    }
}

/// Sort key for the pre-release slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    /// `1.0.dev0` sorts before every pre-release of `1.0`
    DevOnly,
    Pre(PreRelease),
    Final,
}

fn compare_release(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let left = a.get(i).copied().unwrap_or(0);
        let right = b.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let caps = VERSION_RE
            .captures(input)
            .ok_or_else(|| VersionParseError::Invalid(input.to_string()))?;

        let epoch = Self::optional_number(input, &caps, "epoch")?;

        let release = caps["release"]
            .split('.')
            .map(|segment| Self::parse_number(input, segment))
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => {
                let kind = match label.as_str().to_ascii_lowercase().as_str() {
                    "a" | "alpha" => PreReleaseKind::Alpha,
                    "b" | "beta" => PreReleaseKind::Beta,
                    _ => PreReleaseKind::Rc,
                };
                Some(PreRelease {
                    kind,
                    number: Self::optional_number(input, &caps, "pre_n")?,
                })
            }
            None => None,
        };

        let post = if let Some(implicit) = caps.name("post_n1") {
            Some(Self::parse_number(input, implicit.as_str())?)
        } else if caps.name("post_l").is_some() {
            Some(Self::optional_number(input, &caps, "post_n2")?)
        } else {
            None
        };

        let dev = if caps.name("dev_l").is_some() {
            Some(Self::optional_number(input, &caps, "dev_n")?)
        } else {
            None
        };

        let local = match caps.name("local") {
            Some(m) => m
                .as_str()
                .split(['.', '-', '_'])
                .map(|segment| {
                    if segment.bytes().all(|b| b.is_ascii_digit()) {
                        Self::parse_number(input, segment).map(LocalSegment::Number)
                    } else {
                        Ok(LocalSegment::String(segment.to_ascii_lowercase()))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Version {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        let significant = self
            .release
            .iter()
            .rposition(|&segment| segment != 0)
            .map_or(0, |last| last + 1);
        self.release[..significant].hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        f.write_str(&release.join("."))?;
        if let Some(pre) = self.pre {
            write!(f, "{}{}", pre.kind.as_str(), pre.number)?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{}", post)?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{}", dev)?;
        }
        if !self.local.is_empty() {
            let local: Vec<String> = self.local.iter().map(|s| s.to_string()).collect();
            write!(f, "+{}", local.join("."))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_normalize() {
        let cases = [
            ("1.0", "1.0"),
            ("v1.0", "1.0"),
            ("1.0.0", "1.0.0"),
            ("01.002", "1.2"),
            ("1!2.0", "1!2.0"),
            ("1.0-alpha.1", "1.0a1"),
            ("1.0BETA2", "1.0b2"),
            ("1.0c3", "1.0rc3"),
            ("1.0preview", "1.0rc0"),
            ("1.0-1", "1.0.post1"),
            ("1.0.post-2", "1.0.post2"),
            ("1.0rev", "1.0.post0"),
            ("1.0_dev", "1.0.dev0"),
            ("1.0a1.post2.dev3", "1.0a1.post2.dev3"),
            ("1.0+Ubuntu-1", "1.0+ubuntu.1"),
            ("  2.3.4  ", "2.3.4"),
        ];

        for (input, expected) in cases {
            assert_eq!(v(input).to_string(), expected, "normalizing {}", input);
        }
    }

    #[test]
    fn test_parse_invalid() {
        for input in ["", "abc", "1.0.", "1..0", "1.0+", "1.0 rc1 x", "1.0+local+again"] {
            assert!(input.parse::<Version>().is_err(), "{} should not parse", input);
        }
    }

    #[test]
    fn test_segment_overflow() {
        let err = "99999999999999999999999.0".parse::<Version>().unwrap_err();
        assert!(matches!(err, VersionParseError::SegmentOverflow { .. }));
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1.0"), v("1.0.0.0"));
        assert_eq!(v("1.0a"), v("1.0a0"));
        assert_ne!(v("1.0"), v("1.0.post0"));
        assert_ne!(v("1.0"), v("1!1.0"));
    }

    #[test]
    fn test_total_ordering() {
        let ordered = [
            "1.0.dev456",
            "1.0a1",
            "1.0a2.dev456",
            "1.0a12.dev456",
            "1.0a12",
            "1.0b1.dev456",
            "1.0b2",
            "1.0b2.post345.dev456",
            "1.0b2.post345",
            "1.0rc1.dev456",
            "1.0rc1",
            "1.0",
            "1.0+abc.5",
            "1.0+abc.7",
            "1.0+5",
            "1.0.post456.dev34",
            "1.0.post456",
            "1.0.15",
            "1.1.dev1",
            "1!0.5",
        ];

        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_prerelease_flags() {
        assert!(v("1.0a1").is_prerelease());
        assert!(v("1.0.dev1").is_prerelease());
        assert!(!v("1.0.post1").is_prerelease());
        assert!(v("1.0.post1").is_postrelease());
        assert!(v("1.0+local").is_local());
        assert_eq!(v("1.0+local").without_local(), v("1.0"));
    }

    #[test]
    fn test_hash_consistent_with_eq() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(v("1.0"));
        assert!(set.contains(&v("1.0.0")));
        assert!(!set.contains(&v("1.0.1")));
    }

    #[test]
    fn test_builder() {
        let built = Version::new(vec![2, 1])
            .with_pre(PreReleaseKind::Rc, 1)
            .with_dev(0);
        assert_eq!(built, v("2.1rc1.dev0"));
        assert_eq!(Version::new(Vec::new()).to_string(), "0");
    }
}

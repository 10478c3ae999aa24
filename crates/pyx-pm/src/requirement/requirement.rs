use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use pyx_pep440::{Version, VersionSpecifiers};
use regex::Regex;

use super::marker::{MarkerEnvironment, MarkerTree};
use super::name::{normalize_name, PackageName};
use super::ParseError;

lazy_static! {
    static ref NAME_PREFIX: Regex = Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?").unwrap();
    static ref EXTRA_NAME: Regex = Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$").unwrap();
}

/// A dependency declaration: `name[extras] specifiers ; marker`.
///
/// The name and extras are stored normalized. Specifiers are kept in
/// declaration order until [`Requirement::normalize`] sorts them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Requirement {
    pub name: PackageName,
    pub specifiers: VersionSpecifiers,
    pub extras: BTreeSet<String>,
    pub marker: Option<MarkerTree>,
    /// Index identity this requirement is restricted to
    pub source: Option<String>,
}

impl Requirement {
    /// A requirement on `name` accepting any version
    pub fn any(name: PackageName) -> Self {
        Self {
            name,
            specifiers: VersionSpecifiers::new(),
            extras: BTreeSet::new(),
            marker: None,
            source: None,
        }
    }

    /// Parse a requirement string
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let (head, marker) = match input.split_once(';') {
            Some((head, marker)) => (head, Some(MarkerTree::parse(marker.trim())?)),
            None => (input, None),
        };
        let head = head.trim();

        let name_match = NAME_PREFIX
            .find(head)
            .ok_or_else(|| ParseError::InvalidName(head.to_string()))?;
        let name = PackageName::new(name_match.as_str())?;
        let mut rest = head[name_match.end()..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(after_open) = rest.strip_prefix('[') {
            let close = after_open
                .find(']')
                .ok_or_else(|| ParseError::UnbalancedExtras(input.to_string()))?;
            for extra in after_open[..close].split(',').map(str::trim) {
                if extra.is_empty() {
                    continue;
                }
                if !EXTRA_NAME.is_match(extra) {
                    return Err(ParseError::InvalidExtra {
                        requirement: input.to_string(),
                        extra: extra.to_string(),
                    });
                }
                extras.insert(normalize_name(extra));
            }
            rest = after_open[close + 1..].trim_start();
        }

        if rest.contains('[') || rest.contains(']') {
            return Err(ParseError::UnbalancedExtras(input.to_string()));
        }

        let specifiers = strip_parentheses(rest, input)?.parse::<VersionSpecifiers>()?;

        Ok(Self {
            name,
            specifiers,
            extras,
            marker,
            source: None,
        })
    }

    /// Restrict this requirement to one index
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Canonical form: specifiers sorted and deduplicated.
    ///
    /// Names and extras are normalized on construction, so this only
    /// touches the specifier set; applying it twice changes nothing.
    pub fn normalize(&self) -> Self {
        Self {
            specifiers: self.specifiers.normalize(),
            ..self.clone()
        }
    }

    /// Whether `version` satisfies every specifier
    pub fn satisfies(&self, version: &Version) -> bool {
        self.specifiers.contains(version)
    }

    /// Whether the marker holds in `env` with no extras activated
    pub fn evaluate_markers(&self, env: &MarkerEnvironment) -> bool {
        self.evaluate_markers_with(env, &BTreeSet::new())
    }

    /// Whether the marker holds in `env` with the given extras activated
    pub fn evaluate_markers_with(&self, env: &MarkerEnvironment, extras: &BTreeSet<String>) -> bool {
        self.marker
            .as_ref()
            .map_or(true, |marker| marker.evaluate(env, extras))
    }
}

fn strip_parentheses<'a>(specifiers: &'a str, input: &str) -> Result<&'a str, ParseError> {
    let trimmed = specifiers.trim();
    match (trimmed.strip_prefix('('), trimmed.ends_with(')')) {
        (Some(inner), true) => Ok(&inner[..inner.len() - 1]),
        (None, false) if !trimmed.contains('(') && !trimmed.contains(')') => Ok(trimmed),
        _ => Err(ParseError::Invalid(input.to_string())),
    }
}

impl FromStr for Requirement {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Requirement::parse(s)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        write!(f, "{}", self.specifiers)?;
        if let Some(marker) = &self.marker {
            write!(f, "; {}", marker)?;
        }
        Ok(())
    }
}

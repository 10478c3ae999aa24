//! Requirement model: package names, requirement specifiers and markers.

mod marker;
mod name;
mod requirement;

use pyx_pep440::{SpecifierParseError, VersionParseError};
use thiserror::Error;

pub use marker::{MarkerEnvironment, MarkerExpression, MarkerOperator, MarkerTree, MarkerValue, MarkerVariable};
pub use name::{normalize_name, PackageName};
pub use requirement::Requirement;

/// Malformed requirement, marker or version syntax
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid package name \"{0}\"")]
    InvalidName(String),
    #[error("Unbalanced extras in \"{0}\"")]
    UnbalancedExtras(String),
    #[error("Invalid extra \"{extra}\" in \"{requirement}\"")]
    InvalidExtra { requirement: String, extra: String },
    #[error("Invalid marker \"{marker}\": {reason}")]
    InvalidMarker { marker: String, reason: String },
    #[error("Invalid requirement \"{0}\"")]
    Invalid(String),
    #[error(transparent)]
    InvalidSpecifier(#[from] SpecifierParseError),
    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),
}

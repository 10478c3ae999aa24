//! PEP 440 version handling.
//!
//! Provides [`Version`] with the full release/pre/post/dev/local precedence
//! rules and [`VersionSpecifiers`] for matching versions against
//! comma separated specifier sets such as `>=1.0,!=1.3.*,<2`.
//!
//! ```
//! use pyx_pep440::{Version, VersionSpecifiers};
//!
//! let specs: VersionSpecifiers = ">=1.0,<2".parse().unwrap();
//! let version: Version = "1.5".parse().unwrap();
//! assert!(specs.contains(&version));
//! ```

pub mod specifier;
pub mod version;

pub use specifier::{Operator, SpecifierParseError, VersionSpecifier, VersionSpecifiers};
pub use version::{LocalSegment, PreRelease, PreReleaseKind, Version, VersionParseError};

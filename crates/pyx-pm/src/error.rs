use thiserror::Error;

use crate::hash::HashError;
use crate::integrity::IntegrityError;
use crate::provider::ProviderError;
use crate::requirement::ParseError;
use crate::solver::ConflictReport;

/// Errors surfaced by resolution, locking and verification
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Package \"{0}\" not found")]
    NotFound(String),

    #[error("Metadata lookup for \"{name}\" failed after {attempts} attempts: {message}")]
    Transient {
        name: String,
        attempts: u32,
        message: String,
    },

    #[error("{0}")]
    Conflict(Box<ConflictReport>),

    #[error("Invalid lock file: {0}")]
    Format(String),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("Resolution was cancelled")]
    Cancelled,

    #[error("Resolution gave up after {0} decisions")]
    ResolutionTooDeep(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is a resolution conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// The conflict report, if this is a conflict
    pub fn conflict(&self) -> Option<&ConflictReport> {
        match self {
            Error::Conflict(report) => Some(report),
            _ => None,
        }
    }
}

impl From<ConflictReport> for Error {
    fn from(report: ConflictReport) -> Self {
        Error::Conflict(Box::new(report))
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(name) => Error::NotFound(name),
            ProviderError::Transient { name, message } => Error::Transient {
                name,
                attempts: 1,
                message,
            },
        }
    }
}

impl From<HashError> for Error {
    fn from(err: HashError) -> Self {
        Error::Format(err.to_string())
    }
}

/// Result type for pyx-pm operations
pub type Result<T> = std::result::Result<T, Error>;

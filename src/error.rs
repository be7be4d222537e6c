//! Error types for the deployment engine.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Why a tag/branch/commit selection was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefSpecError {
    /// None of tag, branch or commit was supplied.
    #[error("InvalidUsage. Missing parameter: tag or branch or commit")]
    Missing,

    /// More than one selector was supplied.
    #[error("InvalidUsage. Invalid parameter: {0}")]
    Conflicting(&'static str),
}

/// Top-level error type for deployment operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Zero or more than one of tag/branch/commit was supplied.
    #[error("{0}")]
    InvalidRefSpec(#[from] RefSpecError),

    /// A required request parameter was absent.
    #[error("InvalidUsage. Missing parameter: {0}")]
    MissingParameter(String),

    /// A request parameter was present but unusable.
    #[error("InvalidUsage. Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The origin could not be contacted.
    #[error("Origin does not exist: {origin}: {reason}")]
    OriginUnreachable { origin: String, reason: String },

    /// Fetching heads from the origin failed.
    #[error("Cannot fetch data from origin: {origin}: {reason}")]
    FetchFailed { origin: String, reason: String },

    /// The requested tag, branch or default branch does not exist on the origin.
    #[error("{reference} not found on that origin: {origin}")]
    RefNotFound { reference: String, origin: String },

    /// The ref kind cannot be resolved by this engine.
    #[error("unsupported ref kind: {0}")]
    UnsupportedRefKind(String),

    /// The slot already points at a different clone and no update was requested.
    #[error("slot {slot} already exists pointing to {existing}")]
    SlotConflict { slot: PathBuf, existing: PathBuf },

    /// A stale or conflicting slot symlink could not be removed.
    #[error("cannot repair slot {slot}: {reason}")]
    SlotUnrepairable { slot: PathBuf, reason: String },

    /// No supported project manifest was found.
    #[error("unrecognized project type at {0}")]
    UnrecognizedProjectType(PathBuf),

    /// An install tool exited non-zero.
    #[error("setup step '{step}' failed with {status}: {stderr}")]
    SetupFailed {
        step: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Git operation failed outside the classified acquisition steps.
    #[error("git operation failed: {0}")]
    Git(String),

    /// Creating or activating a venv failed.
    #[error("venv error at {venv}: {reason}")]
    Venv { venv: PathBuf, reason: String },

    /// A generated lifecycle script is absent.
    #[error("lifecycle script not found: {0}")]
    MissingScript(PathBuf),

    /// A synchronously run lifecycle script exited non-zero.
    #[error("{script} exited with {status}")]
    ScriptFailed { script: PathBuf, status: ExitStatus },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for failures caused by the caller's input rather than the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidRefSpec(_) | Error::MissingParameter(_) | Error::InvalidParameter(_)
        )
    }

    /// HTTP-style status class for the front end: 400 for validation, 500 otherwise.
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }
}

/// Result type alias for deployment operations.
pub type Result<T> = std::result::Result<T, Error>;

use crate::pkg::PkgError;
use thiserror::Error;

/// Pipeline-level failures. Everything else becomes a finding.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to collect checks, or no checks found")]
    NoChecks,

    #[error("Duplicate check name: {0}")]
    DuplicateCheck(String),

    #[error("Check registered as '{registered}' was built as '{built}'")]
    MalformedCheck { registered: String, built: String },

    #[error("Package not found: {name}")]
    PackageNotFound { name: String },

    #[error(transparent)]
    Pkg(#[from] PkgError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

//! Error types shared by the engine and its collaborators.
//!
//! Collaborators ([`crate::contract::BuildSystem`], [`crate::contract::Transport`])
//! answer with a [`RemoteError`] that says whether the fault is worth retrying.
//! The engine wraps those into a [`DepchainError`] tagged with the [`Stage`] it
//! was in, so an outer scheduler can decide whether to re-run the operation.

use std::fmt;

use thiserror::Error;

/// A fault reported by a remote system (build system or store).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure, timeout or 5xx answer.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The remote rejected the request and will keep rejecting it.
    #[error("permanent remote failure: {0}")]
    Permanent(String),

    /// The addressed record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The record being created already exists.
    #[error("already exists: {0}")]
    Conflict(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// The step of an operation in which a fault happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Mapping a tag to a release or checking that the release exists.
    Resolve,
    /// Reading builds, artifacts, build roots or requirements.
    Derive,
    /// Reading relationships from the store.
    Fetch,
    /// Writing components or relationships to the store.
    Create,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Derive => "derive",
            Stage::Fetch => "fetch",
            Stage::Create => "create",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the reconciliation engine.
#[derive(Error, Debug)]
pub enum DepchainError {
    /// A collaborator failed while the engine was in `stage`.
    #[error("{stage} failed: {source}")]
    Remote {
        stage: Stage,
        #[source]
        source: RemoteError,
    },

    /// The release a tag maps to has no record in the store.
    #[error("release '{release}' does not exist in the store")]
    MissingRelease { release: String },

    /// A payload could not be decoded into the expected shape.
    #[error("{stage} failed: malformed payload: {reason}")]
    Malformed { stage: Stage, reason: String },
}

impl DepchainError {
    pub fn remote(stage: Stage, source: RemoteError) -> Self {
        DepchainError::Remote { stage, source }
    }

    pub fn malformed(stage: Stage, reason: impl Into<String>) -> Self {
        DepchainError::Malformed {
            stage,
            reason: reason.into(),
        }
    }

    /// The stage the failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            DepchainError::Remote { stage, .. } | DepchainError::Malformed { stage, .. } => *stage,
            DepchainError::MissingRelease { .. } => Stage::Resolve,
        }
    }

    /// True when re-running the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DepchainError::Remote { source, .. } => source.is_transient(),
            DepchainError::MissingRelease { .. } | DepchainError::Malformed { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DepchainError>;

//! Error taxonomy for the matching and resolution core.
//!
//! Validation and not-found errors surface immediately with no partial
//! mutation. Storage failures surface as [`Error::Internal`]; each write is
//! independent and there are no cross-write transactions to roll back.
//! Transport (email) failures are intentionally absent here: the mail
//! adapter absorbs them into a [`crate::mail::SendOutcome`], committed state
//! stands, and the failure travels back to the caller as response metadata.

use thiserror::Error;

/// Errors surfaced across the operation boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced alert or item does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Malformed or missing input, including a decision attempted on an
    /// alert that is no longer pending.
    #[error("{0}")]
    Validation(String),

    /// The caller is not the owner of the targeted item.
    #[error("{0}")]
    Forbidden(&'static str),

    /// Storage unavailable or misbehaving.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

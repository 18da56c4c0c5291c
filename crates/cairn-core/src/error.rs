//! Error taxonomy for repository operations

use crate::instance::Guid;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using Cairn's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Repository error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(Guid),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(Guid),

    #[error("Only an entity proxy is held for: {0}")]
    EntityProxyOnly(Guid),

    #[error("Instance already deleted: {0}")]
    AlreadyDeleted(Guid),

    #[error("Instance is not deleted: {0}")]
    NotDeleted(Guid),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Property mismatch: {0}")]
    PropertyMismatch(String),

    #[error("Classification mismatch: {0}")]
    ClassificationMismatch(String),

    #[error("Function not supported by this repository: {0}")]
    FunctionNotSupported(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// One secondary failure swallowed during a best-effort cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeFailure {
    /// Relationship the cascade step was processing
    pub guid: Guid,
    pub reason: String,
}

/// Result of an operation whose secondary effects are best-effort
///
/// The primary state change always completes; failures while processing
/// dependent relationships are collected here instead of aborting it.
#[derive(Debug, Clone)]
pub struct CascadeOutcome<T> {
    pub primary: T,
    pub failures: Vec<CascadeFailure>,
}

impl<T> CascadeOutcome<T> {
    pub fn clean(primary: T) -> Self {
        Self {
            primary,
            failures: Vec::new(),
        }
    }
}

use thiserror::Error;

use super::Reference;

/// Errors that can occur when reading or writing through a document store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Document not found: {reference}")]
    NotFound { reference: Reference },
    #[error("{entity} has no document reference")]
    MissingReference { entity: &'static str },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Transaction conflict: {0}")]
    Conflict(String),
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub(crate) fn not_found(reference: &Reference) -> Self {
        Self::NotFound {
            reference: reference.clone(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

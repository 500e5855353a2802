//! Domain errors. Used by ports, adapters and use cases.
//!
//! Store failures keep the driver's error as their source so callers see
//! exactly what the database raised.

use crate::utils::time::FormatError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Format(#[from] FormatError),
}

impl DomainError {
    /// Wrap a persistence-layer error without translating it.
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store(Box::new(err))
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRecord(err.to_string())
    }
}

use bookscout_api::{CatalogError, Retryable};
use bookscout_store::StoreError;
use thiserror::Error;

/// All the ways a BookScout operation can fail
#[derive(Error, Debug)]
pub enum Error {
    #[error("Catalog request failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Local storage failed: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Book not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Whether asking again later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Catalog(e) => e.is_retryable(),
            Error::Store(StoreError::Database(_)) => true,
            _ => false,
        }
    }
}

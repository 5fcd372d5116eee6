use lockbox_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Migration incomplete: expected {expected} records, found {found}")]
    MigrationIncomplete { expected: u64, found: u64 },

    #[error("Legacy store error: {0}")]
    Legacy(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Schema migration error: {0}")]
    Schema(String),
}

impl StoreError {
    pub(crate) fn empty_field(field: &str) -> Self {
        StoreError::Validation(format!("{field} must not be empty"))
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(String),

    #[error("core error: {0}")]
    Core(#[from] pairsort_core::CoreError),
}

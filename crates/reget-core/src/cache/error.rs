use thiserror::Error;

/// Cache store failure. Invalid keys and values are caller bugs and are
/// reported as soon as they reach the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
    #[error("invalid cache value: {0}")]
    InvalidValue(String),
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache row encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

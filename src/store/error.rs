use thiserror::Error;

/// Errors reported by an execution store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("execution not found: {0}")]
    NotFound(i64),

    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

use thiserror::Error;

/// Errors from object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for taplog_common::TaplogError {
    fn from(e: StoreError) -> Self {
        taplog_common::TaplogError::Store(e.to_string())
    }
}

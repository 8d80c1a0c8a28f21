use thiserror::Error;

pub type Result<T> = std::result::Result<T, PortalError>;

/// Field-level reason a submission was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid category: {0}")]
    InvalidCategory(String),

    #[error("rating must be a whole number from 1 to 5, got {0}")]
    InvalidRating(f64),

    #[error("feedback text must not be empty")]
    EmptyText,
}

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<sqlx::Error> for PortalError {
    fn from(err: sqlx::Error) -> Self {
        PortalError::StorageError(err.to_string())
    }
}

use sigdesk_storage::StorageError;
use thiserror::Error;

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Identity-layer errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Unknown username or wrong password. Deliberately carries no detail
    /// so callers cannot distinguish the two.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token rejected: {0}")]
    TokenRejected(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

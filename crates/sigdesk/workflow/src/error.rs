use sigdesk_chat::ChatError;
use sigdesk_storage::StorageError;
use thiserror::Error;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Workflow-layer errors. `Conflict` carries the workflow invariants:
/// duplicate pending requests, re-adjudication, double consumption.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for WorkflowError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(detail) => WorkflowError::NotFound(detail),
            StorageError::Conflict(detail) => WorkflowError::Conflict(detail),
            other => WorkflowError::Storage(other),
        }
    }
}

//! Sigdesk Service - the unified application facade
//!
//! One construction point for every sigdesk component, sharing a single
//! storage backend and object store. The HTTP daemon talks only to this
//! crate; errors from every layer funnel into [`SigdeskError`] so the
//! boundary has one type to map onto status codes.

#![deny(unsafe_code)]

mod directory;
mod seed;

pub use directory::{DirectoryService, UserUpdate};
pub use seed::seed_defaults;

use sigdesk_chat::{ChatError, ChatService};
use sigdesk_export::{ExportError, ExportService};
use sigdesk_identity::{IdentityError, IdentityService, TokenSigner};
use sigdesk_notify::{NotificationService, NotifyError};
use sigdesk_storage::{ObjectStore, SigdeskStorage, StorageError};
use sigdesk_workflow::{SignatureService, WorkflowError, WorkflowService};
use std::sync::Arc;
use thiserror::Error;

pub type SigdeskResult<T> = Result<T, SigdeskError>;

/// The unified error surface. Variants map 1:1 onto the boundary's status
/// codes; layer errors are normalized into them on the way up.
#[derive(Debug, Error)]
pub enum SigdeskError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for SigdeskError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(d) => SigdeskError::NotFound(d),
            StorageError::Conflict(d) => SigdeskError::Conflict(d),
            StorageError::InvalidInput(d) => SigdeskError::Validation(d),
            other => SigdeskError::Internal(other.to_string()),
        }
    }
}

impl From<IdentityError> for SigdeskError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials | IdentityError::TokenRejected(_) => {
                SigdeskError::Unauthorized
            }
            IdentityError::NotFound(d) => SigdeskError::NotFound(d),
            IdentityError::Validation(d) => SigdeskError::Validation(d),
            IdentityError::Hash(d) => SigdeskError::Internal(d),
            IdentityError::Storage(e) => e.into(),
        }
    }
}

impl From<WorkflowError> for SigdeskError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Forbidden(d) => SigdeskError::Forbidden(d),
            WorkflowError::NotFound(d) => SigdeskError::NotFound(d),
            WorkflowError::Conflict(d) => SigdeskError::Conflict(d),
            WorkflowError::Validation(d) => SigdeskError::Validation(d),
            WorkflowError::Chat(e) => e.into(),
            WorkflowError::Storage(e) => e.into(),
        }
    }
}

impl From<ChatError> for SigdeskError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation(d) => SigdeskError::Validation(d),
            ChatError::NotFound(d) => SigdeskError::NotFound(d),
            ChatError::NoSupportStaff => {
                SigdeskError::Conflict("no support staff available".to_string())
            }
            ChatError::Storage(e) => e.into(),
        }
    }
}

impl From<NotifyError> for SigdeskError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::NotFound(d) => SigdeskError::NotFound(d),
            NotifyError::Storage(e) => e.into(),
        }
    }
}

impl From<ExportError> for SigdeskError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Forbidden(d) => SigdeskError::Forbidden(d),
            ExportError::Validation(d) => SigdeskError::Validation(d),
            ExportError::Archive(e) => SigdeskError::Internal(e.to_string()),
            ExportError::Storage(e) => e.into(),
        }
    }
}

/// The assembled application.
pub struct SigdeskService {
    identity: IdentityService,
    directory: DirectoryService,
    signatures: SignatureService,
    workflow: WorkflowService,
    chat: ChatService,
    notifications: NotificationService,
    export: ExportService,
}

impl SigdeskService {
    pub fn new(
        storage: Arc<dyn SigdeskStorage>,
        objects: Arc<dyn ObjectStore>,
        signer: TokenSigner,
    ) -> Self {
        Self {
            identity: IdentityService::new(storage.clone(), signer),
            directory: DirectoryService::new(storage.clone()),
            signatures: SignatureService::new(storage.clone(), objects.clone()),
            workflow: WorkflowService::new(storage.clone(), objects.clone()),
            chat: ChatService::new(storage.clone()),
            notifications: NotificationService::new(storage.clone()),
            export: ExportService::new(storage, objects),
        }
    }

    pub fn identity(&self) -> &IdentityService {
        &self.identity
    }

    pub fn directory(&self) -> &DirectoryService {
        &self.directory
    }

    pub fn signatures(&self) -> &SignatureService {
        &self.signatures
    }

    pub fn workflow(&self) -> &WorkflowService {
        &self.workflow
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    pub fn export(&self) -> &ExportService {
        &self.export
    }
}

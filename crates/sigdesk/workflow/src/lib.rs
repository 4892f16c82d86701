//! Sigdesk Workflow - signature records and the approval workflow
//!
//! Two services live here. [`SignatureService`] owns signature records and
//! their attachments, including the direct update/delete paths available to
//! owners and privileged roles. [`WorkflowService`] owns the request
//! lifecycle: owners ask for an edit or a deletion, privileged users
//! adjudicate, and an approved edit opens a one-time edit window that is
//! consumed on use.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
mod requests;
mod signatures;

pub use error::{WorkflowError, WorkflowResult};
pub use requests::{EditGate, WorkflowService};
pub use signatures::{SignatureService, ALLOWED_MIME_TYPES, MAX_ATTACHMENT_BYTES};

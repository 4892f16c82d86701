//! Sigdesk storage abstractions.
//!
//! This crate defines the persistence contract for sigdesk components:
//! - directory records (users, sectors)
//! - signature records with attachment metadata
//! - workflow requests and their conditional state transitions
//! - chat messages
//! - attachment bytes behind an object-store trait
//!
//! Design stance:
//! - The relational-style record store is the source of truth.
//! - Object storage is best-effort; a failed object delete leaves an
//!   orphaned blob, not a correctness violation.
//! - The workflow invariants ("at most one pending request per signature",
//!   "an approved edit is consumed exactly once") live here as single
//!   conditional operations, not as caller-side check-then-act sequences.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod object;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryObjectStore, InMemoryStorage};
pub use object::ObjectStore;
pub use traits::{
    AttachmentStore, ChatStore, QueryWindow, RequestFilter, RequestStore, SectorStore,
    SigdeskStorage, SignatureFilter, SignatureStore, UserStore,
};

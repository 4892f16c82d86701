//! Sigdesk Identity - authentication and credential management
//!
//! Sessions are stateless JWTs signed with a shared secret. A small
//! read-through cache keeps token verification off the hot path; storage
//! remains authoritative for the user's current role and existence.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
mod password;
mod service;
mod token;

pub use error::{IdentityError, IdentityResult};
pub use password::{hash_password, verify_password};
pub use service::{IdentityService, LoginOutcome};
pub use token::TokenSigner;

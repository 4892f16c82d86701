use crate::{IdentityError, IdentityResult};
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;

/// Hash a cleartext secret with argon2id and a fresh random salt.
pub fn hash_password(cleartext: &str) -> IdentityResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(cleartext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::Hash(e.to_string()))
}

/// Verify a cleartext secret against a stored argon2 hash. A malformed
/// stored hash verifies as false rather than erroring.
pub fn verify_password(cleartext: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(cleartext.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

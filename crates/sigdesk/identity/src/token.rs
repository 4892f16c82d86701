use crate::{IdentityError, IdentityResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sigdesk_types::{Actor, Role, User, UserId};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    username: String,
    role: Role,
    iat: i64,
    exp: i64,
}

/// Issues and verifies HS256 session tokens.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> IdentityResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.0.clone(),
            username: user.username.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| IdentityError::TokenRejected(e.to_string()))
    }

    /// Decode and validate a token, returning the actor it names. Expiry is
    /// enforced here; existence and current role are the caller's problem.
    pub fn verify(&self, token: &str) -> IdentityResult<Actor> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| IdentityError::TokenRejected(e.to_string()))?;
        Ok(Actor {
            user_id: UserId::new(data.claims.sub),
            username: data.claims.username,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigdesk_types::SectorId;

    fn sample_user() -> User {
        User {
            id: UserId::generate(),
            username: "alice".to_string(),
            name: "Alice".to_string(),
            password_hash: String::new(),
            role: Role::Admin,
            sector_id: SectorId::generate(),
            first_login: false,
            security_question: None,
            security_answer_hash: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issue_then_verify() {
        let signer = TokenSigner::new("test-secret", Duration::hours(8));
        let user = sample_user();
        let token = signer.issue(&user).unwrap();
        let actor = signer.verify(&token).unwrap();
        assert_eq!(actor.user_id, user.id);
        assert_eq!(actor.username, "alice");
        assert_eq!(actor.role, Role::Admin);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let signer = TokenSigner::new("secret-a", Duration::hours(8));
        let other = TokenSigner::new("secret-b", Duration::hours(8));
        let token = signer.issue(&sample_user()).unwrap();
        assert!(matches!(
            other.verify(&token),
            Err(IdentityError::TokenRejected(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = TokenSigner::new("test-secret", Duration::seconds(-120));
        let token = signer.issue(&sample_user()).unwrap();
        assert!(matches!(
            signer.verify(&token),
            Err(IdentityError::TokenRejected(_))
        ));
    }
}

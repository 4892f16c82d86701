use crate::password::{hash_password, verify_password};
use crate::token::TokenSigner;
use crate::{IdentityError, IdentityResult};
use sigdesk_storage::SigdeskStorage;
use sigdesk_types::{Actor, User};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

const MIN_PASSWORD_LEN: usize = 6;

/// What a successful login hands back to the boundary.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
    /// The caller must change their password before doing anything else.
    pub must_change_password: bool,
}

struct CachedActor {
    actor: Actor,
    verified_at: Instant,
}

/// Authentication service over the user store.
///
/// Token verification results are cached for a short window. The cache is
/// read-through and never authoritative: entries expire quickly and a miss
/// always goes back to the signature check plus a storage lookup, so role
/// changes and deletions take effect within the cache window.
pub struct IdentityService {
    storage: Arc<dyn SigdeskStorage>,
    signer: TokenSigner,
    cache: RwLock<HashMap<String, CachedActor>>,
    cache_ttl: Duration,
}

impl IdentityService {
    pub fn new(storage: Arc<dyn SigdeskStorage>, signer: TokenSigner) -> Self {
        Self {
            storage,
            signer,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(300),
        }
    }

    #[cfg(test)]
    fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Verify credentials and issue a session token.
    pub async fn login(&self, username: &str, password: &str) -> IdentityResult<LoginOutcome> {
        let user = self
            .storage
            .get_user_by_username(username)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;
        if !verify_password(password, &user.password_hash) {
            tracing::debug!(username, "login rejected");
            return Err(IdentityError::InvalidCredentials);
        }
        let token = self.signer.issue(&user)?;
        tracing::info!(user_id = %user.id, username, "user logged in");
        Ok(LoginOutcome {
            token,
            must_change_password: user.first_login,
            user,
        })
    }

    /// Resolve a bearer token to an actor.
    pub async fn authenticate(&self, token: &str) -> IdentityResult<Actor> {
        if let Ok(guard) = self.cache.read() {
            if let Some(cached) = guard.get(token) {
                if cached.verified_at.elapsed() < self.cache_ttl {
                    return Ok(cached.actor.clone());
                }
            }
        }

        let claimed = self.signer.verify(token)?;
        // Storage stays authoritative for existence and current role.
        let user = self
            .storage
            .get_user(&claimed.user_id)
            .await?
            .ok_or_else(|| IdentityError::TokenRejected("user no longer exists".to_string()))?;
        let actor = Actor {
            user_id: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
        };

        if let Ok(mut guard) = self.cache.write() {
            guard.retain(|_, c| c.verified_at.elapsed() < self.cache_ttl);
            guard.insert(
                token.to_string(),
                CachedActor {
                    actor: actor.clone(),
                    verified_at: Instant::now(),
                },
            );
        }
        Ok(actor)
    }

    /// Change the caller's own password. Clears the first-login flag.
    pub async fn change_password(
        &self,
        actor: &Actor,
        current_password: &str,
        new_password: &str,
    ) -> IdentityResult<()> {
        validate_password(new_password)?;
        let mut user = self.require_user(actor).await?;
        if !verify_password(current_password, &user.password_hash) {
            return Err(IdentityError::InvalidCredentials);
        }
        user.password_hash = hash_password(new_password)?;
        user.first_login = false;
        self.storage.update_user(user).await?;
        tracing::info!(user_id = %actor.user_id, "password changed");
        Ok(())
    }

    /// Set or replace the caller's security question and answer.
    pub async fn set_security_question(
        &self,
        actor: &Actor,
        question: &str,
        answer: &str,
    ) -> IdentityResult<()> {
        let question = question.trim();
        let answer = answer.trim();
        if question.is_empty() || answer.is_empty() {
            return Err(IdentityError::Validation(
                "security question and answer must not be empty".to_string(),
            ));
        }
        let mut user = self.require_user(actor).await?;
        user.security_question = Some(question.to_string());
        // Answers are compared case-insensitively, so normalize before hashing.
        user.security_answer_hash = Some(hash_password(&answer.to_lowercase())?);
        self.storage.update_user(user).await?;
        Ok(())
    }

    /// The recovery question for a username, if one is configured. Exposed
    /// without authentication; reveals nothing beyond the question text.
    pub async fn security_question(&self, username: &str) -> IdentityResult<Option<String>> {
        let user = self
            .storage
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| IdentityError::NotFound(format!("user {}", username)))?;
        Ok(user.security_question)
    }

    /// Reset a forgotten password by answering the security question.
    pub async fn reset_password(
        &self,
        username: &str,
        answer: &str,
        new_password: &str,
    ) -> IdentityResult<()> {
        validate_password(new_password)?;
        let mut user = self
            .storage
            .get_user_by_username(username)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;
        let stored = user
            .security_answer_hash
            .as_deref()
            .ok_or(IdentityError::InvalidCredentials)?;
        if !verify_password(&answer.trim().to_lowercase(), stored) {
            return Err(IdentityError::InvalidCredentials);
        }
        user.password_hash = hash_password(new_password)?;
        user.first_login = false;
        self.storage.update_user(user).await?;
        tracing::info!(username, "password reset via security question");
        Ok(())
    }

    async fn require_user(&self, actor: &Actor) -> IdentityResult<User> {
        self.storage
            .get_user(&actor.user_id)
            .await?
            .ok_or_else(|| IdentityError::NotFound(format!("user {}", actor.user_id)))
    }
}

fn validate_password(password: &str) -> IdentityResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(IdentityError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigdesk_storage::{InMemoryStorage, UserStore};
    use sigdesk_types::{Role, SectorId, UserId};

    async fn seeded_service() -> (IdentityService, User) {
        let storage = Arc::new(InMemoryStorage::new());
        let user = User {
            id: UserId::generate(),
            username: "alice".to_string(),
            name: "Alice".to_string(),
            password_hash: hash_password("hunter22").unwrap(),
            role: Role::Common,
            sector_id: SectorId::generate(),
            first_login: true,
            security_question: None,
            security_answer_hash: None,
            created_at: Utc::now(),
        };
        storage.create_user(user.clone()).await.unwrap();
        let signer = TokenSigner::new("test-secret", chrono::Duration::hours(8));
        (IdentityService::new(storage, signer), user)
    }

    #[tokio::test]
    async fn login_and_authenticate() {
        let (service, user) = seeded_service().await;
        let outcome = service.login("alice", "hunter22").await.unwrap();
        assert!(outcome.must_change_password);
        let actor = service.authenticate(&outcome.token).await.unwrap();
        assert_eq!(actor.user_id, user.id);
        assert_eq!(actor.role, Role::Common);
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let (service, _) = seeded_service().await;
        assert!(matches!(
            service.login("alice", "wrong").await,
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            service.login("nobody", "hunter22").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn change_password_clears_first_login() {
        let (service, user) = seeded_service().await;
        let outcome = service.login("alice", "hunter22").await.unwrap();
        let actor = service.authenticate(&outcome.token).await.unwrap();

        service
            .change_password(&actor, "hunter22", "new-secret")
            .await
            .unwrap();

        let relogin = service.login("alice", "new-secret").await.unwrap();
        assert!(!relogin.must_change_password);
        assert!(matches!(
            service.login("alice", "hunter22").await,
            Err(IdentityError::InvalidCredentials)
        ));
        assert_eq!(relogin.user.id, user.id);
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let (service, _) = seeded_service().await;
        let outcome = service.login("alice", "hunter22").await.unwrap();
        let actor = service.authenticate(&outcome.token).await.unwrap();
        assert!(matches!(
            service.change_password(&actor, "hunter22", "abc").await,
            Err(IdentityError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn security_question_reset_flow() {
        let (service, _) = seeded_service().await;
        let outcome = service.login("alice", "hunter22").await.unwrap();
        let actor = service.authenticate(&outcome.token).await.unwrap();

        service
            .set_security_question(&actor, "first pet?", "Rex")
            .await
            .unwrap();
        assert_eq!(
            service.security_question("alice").await.unwrap().as_deref(),
            Some("first pet?")
        );

        // Answer matching ignores case and surrounding whitespace.
        service
            .reset_password("alice", " rex ", "recovered-pw")
            .await
            .unwrap();
        service.login("alice", "recovered-pw").await.unwrap();

        assert!(matches!(
            service.reset_password("alice", "fido", "another-pw").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn expired_cache_entry_rechecks_storage() {
        let storage = Arc::new(InMemoryStorage::new());
        let user = User {
            id: UserId::generate(),
            username: "bob".to_string(),
            name: "Bob".to_string(),
            password_hash: hash_password("hunter22").unwrap(),
            role: Role::Common,
            sector_id: SectorId::generate(),
            first_login: false,
            security_question: None,
            security_answer_hash: None,
            created_at: Utc::now(),
        };
        storage.create_user(user.clone()).await.unwrap();
        let signer = TokenSigner::new("test-secret", chrono::Duration::hours(8));
        let service = IdentityService::new(storage.clone(), signer)
            .with_cache_ttl(Duration::from_millis(0));

        let outcome = service.login("bob", "hunter22").await.unwrap();
        service.authenticate(&outcome.token).await.unwrap();

        storage.delete_user(&user.id).await.unwrap();
        assert!(matches!(
            service.authenticate(&outcome.token).await,
            Err(IdentityError::TokenRejected(_))
        ));
    }
}

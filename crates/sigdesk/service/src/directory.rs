use crate::{SigdeskError, SigdeskResult};
use chrono::Utc;
use sigdesk_identity::hash_password;
use sigdesk_storage::{QueryWindow, SigdeskStorage};
use sigdesk_types::{Actor, Role, Sector, SectorId, User, UserId};
use std::sync::Arc;

/// Parameters for a user update. Unset fields are left alone.
#[derive(Debug, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub sector_id: Option<SectorId>,
    /// Setting a password re-arms the first-login flag.
    pub password: Option<String>,
}

/// Administration of users and sectors. Every operation here is
/// privileged-only; COMMON users never manage the directory.
pub struct DirectoryService {
    storage: Arc<dyn SigdeskStorage>,
}

impl DirectoryService {
    pub fn new(storage: Arc<dyn SigdeskStorage>) -> Self {
        Self { storage }
    }

    pub async fn create_user(
        &self,
        actor: &Actor,
        username: &str,
        name: &str,
        password: &str,
        role: Role,
        sector_id: SectorId,
    ) -> SigdeskResult<User> {
        require_privileged(actor)?;
        let username = non_empty(username, "username")?;
        let name = non_empty(name, "name")?;
        if password.len() < 6 {
            return Err(SigdeskError::Validation(
                "password must be at least 6 characters".to_string(),
            ));
        }
        self.storage
            .get_sector(&sector_id)
            .await?
            .ok_or_else(|| SigdeskError::NotFound(format!("sector {}", sector_id)))?;

        let user = User {
            id: UserId::generate(),
            username,
            name,
            password_hash: hash_password(password)?,
            role,
            sector_id,
            first_login: true,
            security_question: None,
            security_answer_hash: None,
            created_at: Utc::now(),
        };
        self.storage.create_user(user.clone()).await?;
        tracing::info!(user = %user.id, username = %user.username, role = ?role, "user created");
        Ok(user)
    }

    pub async fn list_users(&self, actor: &Actor, window: QueryWindow) -> SigdeskResult<Vec<User>> {
        require_privileged(actor)?;
        Ok(self.storage.list_users(window).await?)
    }

    pub async fn get_user(&self, actor: &Actor, id: &UserId) -> SigdeskResult<User> {
        if !actor.is_privileged() && &actor.user_id != id {
            return Err(SigdeskError::Forbidden(
                "only privileged users may view other accounts".to_string(),
            ));
        }
        self.storage
            .get_user(id)
            .await?
            .ok_or_else(|| SigdeskError::NotFound(format!("user {}", id)))
    }

    pub async fn update_user(
        &self,
        actor: &Actor,
        id: &UserId,
        update: UserUpdate,
    ) -> SigdeskResult<User> {
        require_privileged(actor)?;
        let mut user = self
            .storage
            .get_user(id)
            .await?
            .ok_or_else(|| SigdeskError::NotFound(format!("user {}", id)))?;

        if let Some(username) = update.username {
            user.username = non_empty(&username, "username")?;
        }
        if let Some(name) = update.name {
            user.name = non_empty(&name, "name")?;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(sector_id) = update.sector_id {
            self.storage
                .get_sector(&sector_id)
                .await?
                .ok_or_else(|| SigdeskError::NotFound(format!("sector {}", sector_id)))?;
            user.sector_id = sector_id;
        }
        if let Some(password) = update.password {
            if password.len() < 6 {
                return Err(SigdeskError::Validation(
                    "password must be at least 6 characters".to_string(),
                ));
            }
            user.password_hash = hash_password(&password)?;
            user.first_login = true;
        }
        self.storage.update_user(user.clone()).await?;
        Ok(user)
    }

    /// Deletion is refused while the user still owns signatures or
    /// requests; those records carry the user's name and history.
    pub async fn delete_user(&self, actor: &Actor, id: &UserId) -> SigdeskResult<()> {
        require_privileged(actor)?;
        if &actor.user_id == id {
            return Err(SigdeskError::Conflict(
                "cannot delete your own account".to_string(),
            ));
        }
        let signatures = self.storage.count_signatures_for_user(id).await?;
        if signatures > 0 {
            return Err(SigdeskError::Conflict(format!(
                "user still owns {} signatures",
                signatures
            )));
        }
        let requests = self.storage.count_requests_for_user(id).await?;
        if requests > 0 {
            return Err(SigdeskError::Conflict(format!(
                "user still owns {} requests",
                requests
            )));
        }
        if !self.storage.delete_user(id).await? {
            return Err(SigdeskError::NotFound(format!("user {}", id)));
        }
        tracing::info!(user = %id, by = %actor.user_id, "user deleted");
        Ok(())
    }

    pub async fn create_sector(
        &self,
        actor: &Actor,
        name: &str,
        description: &str,
    ) -> SigdeskResult<Sector> {
        require_privileged(actor)?;
        let sector = Sector {
            id: SectorId::generate(),
            name: non_empty(name, "name")?,
            description: description.trim().to_string(),
        };
        self.storage.create_sector(sector.clone()).await?;
        Ok(sector)
    }

    /// Sectors are readable by everyone; signature creation needs them.
    pub async fn list_sectors(&self) -> SigdeskResult<Vec<Sector>> {
        Ok(self.storage.list_sectors().await?)
    }

    pub async fn update_sector(
        &self,
        actor: &Actor,
        id: &SectorId,
        name: &str,
        description: &str,
    ) -> SigdeskResult<Sector> {
        require_privileged(actor)?;
        let mut sector = self
            .storage
            .get_sector(id)
            .await?
            .ok_or_else(|| SigdeskError::NotFound(format!("sector {}", id)))?;
        sector.name = non_empty(name, "name")?;
        sector.description = description.trim().to_string();
        self.storage.update_sector(sector.clone()).await?;
        Ok(sector)
    }

    /// Deletion is refused while any user or signature still references
    /// the sector.
    pub async fn delete_sector(&self, actor: &Actor, id: &SectorId) -> SigdeskResult<()> {
        require_privileged(actor)?;
        let users = self.storage.count_users_in_sector(id).await?;
        if users > 0 {
            return Err(SigdeskError::Conflict(format!(
                "sector still has {} users",
                users
            )));
        }
        let signatures = self.storage.count_signatures_in_sector(id).await?;
        if signatures > 0 {
            return Err(SigdeskError::Conflict(format!(
                "sector still has {} signatures",
                signatures
            )));
        }
        if !self.storage.delete_sector(id).await? {
            return Err(SigdeskError::NotFound(format!("sector {}", id)));
        }
        Ok(())
    }
}

fn require_privileged(actor: &Actor) -> SigdeskResult<()> {
    if actor.is_privileged() {
        Ok(())
    } else {
        Err(SigdeskError::Forbidden(
            "directory administration is restricted to privileged users".to_string(),
        ))
    }
}

fn non_empty(value: &str, field: &str) -> SigdeskResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SigdeskError::Validation(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(trimmed.to_string())
}

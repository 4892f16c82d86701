use crate::{SigdeskError, SigdeskResult};
use chrono::Utc;
use sigdesk_identity::hash_password;
use sigdesk_storage::SigdeskStorage;
use sigdesk_types::{Role, Sector, SectorId, User, UserId};

const DEFAULT_SECTORS: &[(&str, &str)] = &[
    ("Administration", "System administration"),
    ("General", "Default sector for new accounts"),
];

/// Idempotent first-boot seed: the default sectors plus a bootstrap admin
/// account that must change its password on first login.
pub async fn seed_defaults(
    storage: &dyn SigdeskStorage,
    admin_username: &str,
    admin_password: &str,
) -> SigdeskResult<()> {
    for (name, description) in DEFAULT_SECTORS {
        if storage.get_sector_by_name(name).await?.is_none() {
            let sector = Sector {
                id: SectorId::generate(),
                name: name.to_string(),
                description: description.to_string(),
            };
            storage.create_sector(sector).await?;
            tracing::info!(sector = name, "default sector created");
        }
    }

    if storage.get_user_by_username(admin_username).await?.is_none() {
        let sector_id = storage
            .get_sector_by_name(DEFAULT_SECTORS[0].0)
            .await?
            .map(|s| s.id)
            .ok_or_else(|| {
                SigdeskError::NotFound(format!("sector {}", DEFAULT_SECTORS[0].0))
            })?;
        let admin = User {
            id: UserId::generate(),
            username: admin_username.to_string(),
            name: "Administrator".to_string(),
            password_hash: hash_password(admin_password)?,
            role: Role::Admin,
            sector_id,
            first_login: true,
            security_question: None,
            security_answer_hash: None,
            created_at: Utc::now(),
        };
        storage.create_user(admin).await?;
        tracing::info!(username = admin_username, "bootstrap admin created");
    }
    Ok(())
}

use crate::{WorkflowError, WorkflowResult};
use chrono::Utc;
use sigdesk_storage::{ObjectStore, QueryWindow, SigdeskStorage, SignatureFilter};
use sigdesk_types::{Actor, Attachment, AttachmentId, Role, Signature, SignatureId};
use std::sync::Arc;

/// Mime types accepted for attachment uploads.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "image/jpeg",
    "image/png",
    "image/gif",
    "text/plain",
];

/// Upload size cap, 10 MiB.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// Token values the creation form offers in its dropdown.
pub const ALLOWED_TOKENS: &[&str] = &["Prefeito", "Municipio"];

/// Signature records and their attachments.
pub struct SignatureService {
    storage: Arc<dyn SigdeskStorage>,
    objects: Arc<dyn ObjectStore>,
}

impl SignatureService {
    pub fn new(storage: Arc<dyn SigdeskStorage>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { storage, objects }
    }

    /// Create a signature record. SUPPORT accounts adjudicate and assist;
    /// they never author records of their own.
    pub async fn create_signature(
        &self,
        actor: &Actor,
        reason: &str,
        token: &str,
    ) -> WorkflowResult<Signature> {
        if actor.role == Role::Support {
            return Err(WorkflowError::Forbidden(
                "support accounts cannot create signatures".to_string(),
            ));
        }
        let reason = non_empty(reason, "reason")?;
        let token = non_empty(token, "token")?;

        let user = self
            .storage
            .get_user(&actor.user_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("user {}", actor.user_id)))?;
        let sector = self
            .storage
            .get_sector(&user.sector_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("sector {}", user.sector_id)))?;

        // server_name/sector_name are snapshots taken now; later renames of
        // the user or sector never reach existing records.
        let signature = Signature {
            id: SignatureId::generate(),
            display_id: 0,
            reason,
            token,
            server_name: user.name.clone(),
            sector_name: sector.name.clone(),
            user_id: user.id.clone(),
            sector_id: sector.id.clone(),
            created_at: Utc::now(),
        };
        let stored = self.storage.create_signature(signature).await?;
        tracing::info!(signature = %stored.id, display_id = stored.display_id, user = %user.id, "signature created");
        Ok(stored)
    }

    /// Distinct server-name snapshots across all records, ascending. Feeds
    /// the listing filter dropdown.
    pub async fn server_options(&self) -> WorkflowResult<Vec<String>> {
        Ok(self.storage.distinct_servers().await?)
    }

    /// The fixed token list the creation form offers.
    pub fn token_options(&self) -> Vec<String> {
        ALLOWED_TOKENS.iter().map(|t| t.to_string()).collect()
    }

    /// Paged listing, newest first. Visible to every authenticated user.
    pub async fn list_signatures(
        &self,
        filter: &SignatureFilter,
        window: QueryWindow,
    ) -> WorkflowResult<(Vec<Signature>, usize)> {
        let total = self.storage.count_signatures(filter).await?;
        let page = self.storage.list_signatures(filter, window).await?;
        Ok((page, total))
    }

    pub async fn get_signature(
        &self,
        actor: &Actor,
        id: &SignatureId,
    ) -> WorkflowResult<Signature> {
        let signature = self.require_signature(id).await?;
        self.require_owner_or_privileged(actor, &signature)?;
        Ok(signature)
    }

    /// Direct update path: owner or privileged, no workflow involvement.
    pub async fn update_signature(
        &self,
        actor: &Actor,
        id: &SignatureId,
        reason: &str,
        token: &str,
    ) -> WorkflowResult<Signature> {
        let reason = non_empty(reason, "reason")?;
        let token = non_empty(token, "token")?;
        let signature = self.require_signature(id).await?;
        self.require_owner_or_privileged(actor, &signature)?;
        Ok(self
            .storage
            .update_signature_fields(id, reason, token)
            .await?)
    }

    /// Direct delete path: owner or privileged, bypasses the request
    /// workflow entirely.
    pub async fn delete_signature(&self, actor: &Actor, id: &SignatureId) -> WorkflowResult<()> {
        let signature = self.require_signature(id).await?;
        self.require_owner_or_privileged(actor, &signature)?;
        purge_signature(self.storage.as_ref(), self.objects.as_ref(), id).await?;
        tracing::info!(signature = %id, user = %actor.user_id, "signature deleted");
        Ok(())
    }

    pub async fn add_attachment(
        &self,
        actor: &Actor,
        signature_id: &SignatureId,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> WorkflowResult<Attachment> {
        let signature = self.require_signature(signature_id).await?;
        self.require_owner_or_privileged(actor, &signature)?;

        let filename = non_empty(filename, "filename")?;
        if !ALLOWED_MIME_TYPES.contains(&mime_type) {
            return Err(WorkflowError::Validation(format!(
                "unsupported file type {}",
                mime_type
            )));
        }
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(WorkflowError::Validation(format!(
                "file exceeds the {} byte limit",
                MAX_ATTACHMENT_BYTES
            )));
        }

        let now = Utc::now();
        let storage_path = format!(
            "signatures/{}/{}-{}",
            signature_id,
            now.timestamp_millis(),
            filename
        );
        self.objects
            .put_object(&storage_path, bytes.clone(), mime_type)
            .await?;
        let attachment = Attachment {
            id: AttachmentId::generate(),
            signature_id: signature_id.clone(),
            filename,
            storage_path,
            size_bytes: bytes.len() as u64,
            mime_type: mime_type.to_string(),
            uploaded_at: now,
        };
        self.storage.add_attachment(attachment.clone()).await?;
        Ok(attachment)
    }

    pub async fn list_attachments(
        &self,
        actor: &Actor,
        signature_id: &SignatureId,
    ) -> WorkflowResult<Vec<Attachment>> {
        let signature = self.require_signature(signature_id).await?;
        self.require_owner_or_privileged(actor, &signature)?;
        Ok(self.storage.list_attachments(signature_id).await?)
    }

    /// Download an attachment's bytes.
    pub async fn attachment_bytes(
        &self,
        actor: &Actor,
        id: &AttachmentId,
    ) -> WorkflowResult<(Attachment, Vec<u8>)> {
        let attachment = self.require_attachment(id).await?;
        let signature = self.require_signature(&attachment.signature_id).await?;
        self.require_owner_or_privileged(actor, &signature)?;
        let bytes = self
            .objects
            .get_object(&attachment.storage_path)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("attachment object {}", id)))?;
        Ok((attachment, bytes))
    }

    /// Metadata deletion is unconditional; the object delete is best-effort.
    pub async fn delete_attachment(&self, actor: &Actor, id: &AttachmentId) -> WorkflowResult<()> {
        let attachment = self.require_attachment(id).await?;
        let signature = self.require_signature(&attachment.signature_id).await?;
        self.require_owner_or_privileged(actor, &signature)?;

        let failures = self
            .objects
            .delete_objects(std::slice::from_ref(&attachment.storage_path))
            .await?;
        for (path, detail) in failures {
            tracing::warn!(path, detail, "attachment object delete failed, leaving orphan");
        }
        self.storage.delete_attachment(id).await?;
        Ok(())
    }

    async fn require_signature(&self, id: &SignatureId) -> WorkflowResult<Signature> {
        self.storage
            .get_signature(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("signature {}", id)))
    }

    async fn require_attachment(&self, id: &AttachmentId) -> WorkflowResult<Attachment> {
        self.storage
            .get_attachment(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("attachment {}", id)))
    }

    fn require_owner_or_privileged(
        &self,
        actor: &Actor,
        signature: &Signature,
    ) -> WorkflowResult<()> {
        if actor.is_privileged() || actor.user_id == signature.user_id {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden(
                "only the owner or a privileged user may access this signature".to_string(),
            ))
        }
    }
}

/// Best-effort object purge followed by row deletion. Object failures are
/// logged and swallowed; the row delete cascades to attachment metadata and
/// requests.
pub(crate) async fn purge_signature(
    storage: &dyn SigdeskStorage,
    objects: &dyn ObjectStore,
    id: &SignatureId,
) -> WorkflowResult<()> {
    let attachments = storage.list_attachments(id).await?;
    let paths = attachments
        .into_iter()
        .map(|a| a.storage_path)
        .collect::<Vec<_>>();
    if !paths.is_empty() {
        match objects.delete_objects(&paths).await {
            Ok(failures) => {
                for (path, detail) in failures {
                    tracing::warn!(path, detail, "object delete failed, leaving orphan");
                }
            }
            Err(err) => {
                tracing::warn!(signature = %id, error = %err, "object purge failed, leaving orphans");
            }
        }
    }
    if !storage.delete_signature(id).await? {
        return Err(WorkflowError::NotFound(format!("signature {}", id)));
    }
    Ok(())
}

fn non_empty(value: &str, field: &str) -> WorkflowResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::Validation(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(trimmed.to_string())
}

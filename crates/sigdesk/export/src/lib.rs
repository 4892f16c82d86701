//! Sigdesk Export - administrative backups
//!
//! Two privileged-only surfaces: per-table CSV dumps of the record store,
//! and a zstd-compressed tar archive of every stored attachment object.
//! CSV fields are quoted per RFC 4180; credential hashes never leave the
//! store.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

use sigdesk_storage::{
    ObjectStore, QueryWindow, RequestFilter, SigdeskStorage, SignatureFilter, StorageError,
};
use sigdesk_types::{Actor, RequestStatus, RequestType, Role};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("archive error: {0}")]
    Archive(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The exportable tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Signatures,
    Users,
    Sectors,
    Requests,
}

impl FromStr for Table {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signatures" => Ok(Table::Signatures),
            "users" => Ok(Table::Users),
            "sectors" => Ok(Table::Sectors),
            "requests" => Ok(Table::Requests),
            other => Err(ExportError::Validation(format!("unknown table {}", other))),
        }
    }
}

pub struct ExportService {
    storage: Arc<dyn SigdeskStorage>,
    objects: Arc<dyn ObjectStore>,
}

impl ExportService {
    pub fn new(storage: Arc<dyn SigdeskStorage>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { storage, objects }
    }

    /// Dump one table as CSV.
    pub async fn export_table(&self, actor: &Actor, table: Table) -> ExportResult<Vec<u8>> {
        require_privileged(actor)?;
        let csv = match table {
            Table::Signatures => self.signatures_csv().await?,
            Table::Users => self.users_csv().await?,
            Table::Sectors => self.sectors_csv().await?,
            Table::Requests => self.requests_csv().await?,
        };
        Ok(csv.into_bytes())
    }

    /// Archive every stored attachment object as a zstd-compressed tar.
    pub async fn export_attachments(&self, actor: &Actor) -> ExportResult<Vec<u8>> {
        require_privileged(actor)?;
        let mut builder = tar::Builder::new(Vec::new());
        let paths = self.objects.list_paths().await?;
        let count = paths.len();
        for path in paths {
            let Some(bytes) = self.objects.get_object(&path).await? else {
                // Listed but gone: racing delete, skip it.
                continue;
            };
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, &path, bytes.as_slice())?;
        }
        let tar_bytes = builder.into_inner()?;
        let compressed = zstd::encode_all(tar_bytes.as_slice(), 0)?;
        tracing::info!(objects = count, bytes = compressed.len(), "attachment archive built");
        Ok(compressed)
    }

    async fn signatures_csv(&self) -> ExportResult<String> {
        let rows = self
            .storage
            .list_signatures(&SignatureFilter::default(), QueryWindow::default())
            .await?;
        let mut out = csv_row(&[
            "id",
            "display_id",
            "reason",
            "token",
            "server_name",
            "sector_name",
            "user_id",
            "sector_id",
            "created_at",
        ]);
        for s in rows {
            out.push_str(&csv_row(&[
                &s.id.0,
                &s.display_id.to_string(),
                &s.reason,
                &s.token,
                &s.server_name,
                &s.sector_name,
                &s.user_id.0,
                &s.sector_id.0,
                &s.created_at.to_rfc3339(),
            ]));
        }
        Ok(out)
    }

    async fn users_csv(&self) -> ExportResult<String> {
        let rows = self.storage.list_users(QueryWindow::default()).await?;
        let mut out = csv_row(&[
            "id",
            "username",
            "name",
            "role",
            "sector_id",
            "first_login",
            "created_at",
        ]);
        for u in rows {
            out.push_str(&csv_row(&[
                &u.id.0,
                &u.username,
                &u.name,
                role_label(u.role),
                &u.sector_id.0,
                &u.first_login.to_string(),
                &u.created_at.to_rfc3339(),
            ]));
        }
        Ok(out)
    }

    async fn sectors_csv(&self) -> ExportResult<String> {
        let rows = self.storage.list_sectors().await?;
        let mut out = csv_row(&["id", "name", "description"]);
        for s in rows {
            out.push_str(&csv_row(&[&s.id.0, &s.name, &s.description]));
        }
        Ok(out)
    }

    async fn requests_csv(&self) -> ExportResult<String> {
        let rows = self
            .storage
            .list_requests(&RequestFilter::default(), QueryWindow::default())
            .await?;
        let mut out = csv_row(&[
            "id",
            "type",
            "status",
            "reason",
            "admin_response",
            "user_id",
            "signature_id",
            "responded_by",
            "created_at",
            "updated_at",
        ]);
        for r in rows {
            out.push_str(&csv_row(&[
                &r.id.0,
                type_label(r.request_type),
                status_label(r.status),
                &r.reason,
                r.admin_response.as_deref().unwrap_or(""),
                &r.user_id.0,
                &r.signature_id.0,
                r.responded_by.as_ref().map(|u| u.0.as_str()).unwrap_or(""),
                &r.created_at.to_rfc3339(),
                &r.updated_at.to_rfc3339(),
            ]));
        }
        Ok(out)
    }
}

fn require_privileged(actor: &Actor) -> ExportResult<()> {
    if actor.is_privileged() {
        Ok(())
    } else {
        Err(ExportError::Forbidden(
            "exports are restricted to privileged users".to_string(),
        ))
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Common => "COMMON",
        Role::Admin => "ADMIN",
        Role::Support => "SUPPORT",
    }
}

fn type_label(t: RequestType) -> &'static str {
    match t {
        RequestType::Edit => "EDIT",
        RequestType::Delete => "DELETE",
    }
}

fn status_label(s: RequestStatus) -> &'static str {
    match s {
        RequestStatus::Pending => "PENDING",
        RequestStatus::Approved => "APPROVED",
        RequestStatus::Rejected => "REJECTED",
        RequestStatus::Consumed => "CONSUMED",
    }
}

fn csv_row(fields: &[&str]) -> String {
    let mut row = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            row.push(',');
        }
        row.push_str(&csv_field(field));
    }
    row.push_str("\r\n");
    row
}

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigdesk_storage::{InMemoryObjectStore, InMemoryStorage, SectorStore, SignatureStore};
    use sigdesk_types::{Sector, SectorId, Signature, SignatureId, UserId};

    fn admin() -> Actor {
        Actor {
            user_id: UserId::generate(),
            username: "root".to_string(),
            role: Role::Admin,
        }
    }

    fn common() -> Actor {
        Actor {
            user_id: UserId::generate(),
            username: "alice".to_string(),
            role: Role::Common,
        }
    }

    #[test]
    fn csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[tokio::test]
    async fn exports_require_privilege() {
        let storage = Arc::new(InMemoryStorage::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let service = ExportService::new(storage, objects);
        assert!(matches!(
            service.export_table(&common(), Table::Signatures).await,
            Err(ExportError::Forbidden(_))
        ));
        assert!(matches!(
            service.export_attachments(&common()).await,
            Err(ExportError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn signature_rows_are_quoted() {
        let storage = Arc::new(InMemoryStorage::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        storage
            .create_sector(Sector {
                id: SectorId::generate(),
                name: "Finance".to_string(),
                description: "desk".to_string(),
            })
            .await
            .unwrap();
        storage
            .create_signature(Signature {
                id: SignatureId::generate(),
                display_id: 0,
                reason: "renewal, urgent".to_string(),
                token: "Municipio".to_string(),
                server_name: "Alice".to_string(),
                sector_name: "Finance".to_string(),
                user_id: UserId::generate(),
                sector_id: SectorId::generate(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let service = ExportService::new(storage, objects);

        let bytes = service
            .export_table(&admin(), Table::Signatures)
            .await
            .unwrap();
        let csv = String::from_utf8(bytes).unwrap();
        assert!(csv.starts_with("id,display_id,reason,"));
        assert!(csv.contains("\"renewal, urgent\""));
    }

    #[tokio::test]
    async fn attachment_archive_roundtrips() {
        let storage = Arc::new(InMemoryStorage::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        objects
            .put_object("signatures/s1/1-a.pdf", vec![1, 2, 3], "application/pdf")
            .await
            .unwrap();
        objects
            .put_object("signatures/s2/2-b.pdf", vec![4, 5], "application/pdf")
            .await
            .unwrap();
        let service = ExportService::new(storage, objects);

        let compressed = service.export_attachments(&admin()).await.unwrap();
        let tar_bytes = zstd::decode_all(compressed.as_slice()).unwrap();
        let mut archive = tar::Archive::new(tar_bytes.as_slice());
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            names.push(entry.path().unwrap().to_string_lossy().into_owned());
        }
        names.sort();
        assert_eq!(
            names,
            vec![
                "signatures/s1/1-a.pdf".to_string(),
                "signatures/s2/2-b.pdf".to_string()
            ]
        );
    }

    #[test]
    fn table_parsing() {
        assert_eq!(Table::from_str("users").unwrap(), Table::Users);
        assert!(Table::from_str("nope").is_err());
    }
}

//! Sigdesk Types - the shared domain model
//!
//! A "signature" here is a business record of a signed administrative
//! action, not a cryptographic signature. Requests are user-submitted asks
//! to edit or delete an existing signature, subject to admin adjudication.

#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(UserId);
string_id!(SectorId);
string_id!(SignatureId);
string_id!(AttachmentId);
string_id!(RequestId);
string_id!(MessageId);

/// Chat participant id. Authenticated users carry their `UserId`; anonymous
/// guests are identified only by a client-supplied username under the
/// `guest-` prefix and have no persisted account.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyId(pub String);

impl PartyId {
    pub fn user(id: &UserId) -> Self {
        Self(id.0.clone())
    }

    pub fn guest(username: &str) -> Self {
        Self(format!("guest-{}", username.to_lowercase()))
    }

    pub fn is_guest(&self) -> bool {
        self.0.starts_with("guest-")
    }

    /// The guest username without the prefix, if this is a guest party.
    pub fn guest_username(&self) -> Option<&str> {
        self.0.strip_prefix("guest-")
    }
}

impl std::fmt::Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User roles. ADMIN and SUPPORT are equivalent for workflow privilege
/// purposes: both adjudicate requests and bypass ownership gating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Common,
    Admin,
    Support,
}

impl Role {
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Support)
    }
}

/// The authenticated caller, as decoded from a session token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }
}

/// Organizational sector. Users belong to exactly one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sector {
    pub id: SectorId,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub name: String,
    /// Argon2 hash, never the cleartext.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub sector_id: SectorId,
    pub first_login: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_question: Option<String>,
    #[serde(skip_serializing)]
    pub security_answer_hash: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A signature record. `server_name` and `sector_name` are point-in-time
/// snapshots of the creator's identity taken at insert time; they never
/// follow later renames of the user or sector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Signature {
    pub id: SignatureId,
    /// Incrementing human-facing display number.
    pub display_id: u64,
    pub reason: String,
    pub token: String,
    pub server_name: String,
    pub sector_name: String,
    pub user_id: UserId,
    pub sector_id: SectorId,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Attachment metadata. The bytes live in external object storage keyed by
/// `storage_path`; this row is the source of truth for listings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub signature_id: SignatureId,
    pub filename: String,
    pub storage_path: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Edit,
    Delete,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestType::Edit => write!(f, "edit"),
            RequestType::Delete => write!(f, "deletion"),
        }
    }
}

/// Request lifecycle. `Consumed` is the explicit marker for an approved
/// edit grant that has been used up; it is never set by adjudication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Consumed,
}

impl RequestStatus {
    /// Whether the request is still awaiting adjudication.
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestStatus::Pending)
    }

    /// Whether an edit grant is currently live under this status.
    pub fn grants_edit(&self) -> bool {
        matches!(self, RequestStatus::Approved)
    }
}

/// An adjudication outcome. Distinct from `RequestStatus` so the boundary
/// can only ever move a request to Approved or Rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_status(&self) -> RequestStatus {
        match self {
            Decision::Approved => RequestStatus::Approved,
            Decision::Rejected => RequestStatus::Rejected,
        }
    }
}

/// A workflow request against a signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_response: Option<String>,
    pub user_id: UserId,
    pub signature_id: SignatureId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_by: Option<UserId>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A chat message. Either endpoint may be a guest party.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub from: PartyId,
    pub to: PartyId,
    pub text: String,
    pub read: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

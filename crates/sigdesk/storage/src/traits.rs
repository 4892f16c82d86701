use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sigdesk_types::{
    Attachment, AttachmentId, ChatMessage, MessageId, PartyId, Request, RequestId, RequestStatus,
    Sector, SectorId, Signature, SignatureId, User, UserId,
};

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Filters for signature listings. All fields are optional; string filters
/// are case-insensitive substring matches.
#[derive(Debug, Clone, Default)]
pub struct SignatureFilter {
    /// Free-text search across reason, token, server name and sector name.
    pub search: Option<String>,
    pub token: Option<String>,
    pub server: Option<String>,
    pub sector: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
}

/// Filters for request listings.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    /// Restrict to requests created by this user.
    pub user_id: Option<UserId>,
    pub status: Option<RequestStatus>,
}

/// Storage interface for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with `Conflict` if the username is taken.
    async fn create_user(&self, user: User) -> StorageResult<()>;

    async fn get_user(&self, id: &UserId) -> StorageResult<Option<User>>;

    async fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>>;

    async fn list_users(&self, window: QueryWindow) -> StorageResult<Vec<User>>;

    /// Replace a user record. Fails with `Conflict` if the new username
    /// belongs to a different user.
    async fn update_user(&self, user: User) -> StorageResult<()>;

    async fn delete_user(&self, id: &UserId) -> StorageResult<bool>;

    /// The earliest-created privileged user, used to route guest support
    /// conversations.
    async fn oldest_privileged_user(&self) -> StorageResult<Option<User>>;

    async fn count_users_in_sector(&self, sector_id: &SectorId) -> StorageResult<usize>;
}

/// Storage interface for sectors.
#[async_trait]
pub trait SectorStore: Send + Sync {
    /// Insert a new sector. Fails with `Conflict` if the name is taken.
    async fn create_sector(&self, sector: Sector) -> StorageResult<()>;

    async fn get_sector(&self, id: &SectorId) -> StorageResult<Option<Sector>>;

    async fn get_sector_by_name(&self, name: &str) -> StorageResult<Option<Sector>>;

    async fn list_sectors(&self) -> StorageResult<Vec<Sector>>;

    async fn update_sector(&self, sector: Sector) -> StorageResult<()>;

    async fn delete_sector(&self, id: &SectorId) -> StorageResult<bool>;
}

/// Storage interface for signature records.
#[async_trait]
pub trait SignatureStore: Send + Sync {
    /// Insert a signature, assigning the next incrementing display id.
    /// Returns the stored record.
    async fn create_signature(&self, signature: Signature) -> StorageResult<Signature>;

    async fn get_signature(&self, id: &SignatureId) -> StorageResult<Option<Signature>>;

    async fn list_signatures(
        &self,
        filter: &SignatureFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<Signature>>;

    async fn count_signatures(&self, filter: &SignatureFilter) -> StorageResult<usize>;

    /// Overwrite the mutable fields of a signature.
    async fn update_signature_fields(
        &self,
        id: &SignatureId,
        reason: String,
        token: String,
    ) -> StorageResult<Signature>;

    /// Delete a signature row. Cascades to its attachment metadata and
    /// requests. Returns false when the row was already gone.
    async fn delete_signature(&self, id: &SignatureId) -> StorageResult<bool>;

    async fn count_signatures_for_user(&self, user_id: &UserId) -> StorageResult<usize>;

    async fn count_signatures_in_sector(&self, sector_id: &SectorId) -> StorageResult<usize>;

    /// Distinct server-name snapshots across all signatures, ascending.
    async fn distinct_servers(&self) -> StorageResult<Vec<String>>;
}

/// Storage interface for attachment metadata.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn add_attachment(&self, attachment: Attachment) -> StorageResult<()>;

    async fn get_attachment(&self, id: &AttachmentId) -> StorageResult<Option<Attachment>>;

    async fn list_attachments(&self, signature_id: &SignatureId)
        -> StorageResult<Vec<Attachment>>;

    async fn delete_attachment(&self, id: &AttachmentId) -> StorageResult<bool>;
}

/// Storage interface for workflow requests. The two conditional operations
/// here carry the workflow invariants; callers never check-then-act.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new PENDING request, failing with `Conflict` if any other
    /// PENDING request already targets the same signature. The uniqueness
    /// check and the insert happen under one write lock (the in-memory
    /// equivalent of a conditional insert statement).
    async fn create_request_pending_unique(&self, request: Request) -> StorageResult<Request>;

    async fn get_request(&self, id: &RequestId) -> StorageResult<Option<Request>>;

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<Request>>;

    async fn count_requests(&self, filter: &RequestFilter) -> StorageResult<usize>;

    /// Transition a request out of PENDING in one conditional update.
    /// Fails with `Conflict` when the request is no longer pending and with
    /// `NotFound` when it does not exist. Returns the updated record.
    async fn adjudicate_pending(
        &self,
        id: &RequestId,
        status: RequestStatus,
        admin_response: Option<String>,
        responded_by: &UserId,
        now: DateTime<Utc>,
    ) -> StorageResult<Request>;

    /// The most recently updated APPROVED edit request for a signature,
    /// owned by the given user. The authoritative grant for `can_edit`.
    async fn latest_approved_edit(
        &self,
        signature_id: &SignatureId,
        user_id: &UserId,
    ) -> StorageResult<Option<Request>>;

    /// Flip an APPROVED request to CONSUMED in one conditional update,
    /// recording the consumption note. Fails with `Conflict` when the
    /// request is not currently approved, which makes double consumption
    /// impossible even under concurrent callers.
    async fn consume_approved_edit(
        &self,
        id: &RequestId,
        note: String,
        now: DateTime<Utc>,
    ) -> StorageResult<Request>;

    async fn list_pending_requests(&self) -> StorageResult<Vec<Request>>;

    async fn count_requests_for_user(&self, user_id: &UserId) -> StorageResult<usize>;
}

/// Storage interface for chat messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn append_message(&self, message: ChatMessage) -> StorageResult<ChatMessage>;

    /// Both directions of a conversation, oldest first.
    async fn conversation(&self, a: &PartyId, b: &PartyId) -> StorageResult<Vec<ChatMessage>>;

    /// All messages touching a party in either direction, oldest first.
    async fn messages_for_party(&self, party: &PartyId) -> StorageResult<Vec<ChatMessage>>;

    /// Messages addressed to a party, newest first.
    async fn messages_to(
        &self,
        to: &PartyId,
        window: QueryWindow,
    ) -> StorageResult<Vec<ChatMessage>>;

    /// Mark a message read, only when it is addressed to `to`. Returns
    /// whether a message was updated.
    async fn mark_read(&self, id: &MessageId, to: &PartyId) -> StorageResult<bool>;

    async fn mark_all_read(&self, to: &PartyId) -> StorageResult<usize>;

    /// Delete a message, only when it is addressed to `to`.
    async fn delete_message(&self, id: &MessageId, to: &PartyId) -> StorageResult<bool>;

    async fn unread_count(&self, to: &PartyId) -> StorageResult<usize>;
}

/// Unified storage bundle used by sigdesk services.
pub trait SigdeskStorage:
    UserStore + SectorStore + SignatureStore + AttachmentStore + RequestStore + ChatStore + Send + Sync
{
}

impl<T> SigdeskStorage for T where
    T: UserStore
        + SectorStore
        + SignatureStore
        + AttachmentStore
        + RequestStore
        + ChatStore
        + Send
        + Sync
{
}

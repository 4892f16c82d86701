//! In-memory reference implementation for sigdesk storage traits.
//!
//! This adapter is deterministic and test-friendly. The conditional request
//! operations hold a single write lock across their check and write, which
//! is the in-memory equivalent of a conditional UPDATE with an
//! affected-row-count check.

use crate::object::ObjectStore;
use crate::traits::{
    AttachmentStore, ChatStore, QueryWindow, RequestFilter, RequestStore, SectorStore,
    SignatureFilter, SignatureStore, UserStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sigdesk_types::{
    Attachment, AttachmentId, ChatMessage, MessageId, PartyId, Request, RequestId, RequestStatus,
    Sector, SectorId, Signature, SignatureId, User, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// In-memory sigdesk storage adapter.
#[derive(Default)]
pub struct InMemoryStorage {
    users: RwLock<HashMap<UserId, User>>,
    sectors: RwLock<HashMap<SectorId, Sector>>,
    signatures: RwLock<HashMap<SignatureId, Signature>>,
    attachments: RwLock<HashMap<AttachmentId, Attachment>>,
    requests: RwLock<HashMap<RequestId, Request>>,
    messages: RwLock<HashMap<MessageId, ChatMessage>>,
    display_seq: AtomicU64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err(what: &str) -> StorageError {
    StorageError::Backend(format!("{} lock poisoned", what))
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_filter(signature: &Signature, filter: &SignatureFilter) -> bool {
    if let Some(search) = &filter.search {
        let hit = contains_ci(&signature.reason, search)
            || contains_ci(&signature.token, search)
            || contains_ci(&signature.server_name, search)
            || contains_ci(&signature.sector_name, search);
        if !hit {
            return false;
        }
    }
    if let Some(token) = &filter.token {
        if !contains_ci(&signature.token, token) {
            return false;
        }
    }
    if let Some(server) = &filter.server {
        if !contains_ci(&signature.server_name, server) {
            return false;
        }
    }
    if let Some(sector) = &filter.sector {
        if !contains_ci(&signature.sector_name, sector) {
            return false;
        }
    }
    if let Some(from) = filter.created_from {
        if signature.created_at < from {
            return false;
        }
    }
    if let Some(until) = filter.created_until {
        if signature.created_at > until {
            return false;
        }
    }
    true
}

#[async_trait]
impl UserStore for InMemoryStorage {
    async fn create_user(&self, user: User) -> StorageResult<()> {
        let mut guard = self.users.write().map_err(|_| lock_err("users"))?;
        if guard.values().any(|u| u.username == user.username) {
            return Err(StorageError::Conflict(format!(
                "username {} already in use",
                user.username
            )));
        }
        guard.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> StorageResult<Option<User>> {
        let guard = self.users.read().map_err(|_| lock_err("users"))?;
        Ok(guard.get(id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let guard = self.users.read().map_err(|_| lock_err("users"))?;
        Ok(guard.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self, window: QueryWindow) -> StorageResult<Vec<User>> {
        let guard = self.users.read().map_err(|_| lock_err("users"))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(apply_window(values, window))
    }

    async fn update_user(&self, user: User) -> StorageResult<()> {
        let mut guard = self.users.write().map_err(|_| lock_err("users"))?;
        if !guard.contains_key(&user.id) {
            return Err(StorageError::NotFound(format!("user {}", user.id)));
        }
        if guard
            .values()
            .any(|u| u.username == user.username && u.id != user.id)
        {
            return Err(StorageError::Conflict(format!(
                "username {} already in use",
                user.username
            )));
        }
        guard.insert(user.id.clone(), user);
        Ok(())
    }

    async fn delete_user(&self, id: &UserId) -> StorageResult<bool> {
        let mut guard = self.users.write().map_err(|_| lock_err("users"))?;
        Ok(guard.remove(id).is_some())
    }

    async fn oldest_privileged_user(&self) -> StorageResult<Option<User>> {
        let guard = self.users.read().map_err(|_| lock_err("users"))?;
        Ok(guard
            .values()
            .filter(|u| u.role.is_privileged())
            .min_by_key(|u| u.created_at)
            .cloned())
    }

    async fn count_users_in_sector(&self, sector_id: &SectorId) -> StorageResult<usize> {
        let guard = self.users.read().map_err(|_| lock_err("users"))?;
        Ok(guard.values().filter(|u| &u.sector_id == sector_id).count())
    }
}

#[async_trait]
impl SectorStore for InMemoryStorage {
    async fn create_sector(&self, sector: Sector) -> StorageResult<()> {
        let mut guard = self.sectors.write().map_err(|_| lock_err("sectors"))?;
        if guard.values().any(|s| s.name == sector.name) {
            return Err(StorageError::Conflict(format!(
                "sector {} already exists",
                sector.name
            )));
        }
        guard.insert(sector.id.clone(), sector);
        Ok(())
    }

    async fn get_sector(&self, id: &SectorId) -> StorageResult<Option<Sector>> {
        let guard = self.sectors.read().map_err(|_| lock_err("sectors"))?;
        Ok(guard.get(id).cloned())
    }

    async fn get_sector_by_name(&self, name: &str) -> StorageResult<Option<Sector>> {
        let guard = self.sectors.read().map_err(|_| lock_err("sectors"))?;
        Ok(guard.values().find(|s| s.name == name).cloned())
    }

    async fn list_sectors(&self) -> StorageResult<Vec<Sector>> {
        let guard = self.sectors.read().map_err(|_| lock_err("sectors"))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(values)
    }

    async fn update_sector(&self, sector: Sector) -> StorageResult<()> {
        let mut guard = self.sectors.write().map_err(|_| lock_err("sectors"))?;
        if !guard.contains_key(&sector.id) {
            return Err(StorageError::NotFound(format!("sector {}", sector.id)));
        }
        if guard
            .values()
            .any(|s| s.name == sector.name && s.id != sector.id)
        {
            return Err(StorageError::Conflict(format!(
                "sector {} already exists",
                sector.name
            )));
        }
        guard.insert(sector.id.clone(), sector);
        Ok(())
    }

    async fn delete_sector(&self, id: &SectorId) -> StorageResult<bool> {
        let mut guard = self.sectors.write().map_err(|_| lock_err("sectors"))?;
        Ok(guard.remove(id).is_some())
    }
}

#[async_trait]
impl SignatureStore for InMemoryStorage {
    async fn create_signature(&self, mut signature: Signature) -> StorageResult<Signature> {
        let mut guard = self.signatures.write().map_err(|_| lock_err("signatures"))?;
        signature.display_id = self.display_seq.fetch_add(1, Ordering::SeqCst) + 1;
        guard.insert(signature.id.clone(), signature.clone());
        Ok(signature)
    }

    async fn get_signature(&self, id: &SignatureId) -> StorageResult<Option<Signature>> {
        let guard = self.signatures.read().map_err(|_| lock_err("signatures"))?;
        Ok(guard.get(id).cloned())
    }

    async fn list_signatures(
        &self,
        filter: &SignatureFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<Signature>> {
        let guard = self.signatures.read().map_err(|_| lock_err("signatures"))?;
        let mut values = guard
            .values()
            .filter(|s| matches_filter(s, filter))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apply_window(values, window))
    }

    async fn count_signatures(&self, filter: &SignatureFilter) -> StorageResult<usize> {
        let guard = self.signatures.read().map_err(|_| lock_err("signatures"))?;
        Ok(guard.values().filter(|s| matches_filter(s, filter)).count())
    }

    async fn update_signature_fields(
        &self,
        id: &SignatureId,
        reason: String,
        token: String,
    ) -> StorageResult<Signature> {
        let mut guard = self.signatures.write().map_err(|_| lock_err("signatures"))?;
        let signature = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("signature {}", id)))?;
        signature.reason = reason;
        signature.token = token;
        Ok(signature.clone())
    }

    async fn delete_signature(&self, id: &SignatureId) -> StorageResult<bool> {
        let mut signatures = self.signatures.write().map_err(|_| lock_err("signatures"))?;
        if signatures.remove(id).is_none() {
            return Ok(false);
        }
        // Cascade: attachment metadata and requests referencing the row.
        let mut attachments = self
            .attachments
            .write()
            .map_err(|_| lock_err("attachments"))?;
        attachments.retain(|_, a| &a.signature_id != id);
        let mut requests = self.requests.write().map_err(|_| lock_err("requests"))?;
        requests.retain(|_, r| &r.signature_id != id);
        Ok(true)
    }

    async fn count_signatures_for_user(&self, user_id: &UserId) -> StorageResult<usize> {
        let guard = self.signatures.read().map_err(|_| lock_err("signatures"))?;
        Ok(guard.values().filter(|s| &s.user_id == user_id).count())
    }

    async fn count_signatures_in_sector(&self, sector_id: &SectorId) -> StorageResult<usize> {
        let guard = self.signatures.read().map_err(|_| lock_err("signatures"))?;
        Ok(guard.values().filter(|s| &s.sector_id == sector_id).count())
    }

    async fn distinct_servers(&self) -> StorageResult<Vec<String>> {
        let guard = self.signatures.read().map_err(|_| lock_err("signatures"))?;
        let mut servers = guard
            .values()
            .map(|s| s.server_name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        servers.sort();
        Ok(servers)
    }
}

#[async_trait]
impl AttachmentStore for InMemoryStorage {
    async fn add_attachment(&self, attachment: Attachment) -> StorageResult<()> {
        let mut guard = self
            .attachments
            .write()
            .map_err(|_| lock_err("attachments"))?;
        guard.insert(attachment.id.clone(), attachment);
        Ok(())
    }

    async fn get_attachment(&self, id: &AttachmentId) -> StorageResult<Option<Attachment>> {
        let guard = self
            .attachments
            .read()
            .map_err(|_| lock_err("attachments"))?;
        Ok(guard.get(id).cloned())
    }

    async fn list_attachments(
        &self,
        signature_id: &SignatureId,
    ) -> StorageResult<Vec<Attachment>> {
        let guard = self
            .attachments
            .read()
            .map_err(|_| lock_err("attachments"))?;
        let mut values = guard
            .values()
            .filter(|a| &a.signature_id == signature_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        Ok(values)
    }

    async fn delete_attachment(&self, id: &AttachmentId) -> StorageResult<bool> {
        let mut guard = self
            .attachments
            .write()
            .map_err(|_| lock_err("attachments"))?;
        Ok(guard.remove(id).is_some())
    }
}

fn matches_request(request: &Request, filter: &RequestFilter) -> bool {
    if let Some(user_id) = &filter.user_id {
        if &request.user_id != user_id {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if request.status != status {
            return false;
        }
    }
    true
}

#[async_trait]
impl RequestStore for InMemoryStorage {
    async fn create_request_pending_unique(&self, request: Request) -> StorageResult<Request> {
        let mut guard = self.requests.write().map_err(|_| lock_err("requests"))?;
        let pending_exists = guard
            .values()
            .any(|r| r.signature_id == request.signature_id && r.status.is_pending());
        if pending_exists {
            return Err(StorageError::Conflict(format!(
                "a pending request already exists for signature {}",
                request.signature_id
            )));
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    async fn get_request(&self, id: &RequestId) -> StorageResult<Option<Request>> {
        let guard = self.requests.read().map_err(|_| lock_err("requests"))?;
        Ok(guard.get(id).cloned())
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<Request>> {
        let guard = self.requests.read().map_err(|_| lock_err("requests"))?;
        let mut values = guard
            .values()
            .filter(|r| matches_request(r, filter))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apply_window(values, window))
    }

    async fn count_requests(&self, filter: &RequestFilter) -> StorageResult<usize> {
        let guard = self.requests.read().map_err(|_| lock_err("requests"))?;
        Ok(guard.values().filter(|r| matches_request(r, filter)).count())
    }

    async fn adjudicate_pending(
        &self,
        id: &RequestId,
        status: RequestStatus,
        admin_response: Option<String>,
        responded_by: &UserId,
        now: DateTime<Utc>,
    ) -> StorageResult<Request> {
        let mut guard = self.requests.write().map_err(|_| lock_err("requests"))?;
        let request = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("request {}", id)))?;
        if !request.status.is_pending() {
            return Err(StorageError::Conflict(format!(
                "request {} has already been processed",
                id
            )));
        }
        request.status = status;
        request.admin_response = admin_response;
        request.responded_by = Some(responded_by.clone());
        request.updated_at = now;
        Ok(request.clone())
    }

    async fn latest_approved_edit(
        &self,
        signature_id: &SignatureId,
        user_id: &UserId,
    ) -> StorageResult<Option<Request>> {
        let guard = self.requests.read().map_err(|_| lock_err("requests"))?;
        Ok(guard
            .values()
            .filter(|r| {
                &r.signature_id == signature_id
                    && &r.user_id == user_id
                    && r.request_type == sigdesk_types::RequestType::Edit
                    && r.status.grants_edit()
            })
            .max_by_key(|r| r.updated_at)
            .cloned())
    }

    async fn consume_approved_edit(
        &self,
        id: &RequestId,
        note: String,
        now: DateTime<Utc>,
    ) -> StorageResult<Request> {
        let mut guard = self.requests.write().map_err(|_| lock_err("requests"))?;
        let request = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("request {}", id)))?;
        if !request.status.grants_edit() {
            return Err(StorageError::Conflict(format!(
                "request {} is not an open edit grant",
                id
            )));
        }
        request.status = RequestStatus::Consumed;
        request.admin_response = Some(note);
        request.updated_at = now;
        Ok(request.clone())
    }

    async fn list_pending_requests(&self) -> StorageResult<Vec<Request>> {
        let guard = self.requests.read().map_err(|_| lock_err("requests"))?;
        let mut values = guard
            .values()
            .filter(|r| r.status.is_pending())
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(values)
    }

    async fn count_requests_for_user(&self, user_id: &UserId) -> StorageResult<usize> {
        let guard = self.requests.read().map_err(|_| lock_err("requests"))?;
        Ok(guard.values().filter(|r| &r.user_id == user_id).count())
    }
}

#[async_trait]
impl ChatStore for InMemoryStorage {
    async fn append_message(&self, message: ChatMessage) -> StorageResult<ChatMessage> {
        let mut guard = self.messages.write().map_err(|_| lock_err("messages"))?;
        guard.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn conversation(&self, a: &PartyId, b: &PartyId) -> StorageResult<Vec<ChatMessage>> {
        let guard = self.messages.read().map_err(|_| lock_err("messages"))?;
        let mut values = guard
            .values()
            .filter(|m| (&m.from == a && &m.to == b) || (&m.from == b && &m.to == a))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }

    async fn messages_for_party(&self, party: &PartyId) -> StorageResult<Vec<ChatMessage>> {
        let guard = self.messages.read().map_err(|_| lock_err("messages"))?;
        let mut values = guard
            .values()
            .filter(|m| &m.from == party || &m.to == party)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }

    async fn messages_to(
        &self,
        to: &PartyId,
        window: QueryWindow,
    ) -> StorageResult<Vec<ChatMessage>> {
        let guard = self.messages.read().map_err(|_| lock_err("messages"))?;
        let mut values = guard
            .values()
            .filter(|m| &m.to == to)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apply_window(values, window))
    }

    async fn mark_read(&self, id: &MessageId, to: &PartyId) -> StorageResult<bool> {
        let mut guard = self.messages.write().map_err(|_| lock_err("messages"))?;
        match guard.get_mut(id) {
            Some(message) if &message.to == to => {
                message.read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, to: &PartyId) -> StorageResult<usize> {
        let mut guard = self.messages.write().map_err(|_| lock_err("messages"))?;
        let mut updated = 0;
        for message in guard.values_mut() {
            if &message.to == to && !message.read {
                message.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_message(&self, id: &MessageId, to: &PartyId) -> StorageResult<bool> {
        let mut guard = self.messages.write().map_err(|_| lock_err("messages"))?;
        match guard.get(id) {
            Some(message) if &message.to == to => {
                guard.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unread_count(&self, to: &PartyId) -> StorageResult<usize> {
        let guard = self.messages.read().map_err(|_| lock_err("messages"))?;
        Ok(guard.values().filter(|m| &m.to == to && !m.read).count())
    }
}

/// In-memory object store for attachment bytes.
///
/// Paths listed via `fail_deletes_for` report a simulated backend failure on
/// delete, which lets tests exercise the best-effort purge paths.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
    failing_deletes: RwLock<HashSet<String>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deletes_for(&self, path: &str) {
        if let Ok(mut guard) = self.failing_deletes.write() {
            guard.insert(path.to_string());
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, path: &str, bytes: Vec<u8>, mime_type: &str) -> StorageResult<()> {
        let mut guard = self.objects.write().map_err(|_| lock_err("objects"))?;
        if guard.contains_key(path) {
            return Err(StorageError::Conflict(format!(
                "object {} already exists",
                path
            )));
        }
        guard.insert(path.to_string(), (bytes, mime_type.to_string()));
        Ok(())
    }

    async fn get_object(&self, path: &str) -> StorageResult<Option<Vec<u8>>> {
        let guard = self.objects.read().map_err(|_| lock_err("objects"))?;
        Ok(guard.get(path).map(|(bytes, _)| bytes.clone()))
    }

    async fn delete_objects(&self, paths: &[String]) -> StorageResult<Vec<(String, String)>> {
        let failing = self
            .failing_deletes
            .read()
            .map_err(|_| lock_err("objects"))?
            .clone();
        let mut guard = self.objects.write().map_err(|_| lock_err("objects"))?;
        let mut failures = Vec::new();
        for path in paths {
            if failing.contains(path) {
                failures.push((path.clone(), "simulated backend failure".to_string()));
                continue;
            }
            guard.remove(path);
        }
        Ok(failures)
    }

    async fn list_paths(&self) -> StorageResult<Vec<String>> {
        let guard = self.objects.read().map_err(|_| lock_err("objects"))?;
        let mut paths = guard.keys().cloned().collect::<Vec<_>>();
        paths.sort();
        Ok(paths)
    }
}

//! Sigdesk Chat - direct messaging between users and anonymous guests
//!
//! Messages are point-to-point between two parties. A party is either an
//! authenticated user or an anonymous guest; guests have no account, so
//! their messages are routed to the longest-serving privileged user and
//! tagged with the guest's display name.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

use chrono::Utc;
use serde::Serialize;
use sigdesk_storage::{QueryWindow, SigdeskStorage, StorageError};
use sigdesk_types::{Actor, ChatMessage, MessageId, PartyId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("record not found: {0}")]
    NotFound(String),

    /// No privileged user exists to receive guest messages.
    #[error("no support staff available")]
    NoSupportStaff,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One entry in a user's conversation list.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub partner: PartyId,
    pub last_message: ChatMessage,
    pub unread: usize,
}

/// Messaging service over the chat store.
pub struct ChatService {
    storage: Arc<dyn SigdeskStorage>,
}

impl ChatService {
    pub fn new(storage: Arc<dyn SigdeskStorage>) -> Self {
        Self { storage }
    }

    /// Send a message from an authenticated user to any party.
    pub async fn send_message(
        &self,
        actor: &Actor,
        to: PartyId,
        text: &str,
    ) -> ChatResult<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("message text is empty".to_string()));
        }
        let from = PartyId::user(&actor.user_id);
        if from == to {
            return Err(ChatError::Validation(
                "cannot message yourself".to_string(),
            ));
        }
        let message = ChatMessage {
            id: MessageId::generate(),
            from,
            to,
            text: text.to_string(),
            read: false,
            created_at: Utc::now(),
        };
        Ok(self.storage.append_message(message).await?)
    }

    /// Send a message from an anonymous guest. The message lands with the
    /// longest-serving privileged user and carries the guest's display name
    /// so support staff can see who is asking without an account lookup.
    pub async fn send_guest_message(
        &self,
        guest_name: &str,
        guest_username: &str,
        text: &str,
    ) -> ChatResult<ChatMessage> {
        let text = text.trim();
        let guest_name = guest_name.trim();
        let guest_username = guest_username.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("message text is empty".to_string()));
        }
        if guest_username.is_empty() {
            return Err(ChatError::Validation(
                "guest username is required".to_string(),
            ));
        }
        let recipient = self
            .storage
            .oldest_privileged_user()
            .await?
            .ok_or(ChatError::NoSupportStaff)?;
        let message = ChatMessage {
            id: MessageId::generate(),
            from: PartyId::guest(guest_username),
            to: PartyId::user(&recipient.id),
            text: format!("[GUEST: {} (@{})] {}", guest_name, guest_username, text),
            read: false,
            created_at: Utc::now(),
        };
        tracing::debug!(guest = guest_username, to = %recipient.id, "guest message routed");
        Ok(self.storage.append_message(message).await?)
    }

    /// Send a workflow notice between two users. Used by adjudication to
    /// tell a requester the outcome of their request.
    pub async fn send_notice(
        &self,
        from: &PartyId,
        to: &PartyId,
        text: &str,
    ) -> ChatResult<ChatMessage> {
        let message = ChatMessage {
            id: MessageId::generate(),
            from: from.clone(),
            to: to.clone(),
            text: text.to_string(),
            read: false,
            created_at: Utc::now(),
        };
        Ok(self.storage.append_message(message).await?)
    }

    /// Both directions of a conversation, oldest first.
    pub async fn conversation(
        &self,
        me: &PartyId,
        other: &PartyId,
    ) -> ChatResult<Vec<ChatMessage>> {
        Ok(self.storage.conversation(me, other).await?)
    }

    /// A party's conversations, most recently active first.
    pub async fn list_conversations(&self, me: &PartyId) -> ChatResult<Vec<ConversationSummary>> {
        let messages = self.storage.messages_for_party(me).await?;
        let mut by_partner: HashMap<PartyId, ConversationSummary> = HashMap::new();
        for message in messages {
            let partner = if &message.from == me {
                message.to.clone()
            } else {
                message.from.clone()
            };
            let unread_here = usize::from(&message.to == me && !message.read);
            by_partner
                .entry(partner.clone())
                .and_modify(|summary| {
                    summary.unread += unread_here;
                    if message.created_at > summary.last_message.created_at {
                        summary.last_message = message.clone();
                    }
                })
                .or_insert(ConversationSummary {
                    partner,
                    last_message: message,
                    unread: unread_here,
                });
        }
        let mut summaries = by_partner.into_values().collect::<Vec<_>>();
        summaries.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
        Ok(summaries)
    }

    /// Messages addressed to a party, newest first.
    pub async fn inbox(&self, me: &PartyId, window: QueryWindow) -> ChatResult<Vec<ChatMessage>> {
        Ok(self.storage.messages_to(me, window).await?)
    }

    /// Mark one received message read. Only the addressee can do this.
    pub async fn mark_read(&self, me: &PartyId, id: &MessageId) -> ChatResult<()> {
        if self.storage.mark_read(id, me).await? {
            Ok(())
        } else {
            Err(ChatError::NotFound(format!("message {}", id)))
        }
    }

    pub async fn mark_all_read(&self, me: &PartyId) -> ChatResult<usize> {
        Ok(self.storage.mark_all_read(me).await?)
    }

    /// Delete one received message. Only the addressee can do this.
    pub async fn delete_message(&self, me: &PartyId, id: &MessageId) -> ChatResult<()> {
        if self.storage.delete_message(id, me).await? {
            Ok(())
        } else {
            Err(ChatError::NotFound(format!("message {}", id)))
        }
    }

    pub async fn unread_count(&self, me: &PartyId) -> ChatResult<usize> {
        Ok(self.storage.unread_count(me).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigdesk_storage::{InMemoryStorage, UserStore};
    use sigdesk_types::{Role, SectorId, User, UserId};

    fn user(username: &str, role: Role, created_offset_secs: i64) -> User {
        User {
            id: UserId::generate(),
            username: username.to_string(),
            name: username.to_string(),
            password_hash: String::new(),
            role,
            sector_id: SectorId::generate(),
            first_login: false,
            security_question: None,
            security_answer_hash: None,
            created_at: Utc::now() + chrono::Duration::seconds(created_offset_secs),
        }
    }

    fn actor(user: &User) -> Actor {
        Actor {
            user_id: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
        }
    }

    #[tokio::test]
    async fn guest_messages_route_to_oldest_privileged_user() {
        let storage = Arc::new(InMemoryStorage::new());
        let older_admin = user("admin1", Role::Admin, -100);
        let newer_admin = user("admin2", Role::Admin, -10);
        let common = user("carol", Role::Common, -200);
        for u in [&older_admin, &newer_admin, &common] {
            storage.create_user(u.clone()).await.unwrap();
        }
        let chat = ChatService::new(storage);

        let message = chat
            .send_guest_message("Visitor Vince", "vince", "where do I sign?")
            .await
            .unwrap();
        assert_eq!(message.to, PartyId::user(&older_admin.id));
        assert_eq!(message.from, PartyId::guest("vince"));
        assert_eq!(
            message.text,
            "[GUEST: Visitor Vince (@vince)] where do I sign?"
        );
    }

    #[tokio::test]
    async fn guest_message_without_support_staff_fails() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .create_user(user("carol", Role::Common, 0))
            .await
            .unwrap();
        let chat = ChatService::new(storage);
        assert!(matches!(
            chat.send_guest_message("V", "v", "hello").await,
            Err(ChatError::NoSupportStaff)
        ));
    }

    #[tokio::test]
    async fn only_the_addressee_marks_or_deletes() {
        let storage = Arc::new(InMemoryStorage::new());
        let alice = user("alice", Role::Common, 0);
        let bob = user("bob", Role::Common, 0);
        for u in [&alice, &bob] {
            storage.create_user(u.clone()).await.unwrap();
        }
        let chat = ChatService::new(storage);

        let message = chat
            .send_message(&actor(&alice), PartyId::user(&bob.id), "hi bob")
            .await
            .unwrap();

        let alice_party = PartyId::user(&alice.id);
        let bob_party = PartyId::user(&bob.id);
        assert!(matches!(
            chat.mark_read(&alice_party, &message.id).await,
            Err(ChatError::NotFound(_))
        ));
        chat.mark_read(&bob_party, &message.id).await.unwrap();
        assert_eq!(chat.unread_count(&bob_party).await.unwrap(), 0);

        assert!(matches!(
            chat.delete_message(&alice_party, &message.id).await,
            Err(ChatError::NotFound(_))
        ));
        chat.delete_message(&bob_party, &message.id).await.unwrap();
    }

    #[tokio::test]
    async fn conversation_summaries_count_unread() {
        let storage = Arc::new(InMemoryStorage::new());
        let alice = user("alice", Role::Common, 0);
        let bob = user("bob", Role::Common, 0);
        for u in [&alice, &bob] {
            storage.create_user(u.clone()).await.unwrap();
        }
        let chat = ChatService::new(storage);

        chat.send_message(&actor(&alice), PartyId::user(&bob.id), "one")
            .await
            .unwrap();
        chat.send_message(&actor(&alice), PartyId::user(&bob.id), "two")
            .await
            .unwrap();
        chat.send_message(&actor(&bob), PartyId::user(&alice.id), "reply")
            .await
            .unwrap();

        let summaries = chat
            .list_conversations(&PartyId::user(&bob.id))
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].partner, PartyId::user(&alice.id));
        assert_eq!(summaries[0].unread, 2);
        assert_eq!(summaries[0].last_message.text, "reply");
    }

    #[tokio::test]
    async fn empty_and_self_messages_are_rejected() {
        let storage = Arc::new(InMemoryStorage::new());
        let alice = user("alice", Role::Common, 0);
        storage.create_user(alice.clone()).await.unwrap();
        let chat = ChatService::new(storage);

        assert!(matches!(
            chat.send_message(&actor(&alice), PartyId::guest("g"), "   ")
                .await,
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            chat.send_message(&actor(&alice), PartyId::user(&alice.id), "hi")
                .await,
            Err(ChatError::Validation(_))
        ));
    }
}

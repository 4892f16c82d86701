//! Sigdesk Notify - the aggregated notification feed
//!
//! Notifications are not stored; each fetch synthesizes the feed from two
//! sources. Chat messages addressed to the caller map 1:1 into
//! message-type notifications whose read flag mirrors the message. For
//! privileged callers, every pending request system-wide also appears as a
//! request-type notification. Requests carry no read flag of their own, so
//! request notifications are always presented unread, and marking or
//! deleting them is a no-op; they leave the feed only when the request
//! stops being pending.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

use chrono::{DateTime, Utc};
use serde::Serialize;
use sigdesk_storage::{QueryWindow, SigdeskStorage, StorageError};
use sigdesk_types::{Actor, ChatMessage, MessageId, PartyId, Request};
use std::sync::Arc;
use thiserror::Error;

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Message,
    Request,
}

/// One feed entry. The id is prefixed with its kind so the mutation
/// endpoints can dispatch without a second lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub sender: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

const MESSAGE_PREFIX: &str = "message-";
const REQUEST_PREFIX: &str = "request-";

/// Feed synthesis over the chat and request stores.
pub struct NotificationService {
    storage: Arc<dyn SigdeskStorage>,
}

impl NotificationService {
    pub fn new(storage: Arc<dyn SigdeskStorage>) -> Self {
        Self { storage }
    }

    /// The caller's merged feed, newest first.
    pub async fn list_notifications(&self, actor: &Actor) -> NotifyResult<Vec<Notification>> {
        let me = PartyId::user(&actor.user_id);
        let messages = self
            .storage
            .messages_to(&me, QueryWindow::default())
            .await?;
        let mut feed = Vec::with_capacity(messages.len());
        for message in messages {
            feed.push(self.message_notification(message).await?);
        }

        if actor.is_privileged() {
            for request in self.storage.list_pending_requests().await? {
                feed.push(self.request_notification(request).await?);
            }
        }

        feed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(feed)
    }

    /// Unread messages, plus every pending request for privileged callers.
    pub async fn unread_count(&self, actor: &Actor) -> NotifyResult<usize> {
        let me = PartyId::user(&actor.user_id);
        let mut count = self.storage.unread_count(&me).await?;
        if actor.is_privileged() {
            count += self.storage.list_pending_requests().await?.len();
        }
        Ok(count)
    }

    /// Mark one notification read. Request-type ids are accepted and
    /// ignored; there is nothing on the request to flip.
    pub async fn mark_read(&self, actor: &Actor, id: &str) -> NotifyResult<()> {
        let me = PartyId::user(&actor.user_id);
        match split_id(id)? {
            (NotificationKind::Request, _) => Ok(()),
            (NotificationKind::Message, raw) => {
                let message_id = MessageId::new(raw);
                if self.storage.mark_read(&message_id, &me).await? {
                    Ok(())
                } else {
                    Err(NotifyError::NotFound(format!("notification {}", id)))
                }
            }
        }
    }

    /// Mark every message notification read. Pending requests are untouched
    /// and will still report unread.
    pub async fn mark_all_read(&self, actor: &Actor) -> NotifyResult<usize> {
        let me = PartyId::user(&actor.user_id);
        Ok(self.storage.mark_all_read(&me).await?)
    }

    /// Delete one notification. Request-type ids are accepted and ignored.
    pub async fn delete(&self, actor: &Actor, id: &str) -> NotifyResult<()> {
        let me = PartyId::user(&actor.user_id);
        match split_id(id)? {
            (NotificationKind::Request, _) => Ok(()),
            (NotificationKind::Message, raw) => {
                let message_id = MessageId::new(raw);
                if self.storage.delete_message(&message_id, &me).await? {
                    Ok(())
                } else {
                    Err(NotifyError::NotFound(format!("notification {}", id)))
                }
            }
        }
    }

    async fn message_notification(&self, message: ChatMessage) -> NotifyResult<Notification> {
        let sender = self.sender_label(&message.from).await?;
        Ok(Notification {
            id: format!("{}{}", MESSAGE_PREFIX, message.id),
            kind: NotificationKind::Message,
            sender,
            body: message.text,
            read: message.read,
            created_at: message.created_at,
        })
    }

    async fn request_notification(&self, request: Request) -> NotifyResult<Notification> {
        let requester = match self.storage.get_user(&request.user_id).await? {
            Some(user) => user.name,
            None => request.user_id.to_string(),
        };
        Ok(Notification {
            id: format!("{}{}", REQUEST_PREFIX, request.id),
            kind: NotificationKind::Request,
            sender: requester.clone(),
            body: format!(
                "{} requested {} of a signature: {}",
                requester, request.request_type, request.reason
            ),
            read: false,
            created_at: request.created_at,
        })
    }

    async fn sender_label(&self, from: &PartyId) -> NotifyResult<String> {
        if let Some(username) = from.guest_username() {
            return Ok(format!("guest {}", username));
        }
        let user_id = sigdesk_types::UserId::new(from.0.clone());
        Ok(match self.storage.get_user(&user_id).await? {
            Some(user) => user.name,
            None => from.to_string(),
        })
    }
}

fn split_id(id: &str) -> NotifyResult<(NotificationKind, &str)> {
    if let Some(raw) = id.strip_prefix(MESSAGE_PREFIX) {
        Ok((NotificationKind::Message, raw))
    } else if let Some(raw) = id.strip_prefix(REQUEST_PREFIX) {
        Ok((NotificationKind::Request, raw))
    } else {
        Err(NotifyError::NotFound(format!("notification {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigdesk_storage::{ChatStore, InMemoryStorage, RequestStore, SignatureStore, UserStore};
    use sigdesk_types::{
        Request, RequestId, RequestStatus, RequestType, Role, SectorId, Signature, SignatureId,
        User, UserId,
    };

    struct Fixture {
        storage: Arc<InMemoryStorage>,
        service: NotificationService,
        common: Actor,
        admin: Actor,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryStorage::new());
        let mut actors = Vec::new();
        for (username, role) in [("alice", Role::Common), ("root", Role::Admin)] {
            let user = User {
                id: UserId::generate(),
                username: username.to_string(),
                name: username.to_string(),
                password_hash: String::new(),
                role,
                sector_id: SectorId::generate(),
                first_login: false,
                security_question: None,
                security_answer_hash: None,
                created_at: Utc::now(),
            };
            storage.create_user(user.clone()).await.unwrap();
            actors.push(Actor {
                user_id: user.id,
                username: user.username,
                role,
            });
        }
        let admin = actors.pop().unwrap();
        let common = actors.pop().unwrap();
        let service = NotificationService::new(storage.clone());
        Fixture {
            storage,
            service,
            common,
            admin,
        }
    }

    async fn pending_request(fx: &Fixture) -> Request {
        let signature = fx
            .storage
            .create_signature(Signature {
                id: SignatureId::generate(),
                display_id: 0,
                reason: "r".to_string(),
                token: "t".to_string(),
                server_name: "alice".to_string(),
                sector_name: "Finance".to_string(),
                user_id: fx.common.user_id.clone(),
                sector_id: SectorId::generate(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        fx.storage
            .create_request_pending_unique(Request {
                id: RequestId::generate(),
                request_type: RequestType::Edit,
                status: RequestStatus::Pending,
                reason: "typo".to_string(),
                admin_response: None,
                user_id: fx.common.user_id.clone(),
                signature_id: signature.id,
                responded_by: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn message_to(fx: &Fixture, to: &Actor, text: &str) -> ChatMessage {
        fx.storage
            .append_message(ChatMessage {
                id: MessageId::generate(),
                from: PartyId::user(&fx.admin.user_id),
                to: PartyId::user(&to.user_id),
                text: text.to_string(),
                read: false,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn privileged_feed_includes_pending_requests() {
        let fx = fixture().await;
        pending_request(&fx).await;

        let admin_feed = fx.service.list_notifications(&fx.admin).await.unwrap();
        assert_eq!(admin_feed.len(), 1);
        assert_eq!(admin_feed[0].kind, NotificationKind::Request);
        assert!(!admin_feed[0].read);
        assert!(admin_feed[0].body.contains("edit"));

        let common_feed = fx.service.list_notifications(&fx.common).await.unwrap();
        assert!(common_feed.is_empty());
    }

    #[tokio::test]
    async fn request_notifications_ignore_read_and_delete() {
        let fx = fixture().await;
        let request = pending_request(&fx).await;
        let id = format!("request-{}", request.id);

        fx.service.mark_read(&fx.admin, &id).await.unwrap();
        fx.service.delete(&fx.admin, &id).await.unwrap();
        fx.service.mark_all_read(&fx.admin).await.unwrap();

        // Still pending, still unread, still in the feed.
        let feed = fx.service.list_notifications(&fx.admin).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert!(!feed[0].read);
        assert_eq!(fx.service.unread_count(&fx.admin).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn message_notifications_are_mutable() {
        let fx = fixture().await;
        let message = message_to(&fx, &fx.common, "hello").await;
        let id = format!("message-{}", message.id);

        assert_eq!(fx.service.unread_count(&fx.common).await.unwrap(), 1);
        fx.service.mark_read(&fx.common, &id).await.unwrap();
        assert_eq!(fx.service.unread_count(&fx.common).await.unwrap(), 0);
        let feed = fx.service.list_notifications(&fx.common).await.unwrap();
        assert!(feed[0].read);

        fx.service.delete(&fx.common, &id).await.unwrap();
        assert!(fx
            .service
            .list_notifications(&fx.common)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn guest_senders_resolve_from_the_party_id() {
        let fx = fixture().await;
        fx.storage
            .append_message(ChatMessage {
                id: MessageId::generate(),
                from: PartyId::guest("vince"),
                to: PartyId::user(&fx.admin.user_id),
                text: "[GUEST: Vince (@vince)] hello".to_string(),
                read: false,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let feed = fx.service.list_notifications(&fx.admin).await.unwrap();
        assert_eq!(feed[0].sender, "guest vince");
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let fx = fixture().await;
        assert!(matches!(
            fx.service.mark_read(&fx.common, "bogus-1").await,
            Err(NotifyError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.mark_read(&fx.common, "message-missing").await,
            Err(NotifyError::NotFound(_))
        ));
    }
}

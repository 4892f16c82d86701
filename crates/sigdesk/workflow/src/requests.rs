use crate::signatures::purge_signature;
use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sigdesk_chat::ChatService;
use sigdesk_storage::{ObjectStore, QueryWindow, RequestFilter, SigdeskStorage};
use sigdesk_types::{
    Actor, Decision, PartyId, Request, RequestId, RequestStatus, RequestType, Signature,
    SignatureId,
};
use std::sync::Arc;

/// Outcome of the edit-permission gate. When a grant backs the answer, the
/// granting request and its approval time ride along so the client can show
/// which approval opened the window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditGate {
    #[serde(rename = "canEdit")]
    pub allowed: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

/// The request lifecycle: creation by owners, adjudication by privileged
/// users, and the one-time edit window an approval opens.
pub struct WorkflowService {
    storage: Arc<dyn SigdeskStorage>,
    objects: Arc<dyn ObjectStore>,
    chat: ChatService,
}

impl WorkflowService {
    pub fn new(storage: Arc<dyn SigdeskStorage>, objects: Arc<dyn ObjectStore>) -> Self {
        let chat = ChatService::new(storage.clone());
        Self {
            storage,
            objects,
            chat,
        }
    }

    /// Open a request against a signature. Only the owner may request;
    /// privileged roles adjudicate, they do not request. At most one
    /// pending request may exist per signature, enforced by a conditional
    /// insert in the store.
    pub async fn create_request(
        &self,
        actor: &Actor,
        request_type: RequestType,
        signature_id: &SignatureId,
        reason: &str,
    ) -> WorkflowResult<Request> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::Validation(
                "reason must not be empty".to_string(),
            ));
        }
        let signature = self.require_signature(signature_id).await?;
        if signature.user_id != actor.user_id {
            return Err(WorkflowError::Forbidden(
                "only the signature owner may open a request".to_string(),
            ));
        }

        let now = Utc::now();
        let request = Request {
            id: RequestId::generate(),
            request_type,
            status: RequestStatus::Pending,
            reason: reason.to_string(),
            admin_response: None,
            user_id: actor.user_id.clone(),
            signature_id: signature_id.clone(),
            responded_by: None,
            created_at: now,
            updated_at: now,
        };
        let stored = self.storage.create_request_pending_unique(request).await?;
        tracing::info!(request = %stored.id, signature = %signature_id, kind = %request_type, "request opened");
        Ok(stored)
    }

    /// Paged request listing. COMMON users see their own requests;
    /// privileged users see everything.
    pub async fn list_requests(
        &self,
        actor: &Actor,
        status: Option<RequestStatus>,
        window: QueryWindow,
    ) -> WorkflowResult<(Vec<Request>, usize)> {
        let filter = RequestFilter {
            user_id: (!actor.is_privileged()).then(|| actor.user_id.clone()),
            status,
        };
        let total = self.storage.count_requests(&filter).await?;
        let page = self.storage.list_requests(&filter, window).await?;
        Ok((page, total))
    }

    pub async fn get_request(&self, actor: &Actor, id: &RequestId) -> WorkflowResult<Request> {
        let request = self
            .storage
            .get_request(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("request {}", id)))?;
        if !actor.is_privileged() && request.user_id != actor.user_id {
            return Err(WorkflowError::Forbidden(
                "only the requester or a privileged user may view this request".to_string(),
            ));
        }
        Ok(request)
    }

    /// Decide a pending request. The transition out of PENDING happens
    /// exactly once; a second adjudication fails with Conflict.
    ///
    /// An approved deletion purges the signature on the spot, which also
    /// removes the request row itself by cascade; no chat notice is sent in
    /// that branch because the requester's record is gone with the request.
    pub async fn adjudicate(
        &self,
        actor: &Actor,
        id: &RequestId,
        decision: Decision,
        admin_response: Option<String>,
    ) -> WorkflowResult<Request> {
        if !actor.is_privileged() {
            return Err(WorkflowError::Forbidden(
                "only privileged users adjudicate requests".to_string(),
            ));
        }
        let admin_response = admin_response
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let request = self
            .storage
            .adjudicate_pending(
                id,
                decision.as_status(),
                admin_response.clone(),
                &actor.user_id,
                Utc::now(),
            )
            .await?;
        tracing::info!(request = %id, decision = ?decision, by = %actor.user_id, "request adjudicated");

        if decision == Decision::Approved && request.request_type == RequestType::Delete {
            purge_signature(self.storage.as_ref(), self.objects.as_ref(), &request.signature_id)
                .await?;
            return Ok(request);
        }

        let decision_word = match decision {
            Decision::Approved => "APPROVED",
            Decision::Rejected => "REJECTED",
        };
        let mut text = format!(
            "Your {} request has been {}.",
            request.request_type, decision_word
        );
        if let Some(response) = &admin_response {
            text.push_str(&format!(" Response: {}", response));
        }
        self.chat
            .send_notice(
                &PartyId::user(&actor.user_id),
                &PartyId::user(&request.user_id),
                &text,
            )
            .await?;
        Ok(request)
    }

    /// Whether an actor may edit a signature right now. Privileged roles
    /// always may; a COMMON actor needs a live approved edit request of
    /// their own, most recent by update time.
    pub async fn can_edit(&self, actor: &Actor, signature_id: &SignatureId) -> WorkflowResult<EditGate> {
        self.require_signature(signature_id).await?;
        if actor.is_privileged() {
            return Ok(EditGate {
                allowed: true,
                reason: "privileged role".to_string(),
                request_id: None,
                approved_at: None,
            });
        }
        let grant = self
            .storage
            .latest_approved_edit(signature_id, &actor.user_id)
            .await?;
        Ok(match grant {
            Some(grant) => EditGate {
                allowed: true,
                reason: "approved edit request".to_string(),
                request_id: Some(grant.id),
                approved_at: Some(grant.updated_at),
            },
            None => EditGate {
                allowed: false,
                reason: "no approved edit request".to_string(),
                request_id: None,
                approved_at: None,
            },
        })
    }

    /// Apply the edit an approval granted, consuming the grant. The
    /// consumption is a conditional update, so the window closes exactly
    /// once even under concurrent attempts. Privileged actors edit through
    /// this path without a grant.
    pub async fn apply_approved_edit(
        &self,
        actor: &Actor,
        signature_id: &SignatureId,
        reason: &str,
        token: &str,
    ) -> WorkflowResult<Signature> {
        let reason = reason.trim();
        let token = token.trim();
        if reason.is_empty() || token.is_empty() {
            return Err(WorkflowError::Validation(
                "reason and token must not be empty".to_string(),
            ));
        }
        self.require_signature(signature_id).await?;

        if !actor.is_privileged() {
            let now = Utc::now();
            let grant = self
                .storage
                .latest_approved_edit(signature_id, &actor.user_id)
                .await?
                .ok_or_else(|| {
                    WorkflowError::Forbidden("no approved edit request".to_string())
                })?;
            // Consume before writing; if two calls race, exactly one gets
            // past this conditional update.
            self.storage
                .consume_approved_edit(
                    &grant.id,
                    format!("edit applied at {}", now.to_rfc3339()),
                    now,
                )
                .await?;
            tracing::info!(request = %grant.id, signature = %signature_id, "edit grant consumed");
        }

        Ok(self
            .storage
            .update_signature_fields(signature_id, reason.to_string(), token.to_string())
            .await?)
    }

    async fn require_signature(&self, id: &SignatureId) -> WorkflowResult<Signature> {
        self.storage
            .get_signature(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("signature {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::tests::{fixture, Fixture};
    use sigdesk_storage::{AttachmentStore, ChatStore, RequestStore, SignatureStore};

    fn workflow(fx: &Fixture) -> WorkflowService {
        WorkflowService::new(fx.storage.clone(), fx.objects.clone())
    }

    async fn owned_signature(fx: &Fixture) -> Signature {
        fx.signatures
            .create_signature(&fx.common, "renew license", "Municipio")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn only_the_owner_may_request() {
        let fx = fixture().await;
        let wf = workflow(&fx);
        let signature = owned_signature(&fx).await;

        for actor in [&fx.other_common, &fx.admin] {
            let result = wf
                .create_request(actor, RequestType::Edit, &signature.id, "typo")
                .await;
            assert!(matches!(result, Err(WorkflowError::Forbidden(_))));
        }
    }

    #[tokio::test]
    async fn second_pending_request_conflicts_until_adjudicated() {
        let fx = fixture().await;
        let wf = workflow(&fx);
        let signature = owned_signature(&fx).await;

        let first = wf
            .create_request(&fx.common, RequestType::Edit, &signature.id, "typo")
            .await
            .unwrap();
        assert!(matches!(
            wf.create_request(&fx.common, RequestType::Delete, &signature.id, "obsolete")
                .await,
            Err(WorkflowError::Conflict(_))
        ));

        wf.adjudicate(&fx.admin, &first.id, Decision::Rejected, None)
            .await
            .unwrap();
        wf.create_request(&fx.common, RequestType::Delete, &signature.id, "obsolete")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn adjudication_requires_privilege_and_is_single_use() {
        let fx = fixture().await;
        let wf = workflow(&fx);
        let signature = owned_signature(&fx).await;
        let request = wf
            .create_request(&fx.common, RequestType::Edit, &signature.id, "typo")
            .await
            .unwrap();

        assert!(matches!(
            wf.adjudicate(&fx.common, &request.id, Decision::Approved, None)
                .await,
            Err(WorkflowError::Forbidden(_))
        ));

        wf.adjudicate(&fx.admin, &request.id, Decision::Approved, None)
            .await
            .unwrap();
        assert!(matches!(
            wf.adjudicate(&fx.admin, &request.id, Decision::Rejected, None)
                .await,
            Err(WorkflowError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn rejection_records_response_and_notifies() {
        let fx = fixture().await;
        let wf = workflow(&fx);
        let signature = owned_signature(&fx).await;
        let request = wf
            .create_request(&fx.common, RequestType::Delete, &signature.id, "obsolete")
            .await
            .unwrap();

        let rejected = wf
            .adjudicate(
                &fx.admin,
                &request.id,
                Decision::Rejected,
                Some("record must be kept".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.admin_response.as_deref(), Some("record must be kept"));
        assert_eq!(rejected.responded_by.as_ref(), Some(&fx.admin.user_id));

        let inbox = fx
            .storage
            .messages_to(&PartyId::user(&fx.common.user_id), QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert!(inbox[0].text.contains("REJECTED"));
        assert!(inbox[0].text.contains("record must be kept"));
    }

    #[tokio::test]
    async fn approved_deletion_purges_signature_and_request() {
        let fx = fixture().await;
        let wf = workflow(&fx);
        let signature = owned_signature(&fx).await;
        let attachment = fx
            .signatures
            .add_attachment(&fx.common, &signature.id, "a.pdf", "application/pdf", vec![1])
            .await
            .unwrap();
        let request = wf
            .create_request(&fx.common, RequestType::Delete, &signature.id, "obsolete")
            .await
            .unwrap();

        wf.adjudicate(&fx.admin, &request.id, Decision::Approved, None)
            .await
            .unwrap();

        assert!(fx
            .storage
            .get_signature(&signature.id)
            .await
            .unwrap()
            .is_none());
        assert!(fx
            .storage
            .get_attachment(&attachment.id)
            .await
            .unwrap()
            .is_none());
        assert!(fx.storage.get_request(&request.id).await.unwrap().is_none());
        assert!(fx
            .objects
            .get_object(&attachment.storage_path)
            .await
            .unwrap()
            .is_none());
        // No notice survives; the request row itself went with the cascade.
        let inbox = fx
            .storage
            .messages_to(&PartyId::user(&fx.common.user_id), QueryWindow::default())
            .await
            .unwrap();
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn common_listing_is_scoped_to_own_requests() {
        let fx = fixture().await;
        let wf = workflow(&fx);
        let mine = owned_signature(&fx).await;
        wf.create_request(&fx.common, RequestType::Edit, &mine.id, "typo")
            .await
            .unwrap();
        let theirs = fx
            .signatures
            .create_signature(&fx.other_common, "other record", "Estado")
            .await
            .unwrap();
        wf.create_request(&fx.other_common, RequestType::Edit, &theirs.id, "typo")
            .await
            .unwrap();

        let (own, own_total) = wf
            .list_requests(&fx.common, None, QueryWindow::default())
            .await
            .unwrap();
        assert_eq!((own.len(), own_total), (1, 1));

        let (all, all_total) = wf
            .list_requests(&fx.admin, None, QueryWindow::default())
            .await
            .unwrap();
        assert_eq!((all.len(), all_total), (2, 2));
    }

    // The full approved-edit lifecycle: approval notifies with APPROVED,
    // opens the gate, the edit lands once, and the grant is used up.
    #[tokio::test]
    async fn approved_edit_window_is_single_use() {
        let fx = fixture().await;
        let wf = workflow(&fx);
        let signature = owned_signature(&fx).await;
        let request = wf
            .create_request(&fx.common, RequestType::Edit, &signature.id, "typo in reason")
            .await
            .unwrap();

        assert!(!wf.can_edit(&fx.common, &signature.id).await.unwrap().allowed);
        assert!(wf.can_edit(&fx.admin, &signature.id).await.unwrap().allowed);

        wf.adjudicate(&fx.admin, &request.id, Decision::Approved, None)
            .await
            .unwrap();
        let inbox = fx
            .storage
            .messages_to(&PartyId::user(&fx.common.user_id), QueryWindow::default())
            .await
            .unwrap();
        assert!(inbox[0].text.contains("APPROVED"));
        assert!(wf.can_edit(&fx.common, &signature.id).await.unwrap().allowed);

        let updated = wf
            .apply_approved_edit(&fx.common, &signature.id, "fixed reason", "Municipio")
            .await
            .unwrap();
        assert_eq!(updated.reason, "fixed reason");

        let consumed = fx
            .storage
            .get_request(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(consumed.status, RequestStatus::Consumed);
        assert!(consumed
            .admin_response
            .as_deref()
            .map(|r| r.starts_with("edit applied at "))
            .unwrap_or(false));

        assert!(!wf.can_edit(&fx.common, &signature.id).await.unwrap().allowed);
        assert!(matches!(
            wf.apply_approved_edit(&fx.common, &signature.id, "again", "again")
                .await,
            Err(WorkflowError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn edit_gate_reports_the_granting_request() {
        let fx = fixture().await;
        let wf = workflow(&fx);
        let signature = owned_signature(&fx).await;
        let request = wf
            .create_request(&fx.common, RequestType::Edit, &signature.id, "typo")
            .await
            .unwrap();
        wf.adjudicate(&fx.admin, &request.id, Decision::Approved, None)
            .await
            .unwrap();

        let gate = wf.can_edit(&fx.common, &signature.id).await.unwrap();
        assert!(gate.allowed);
        assert_eq!(gate.request_id.as_ref(), Some(&request.id));
        let approved = fx.storage.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(gate.approved_at, Some(approved.updated_at));

        let json = serde_json::to_value(&gate).unwrap();
        assert_eq!(json["canEdit"], true);
        assert_eq!(json["requestId"], serde_json::json!(request.id.0));
        assert!(json["approvedAt"].is_string());

        // A privileged gate carries no grant, and the optional keys stay off
        // the wire entirely.
        let admin_gate = wf.can_edit(&fx.admin, &signature.id).await.unwrap();
        let json = serde_json::to_value(&admin_gate).unwrap();
        assert_eq!(json["canEdit"], true);
        assert!(json.get("requestId").is_none());
        assert!(json.get("approvedAt").is_none());
    }

    #[tokio::test]
    async fn privileged_edit_needs_no_grant() {
        let fx = fixture().await;
        let wf = workflow(&fx);
        let signature = owned_signature(&fx).await;
        let updated = wf
            .apply_approved_edit(&fx.admin, &signature.id, "admin fix", "Estado")
            .await
            .unwrap();
        assert_eq!(updated.token, "Estado");
    }
}

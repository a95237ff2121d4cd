//! Message intake gateway — the entry point for inbound deliveries.
//!
//! Orchestrates one accepted webhook delivery end to end: idempotency check,
//! identity resolution, consent routing, urgency escalation, persistence,
//! audit, real-time notification. Providers deliver at-least-once; the
//! provider message id is the idempotency key that makes redelivery a no-op.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog, entity};
use crate::error::{Result, ValidationError};
use crate::intake::escalation::UrgencyEscalator;
use crate::intake::identity::IdentityResolver;
use crate::model::{Direction, Message, MessageStatus, ReferralState, Urgency};
use crate::notify::{ConversationEvent, Notifier};
use crate::referral::coordinator::ReferralCoordinator;
use crate::store::Database;

/// Result of one `ingest` call.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// The provider message id was already processed; nothing happened.
    Duplicate,
    /// The message was accepted and persisted.
    Accepted {
        message: Message,
        /// Whether this message escalated the conversation's urgency.
        urgency_updated: bool,
        /// Urgency after processing.
        urgency: Urgency,
    },
}

/// Top-level intake orchestrator.
pub struct IntakeGateway {
    db: Arc<dyn Database>,
    identity: IdentityResolver,
    escalator: UrgencyEscalator,
    referral: Arc<ReferralCoordinator>,
    audit: AuditLog,
    notifier: Arc<dyn Notifier>,
}

impl IntakeGateway {
    pub fn new(
        db: Arc<dyn Database>,
        identity: IdentityResolver,
        escalator: UrgencyEscalator,
        referral: Arc<ReferralCoordinator>,
        audit: AuditLog,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            identity,
            escalator,
            referral,
            audit,
            notifier,
        }
    }

    /// Process one inbound delivery.
    ///
    /// The idempotency check is check-then-act against the store; the unique
    /// index on `(tenant_id, provider_message_id)` backstops the rare race
    /// between two concurrent deliveries of the same id.
    pub async fn ingest(
        &self,
        tenant_id: Uuid,
        from_address: &str,
        content: &str,
        provider_message_id: Option<&str>,
    ) -> Result<IngestOutcome> {
        if from_address.trim().is_empty() {
            return Err(ValidationError::Empty { field: "from_address" }.into());
        }
        if content.is_empty() {
            return Err(ValidationError::Empty { field: "content" }.into());
        }

        if let Some(provider_id) = provider_message_id {
            if self
                .db
                .get_message_by_provider_id(tenant_id, provider_id)
                .await?
                .is_some()
            {
                debug!(provider_id = %provider_id, "Duplicate delivery suppressed");
                return Ok(IngestOutcome::Duplicate);
            }
        }

        let contact = self.identity.resolve_contact(tenant_id, from_address).await?;
        let conversation = self
            .identity
            .resolve_open_conversation(tenant_id, contact.id)
            .await?;

        // A conversation waiting on referral consent routes the reply through
        // the coordinator before anything else; the message is still recorded
        // below either way.
        if conversation.referral_state == ReferralState::WaitingConsent {
            self.referral
                .handle_consent_response(tenant_id, conversation.id, content)
                .await?;
        }

        let escalation = self.escalator.apply(&conversation, content).await?;

        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            tenant_id,
            conversation_id: conversation.id,
            direction: Direction::Inbound,
            status: MessageStatus::Received,
            content: content.to_string(),
            provider_message_id: provider_message_id.map(String::from),
            actor_id: None,
            created_at: now,
        };
        self.db.insert_message(&message).await?;
        self.db
            .touch_conversation(tenant_id, conversation.id, now)
            .await?;

        self.audit
            .append(
                tenant_id,
                entity::MESSAGE,
                message.id,
                AuditAction::MessageReceived,
                None,
                None,
                Some(serde_json::json!({ "conversation_id": conversation.id })),
            )
            .await?;

        self.notifier.notify(ConversationEvent::MessageReceived {
            tenant_id,
            conversation_id: conversation.id,
            message_id: message.id,
            content: message.content.clone(),
        });

        info!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            urgency = escalation.urgency.as_str(),
            "Inbound message accepted"
        );

        Ok(IngestOutcome::Accepted {
            message,
            urgency_updated: escalation.updated,
            urgency: escalation.urgency,
        })
    }
}

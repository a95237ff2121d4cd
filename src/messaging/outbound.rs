//! Outbound messenger — persists a message and drives its side effects.
//!
//! The primary domain event is the persisted OUTBOUND message plus its audit
//! row. Channel delivery, real-time notification, and gamification are
//! auxiliary: their failures are logged and never unwind the message.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog, entity};
use crate::error::{DatabaseError, Result};
use crate::gamification::GamificationHook;
use crate::messaging::ChannelClient;
use crate::model::{Direction, Message, MessageStatus};
use crate::notify::{ConversationEvent, Notifier};
use crate::store::Database;

/// Sends outbound messages on behalf of automated flows and human agents.
pub struct OutboundMessenger {
    db: Arc<dyn Database>,
    audit: AuditLog,
    notifier: Arc<dyn Notifier>,
    channel: Arc<dyn ChannelClient>,
    gamification: Arc<dyn GamificationHook>,
}

impl OutboundMessenger {
    pub fn new(
        db: Arc<dyn Database>,
        audit: AuditLog,
        notifier: Arc<dyn Notifier>,
        channel: Arc<dyn ChannelClient>,
        gamification: Arc<dyn GamificationHook>,
    ) -> Self {
        Self {
            db,
            audit,
            notifier,
            channel,
            gamification,
        }
    }

    /// Persist and dispatch an outbound message.
    ///
    /// `actor_id` marks a human-authored message (automated flows pass
    /// `None`) and triggers the gamification hook.
    pub async fn send(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        content: &str,
        actor_id: Option<Uuid>,
    ) -> Result<Message> {
        let conversation = self
            .db
            .get_conversation(tenant_id, conversation_id)
            .await?
            .ok_or(DatabaseError::NotFound {
                entity: "conversation",
                id: conversation_id,
            })?;

        let now = Utc::now();
        let mut message = Message {
            id: Uuid::new_v4(),
            tenant_id,
            conversation_id: conversation.id,
            direction: Direction::Outbound,
            status: MessageStatus::Queued,
            content: content.to_string(),
            provider_message_id: None,
            actor_id,
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
                AuditAction::MessageSent,
                actor_id,
                None,
                Some(serde_json::json!({ "conversation_id": conversation.id })),
            )
            .await?;

        self.notifier.notify(ConversationEvent::MessageSent {
            tenant_id,
            conversation_id: conversation.id,
            message_id: message.id,
            content: message.content.clone(),
        });

        // Hand off to the transport. A failure leaves the row QUEUED for
        // external reconciliation.
        match self.channel.deliver(&message).await {
            Ok(()) => {
                self.db.mark_message_sent(tenant_id, message.id).await?;
                message.status = MessageStatus::Sent;
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Channel delivery failed");
            }
        }

        if let Some(agent_id) = actor_id {
            if let Err(e) = self.gamification.award_point(tenant_id, agent_id).await {
                warn!(agent_id = %agent_id, error = %e, "Gamification hook failed");
            }
        }

        info!(
            message_id = %message.id,
            conversation_id = %conversation.id,
            actor = actor_id.map(|a| a.to_string()).unwrap_or_else(|| "system".into()),
            "Outbound message dispatched"
        );
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::gamification::PointsLedger;
    use crate::messaging::NullChannelClient;
    use crate::model::{Contact, Conversation, ConversationStatus, ReferralState, Urgency};
    use crate::notify::BroadcastNotifier;
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;

    /// Channel that always refuses, to exercise the QUEUED path.
    struct FailingChannel;

    #[async_trait]
    impl ChannelClient for FailingChannel {
        async fn deliver(&self, message: &Message) -> std::result::Result<(), DeliveryError> {
            Err(DeliveryError::SendFailed {
                conversation_id: message.conversation_id,
                reason: "provider down".to_string(),
            })
        }
    }

    struct Fixture {
        db: Arc<dyn Database>,
        tenant: Uuid,
        conversation_id: Uuid,
    }

    async fn seed() -> Fixture {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let tenant = Uuid::new_v4();
        let contact = Contact {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            address: "+551198".to_string(),
            display_name: "+551198".to_string(),
            created_at: Utc::now(),
        };
        db.insert_contact(&contact).await.unwrap();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            contact_id: contact.id,
            status: ConversationStatus::Open,
            urgency: Urgency::Normal,
            referral_state: ReferralState::None,
            last_message_at: None,
            created_at: Utc::now(),
        };
        db.insert_conversation(&conversation).await.unwrap();
        Fixture {
            db,
            tenant,
            conversation_id: conversation.id,
        }
    }

    fn messenger(db: &Arc<dyn Database>, channel: Arc<dyn ChannelClient>) -> OutboundMessenger {
        OutboundMessenger::new(
            Arc::clone(db),
            AuditLog::new(Arc::clone(db)),
            Arc::new(BroadcastNotifier::new()),
            channel,
            Arc::new(PointsLedger::new(Arc::clone(db))),
        )
    }

    #[tokio::test]
    async fn send_persists_audits_and_marks_sent() {
        let f = seed().await;
        let m = messenger(&f.db, Arc::new(NullChannelClient));

        let message = m
            .send(f.tenant, f.conversation_id, "Olá! Como podemos ajudar?", None)
            .await
            .unwrap();
        assert_eq!(message.direction, Direction::Outbound);
        assert_eq!(message.status, MessageStatus::Sent);

        let stored = f
            .db
            .list_messages(f.tenant, f.conversation_id, 10)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, MessageStatus::Sent);

        let conversation = f
            .db
            .get_conversation(f.tenant, f.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert!(conversation.last_message_at.is_some());

        let events = f.db.list_audit_events(f.tenant, message.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "MESSAGE_SENT");
    }

    #[tokio::test]
    async fn delivery_failure_leaves_message_queued() {
        let f = seed().await;
        let m = messenger(&f.db, Arc::new(FailingChannel));

        let message = m
            .send(f.tenant, f.conversation_id, "tentando enviar", None)
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Queued);

        let stored = f
            .db
            .list_messages(f.tenant, f.conversation_id, 10)
            .await
            .unwrap();
        assert_eq!(stored[0].status, MessageStatus::Queued);

        // The audit row still exists; delivery failure is auxiliary.
        let events = f.db.list_audit_events(f.tenant, message.id).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn human_actor_earns_a_point() {
        let f = seed().await;
        let m = messenger(&f.db, Arc::new(NullChannelClient));
        let agent = Uuid::new_v4();

        m.send(f.tenant, f.conversation_id, "resposta do atendente", Some(agent))
            .await
            .unwrap();
        m.send(f.tenant, f.conversation_id, "mais uma", Some(agent))
            .await
            .unwrap();
        m.send(f.tenant, f.conversation_id, "fluxo automático", None)
            .await
            .unwrap();

        assert_eq!(f.db.get_agent_points(f.tenant, agent).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let f = seed().await;
        let m = messenger(&f.db, Arc::new(NullChannelClient));

        let err = m
            .send(f.tenant, Uuid::new_v4(), "para ninguém", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Database(DatabaseError::NotFound { .. })
        ));
    }
}

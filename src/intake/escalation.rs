//! Urgency escalation — applied to each accepted inbound message.
//!
//! Classifies the content and upgrades the conversation's urgency when the
//! classification outranks the stored tier. Urgency never auto-downgrades; a
//! PLANTAO conversation stays PLANTAO no matter what arrives later.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog, entity};
use crate::error::DatabaseError;
use crate::intake::urgency;
use crate::model::{Conversation, Urgency};
use crate::notify::{ConversationEvent, Notifier};
use crate::store::Database;

/// Result of applying the escalation policy to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationOutcome {
    /// Whether the stored urgency was upgraded.
    pub updated: bool,
    /// The conversation's urgency after this message.
    pub urgency: Urgency,
}

/// Applies the monotonic escalation policy.
pub struct UrgencyEscalator {
    db: Arc<dyn Database>,
    audit: AuditLog,
    notifier: Arc<dyn Notifier>,
}

impl UrgencyEscalator {
    pub fn new(db: Arc<dyn Database>, audit: AuditLog, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            audit,
            notifier,
        }
    }

    /// Classify `content` and upgrade the conversation if it outranks the
    /// current tier.
    ///
    /// The store update is conditional on the urgency we read; losing that
    /// race to a concurrent upgrade reports `updated = false` and keeps the
    /// winner's value.
    pub async fn apply(
        &self,
        conversation: &Conversation,
        content: &str,
    ) -> Result<EscalationOutcome, DatabaseError> {
        let classified = urgency::classify(content);

        if classified <= conversation.urgency {
            return Ok(EscalationOutcome {
                updated: false,
                urgency: conversation.urgency,
            });
        }

        let applied = self
            .db
            .update_conversation_urgency(
                conversation.tenant_id,
                conversation.id,
                conversation.urgency,
                classified,
            )
            .await?;

        if !applied {
            debug!(
                conversation_id = %conversation.id,
                "Urgency update lost a concurrent race, keeping stored value"
            );
            return Ok(self.reread(conversation).await?);
        }

        self.audit
            .append(
                conversation.tenant_id,
                entity::CONVERSATION,
                conversation.id,
                AuditAction::UrgencyChanged,
                None,
                Some(serde_json::json!(conversation.urgency.as_str())),
                Some(serde_json::json!(classified.as_str())),
            )
            .await?;

        self.notifier.notify(ConversationEvent::UrgencyChanged {
            tenant_id: conversation.tenant_id,
            conversation_id: conversation.id,
            urgency: classified,
        });

        info!(
            conversation_id = %conversation.id,
            from = conversation.urgency.as_str(),
            to = classified.as_str(),
            "Urgency escalated"
        );

        Ok(EscalationOutcome {
            updated: true,
            urgency: classified,
        })
    }

    async fn reread(
        &self,
        conversation: &Conversation,
    ) -> Result<EscalationOutcome, DatabaseError> {
        let current = self
            .db
            .get_conversation(conversation.tenant_id, conversation.id)
            .await?
            .map(|c| c.urgency)
            .unwrap_or(conversation.urgency);
        Ok(EscalationOutcome {
            updated: false,
            urgency: current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Contact, ConversationStatus, ReferralState};
    use crate::notify::BroadcastNotifier;
    use crate::store::LibSqlBackend;
    use chrono::Utc;

    struct Fixture {
        db: Arc<dyn Database>,
        escalator: UrgencyEscalator,
        notifier: Arc<BroadcastNotifier>,
        tenant: Uuid,
        conversation: Conversation,
    }

    async fn fixture() -> Fixture {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let notifier = Arc::new(BroadcastNotifier::new());
        let escalator = UrgencyEscalator::new(
            Arc::clone(&db),
            AuditLog::new(Arc::clone(&db)),
            notifier.clone(),
        );

        let tenant = Uuid::new_v4();
        let contact = Contact {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            address: "+551199".to_string(),
            display_name: "+551199".to_string(),
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
            escalator,
            notifier,
            tenant,
            conversation,
        }
    }

    #[tokio::test]
    async fn upgrades_normal_to_high() {
        let f = fixture().await;

        let outcome = f
            .escalator
            .apply(&f.conversation, "Qual o prazo da audiência?")
            .await
            .unwrap();
        assert!(outcome.updated);
        assert_eq!(outcome.urgency, Urgency::High);

        let stored = f
            .db
            .get_conversation(f.tenant, f.conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.urgency, Urgency::High);
    }

    #[tokio::test]
    async fn never_downgrades() {
        let mut f = fixture().await;

        f.escalator
            .apply(&f.conversation, "liminar urgente")
            .await
            .unwrap();
        f.conversation.urgency = Urgency::Plantao;

        let outcome = f
            .escalator
            .apply(&f.conversation, "Bom dia, obrigado")
            .await
            .unwrap();
        assert!(!outcome.updated);
        assert_eq!(outcome.urgency, Urgency::Plantao);

        let stored = f
            .db
            .get_conversation(f.tenant, f.conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.urgency, Urgency::Plantao);
    }

    #[tokio::test]
    async fn equal_tier_is_noop() {
        let mut f = fixture().await;
        f.escalator
            .apply(&f.conversation, "tem prazo correndo")
            .await
            .unwrap();
        f.conversation.urgency = Urgency::High;

        let outcome = f
            .escalator
            .apply(&f.conversation, "e a audiência?")
            .await
            .unwrap();
        assert!(!outcome.updated);

        // Only one audit event for the single real upgrade.
        let events = f
            .db
            .list_audit_events(f.tenant, f.conversation.id)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "URGENCY_CHANGED");
    }

    #[tokio::test]
    async fn upgrade_appends_audit_and_notifies() {
        let f = fixture().await;
        let mut rx = f.notifier.subscribe();

        f.escalator
            .apply(&f.conversation, "fui preso")
            .await
            .unwrap();

        let events = f
            .db
            .list_audit_events(f.tenant, f.conversation.id)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old_value, Some(serde_json::json!("NORMAL")));
        assert_eq!(events[0].new_value, Some(serde_json::json!("PLANTAO")));

        match rx.recv().await.unwrap() {
            ConversationEvent::UrgencyChanged { urgency, .. } => {
                assert_eq!(urgency, Urgency::Plantao)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_reader_loses_race_without_audit() {
        let f = fixture().await;

        // Another writer upgrades first.
        f.db.update_conversation_urgency(f.tenant, f.conversation.id, Urgency::Normal, Urgency::High)
            .await
            .unwrap();

        // Our snapshot still says NORMAL; the conditional update must miss.
        let outcome = f
            .escalator
            .apply(&f.conversation, "urgente!")
            .await
            .unwrap();
        // Plantao > High, but the CAS keyed on NORMAL no longer matches.
        assert!(!outcome.updated);
        assert_eq!(outcome.urgency, Urgency::High);

        let events = f
            .db
            .list_audit_events(f.tenant, f.conversation.id)
            .await
            .unwrap();
        assert!(events.is_empty());
    }
}

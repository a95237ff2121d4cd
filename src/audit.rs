//! Append-only audit log.
//!
//! Every state-changing operation appends exactly one event and awaits the
//! write before the operation is considered done. The store exposes no update
//! or delete for audit rows.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::AuditEvent;
use crate::store::Database;

/// Actions recorded by the intake/referral flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    MessageReceived,
    MessageSent,
    UrgencyChanged,
    ConsentRequested,
    ConsentDenied,
    ReferredToPartner,
    ReferralFailedNoPartner,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::MessageReceived => "MESSAGE_RECEIVED",
            AuditAction::MessageSent => "MESSAGE_SENT",
            AuditAction::UrgencyChanged => "URGENCY_CHANGED",
            AuditAction::ConsentRequested => "CONSENT_REQUESTED",
            AuditAction::ConsentDenied => "CONSENT_DENIED",
            AuditAction::ReferredToPartner => "REFERRED_TO_PARTNER",
            AuditAction::ReferralFailedNoPartner => "REFERRAL_FAILED_NO_PARTNER",
        }
    }
}

/// Entity type tags used in audit rows.
pub mod entity {
    pub const CONVERSATION: &str = "conversation";
    pub const MESSAGE: &str = "message";
}

/// Appender for immutable audit events.
#[derive(Clone)]
pub struct AuditLog {
    db: Arc<dyn Database>,
}

impl AuditLog {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Append one event. Completes before the triggering operation returns.
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        tenant_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        action: AuditAction,
        actor_id: Option<Uuid>,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Result<(), DatabaseError> {
        let event = AuditEvent {
            id: Uuid::new_v4(),
            tenant_id,
            entity_type: entity_type.to_string(),
            entity_id,
            action: action.as_str().to_string(),
            old_value,
            new_value,
            actor_id,
            created_at: Utc::now(),
        };
        self.db.append_audit_event(&event).await
    }
}

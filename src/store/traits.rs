//! Unified `Database` trait — single async interface for all persistence.
//!
//! Every component receives an injected `Arc<dyn Database>`; there is no
//! ambient/global handle. All queries are tenant-scoped. Writes are single
//! statements — where a read-modify-write race matters (urgency, referral
//! state) the update is conditional on the expected prior value and reports
//! whether it took effect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    AuditEvent, Contact, Conversation, Message, Partner, Referral, ReferralState, Urgency,
};

/// Backend-agnostic database trait covering the intake/referral entities.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Contacts ────────────────────────────────────────────────────

    /// Look up a contact by its channel address.
    async fn get_contact_by_address(
        &self,
        tenant_id: Uuid,
        address: &str,
    ) -> Result<Option<Contact>, DatabaseError>;

    /// Insert a new contact.
    async fn insert_contact(&self, contact: &Contact) -> Result<(), DatabaseError>;

    // ── Conversations ───────────────────────────────────────────────

    /// Get a conversation by id.
    async fn get_conversation(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Conversation>, DatabaseError>;

    /// Get the OPEN conversation for a contact, if any.
    ///
    /// The schema guarantees at most one.
    async fn get_open_conversation(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<Conversation>, DatabaseError>;

    /// Insert a new conversation.
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), DatabaseError>;

    /// Conditionally set a conversation's urgency.
    ///
    /// The update only applies while the stored urgency still equals
    /// `expected`; returns whether a row changed. A `false` return means a
    /// concurrent writer got there first.
    async fn update_conversation_urgency(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected: Urgency,
        new: Urgency,
    ) -> Result<bool, DatabaseError>;

    /// Conditionally set a conversation's referral state. Same compare-and-set
    /// contract as [`update_conversation_urgency`](Self::update_conversation_urgency).
    async fn update_referral_state(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected: ReferralState,
        new: ReferralState,
    ) -> Result<bool, DatabaseError>;

    /// Bump a conversation's `last_message_at`.
    async fn touch_conversation(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Insert a message.
    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError>;

    /// Look up a message by its provider (channel-native) id.
    ///
    /// This is the idempotency probe for inbound deliveries.
    async fn get_message_by_provider_id(
        &self,
        tenant_id: Uuid,
        provider_message_id: &str,
    ) -> Result<Option<Message>, DatabaseError>;

    /// Mark an outbound message as handed to the channel.
    async fn mark_message_sent(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DatabaseError>;

    /// List messages in a conversation, oldest first, up to `limit`.
    async fn list_messages(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, DatabaseError>;

    // ── Partners ────────────────────────────────────────────────────

    /// Insert a partner.
    async fn insert_partner(&self, partner: &Partner) -> Result<(), DatabaseError>;

    /// List all ACTIVE partners for a tenant.
    ///
    /// Area filtering and round-robin ordering happen in the selection layer
    /// (`areas` is a JSON column).
    async fn list_active_partners(&self, tenant_id: Uuid) -> Result<Vec<Partner>, DatabaseError>;

    /// Advance a partner's `last_referral_at`, pushing it to the back of the
    /// round-robin queue.
    async fn update_partner_last_referral(
        &self,
        tenant_id: Uuid,
        partner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    // ── Referrals ───────────────────────────────────────────────────

    /// Insert a referral.
    async fn insert_referral(&self, referral: &Referral) -> Result<(), DatabaseError>;

    /// List referrals created for a conversation, oldest first.
    async fn list_referrals_for_conversation(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Vec<Referral>, DatabaseError>;

    // ── Audit ───────────────────────────────────────────────────────

    /// Append an audit event. There is deliberately no update or delete.
    async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), DatabaseError>;

    /// List audit events for an entity, oldest first.
    async fn list_audit_events(
        &self,
        tenant_id: Uuid,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEvent>, DatabaseError>;

    // ── Gamification ────────────────────────────────────────────────

    /// Add one point to an agent's ledger. Returns the new total.
    async fn add_agent_point(&self, tenant_id: Uuid, agent_id: Uuid)
    -> Result<i64, DatabaseError>;

    /// Current point total for an agent (0 if never awarded).
    async fn get_agent_points(&self, tenant_id: Uuid, agent_id: Uuid)
    -> Result<i64, DatabaseError>;
}

//! Domain entities shared by the store and the intake/referral components.
//!
//! All entities are tenant-scoped: every row carries a `tenant_id` and every
//! query filters on it. Timestamps are `DateTime<Utc>`, persisted as RFC 3339
//! text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Urgency tier of a conversation.
///
/// Ordered: `Normal < High < Plantao`. The escalation policy only ever moves
/// a conversation up this ordering, never down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    #[default]
    Normal,
    High,
    Plantao,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Normal => "NORMAL",
            Urgency::High => "HIGH",
            Urgency::Plantao => "PLANTAO",
        }
    }
}

impl std::str::FromStr for Urgency {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(Urgency::Normal),
            "HIGH" => Ok(Urgency::High),
            "PLANTAO" => Ok(Urgency::Plantao),
            _ => Err(()),
        }
    }
}

/// Where a conversation sits in the partner-referral flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralState {
    #[default]
    None,
    WaitingConsent,
    Referred,
}

impl ReferralState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralState::None => "NONE",
            ReferralState::WaitingConsent => "WAITING_CONSENT",
            ReferralState::Referred => "REFERRED",
        }
    }
}

impl std::str::FromStr for ReferralState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(ReferralState::None),
            "WAITING_CONSENT" => Ok(ReferralState::WaitingConsent),
            "REFERRED" => Ok(ReferralState::Referred),
            _ => Err(()),
        }
    }
}

/// Conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationStatus {
    #[default]
    Open,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Open => "OPEN",
            ConversationStatus::Closed => "CLOSED",
        }
    }
}

/// Message direction relative to the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "INBOUND",
            Direction::Outbound => "OUTBOUND",
        }
    }
}

/// Delivery status of a message.
///
/// Inbound messages are `Received` on persist. Outbound messages start
/// `Queued`; the channel client moves them to `Sent` on successful handoff.
/// A failed handoff leaves the row `Queued` for external reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Received,
    Queued,
    Sent,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Received => "RECEIVED",
            MessageStatus::Queued => "QUEUED",
            MessageStatus::Sent => "SENT",
        }
    }
}

/// Partner availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartnerStatus {
    Active,
    Inactive,
}

impl PartnerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerStatus::Active => "ACTIVE",
            PartnerStatus::Inactive => "INACTIVE",
        }
    }
}

/// A channel identity (e.g. a phone number) within one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Channel-native address, unique per tenant.
    pub address: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// An ongoing message thread between a tenant and one contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub contact_id: Uuid,
    pub status: ConversationStatus,
    pub urgency: Urgency,
    pub referral_state: ReferralState,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A persisted message inside a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub conversation_id: Uuid,
    pub direction: Direction,
    pub status: MessageStatus,
    pub content: String,
    /// Channel-native id; unique per tenant when present. Used as the
    /// idempotency key for inbound deliveries.
    pub provider_message_id: Option<String>,
    /// Human agent that authored an outbound message, if any.
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A referral target registered with a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// Practice areas this partner accepts, e.g. `["CIVIL", "TRABALHISTA"]`.
    pub areas: Vec<String>,
    pub status: PartnerStatus,
    /// When this partner last received a referral. `None` means never, which
    /// puts the partner at the front of the round-robin queue.
    pub last_referral_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A conversation handed off to a partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub conversation_id: Uuid,
    pub partner_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Referrals are created in this status; later lifecycle is out of scope.
pub const REFERRAL_STATUS_PENDING: &str = "PENDING";

/// Immutable record of a state-changing action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_ordering() {
        assert!(Urgency::Normal < Urgency::High);
        assert!(Urgency::High < Urgency::Plantao);
    }

    #[test]
    fn urgency_roundtrip() {
        for u in [Urgency::Normal, Urgency::High, Urgency::Plantao] {
            assert_eq!(u.as_str().parse::<Urgency>(), Ok(u));
        }
        assert!("PANIC".parse::<Urgency>().is_err());
    }

    #[test]
    fn referral_state_roundtrip() {
        for s in [
            ReferralState::None,
            ReferralState::WaitingConsent,
            ReferralState::Referred,
        ] {
            assert_eq!(s.as_str().parse::<ReferralState>(), Ok(s));
        }
    }

    #[test]
    fn enums_serialize_screaming_snake() {
        let json = serde_json::to_string(&ReferralState::WaitingConsent).unwrap();
        assert_eq!(json, "\"WAITING_CONSENT\"");
        let json = serde_json::to_string(&Urgency::Plantao).unwrap();
        assert_eq!(json, "\"PLANTAO\"");
    }
}

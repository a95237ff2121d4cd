//! Real-time conversation events — broadcast to connected clients.
//!
//! Events are fanned out via a `tokio::sync::broadcast` channel and forwarded
//! to WebSocket clients by the HTTP layer. Delivery is at-most-once and
//! best-effort: a full or closed channel never fails the operation that
//! emitted the event.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::model::Urgency;

/// Default broadcast buffer; slow clients past this lag drop events.
const EVENT_BUFFER: usize = 256;

/// Events streamed to clients watching a tenant's conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// An inbound message was accepted and persisted.
    MessageReceived {
        tenant_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
        content: String,
    },
    /// An outbound message was queued for delivery.
    MessageSent {
        tenant_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
        content: String,
    },
    /// The conversation's urgency was escalated.
    UrgencyChanged {
        tenant_id: Uuid,
        conversation_id: Uuid,
        urgency: Urgency,
    },
}

impl ConversationEvent {
    /// Tenant this event belongs to (used for per-tenant WS filtering).
    pub fn tenant_id(&self) -> Uuid {
        match self {
            Self::MessageReceived { tenant_id, .. }
            | Self::MessageSent { tenant_id, .. }
            | Self::UrgencyChanged { tenant_id, .. } => *tenant_id,
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        match self {
            Self::MessageReceived {
                conversation_id, ..
            }
            | Self::MessageSent {
                conversation_id, ..
            }
            | Self::UrgencyChanged {
                conversation_id, ..
            } => *conversation_id,
        }
    }
}

/// Fire-and-forget event sink injected into the intake/messaging components.
pub trait Notifier: Send + Sync {
    /// Emit an event. Must never fail the caller.
    fn notify(&self, event: ConversationEvent);
}

/// Broadcast-channel notifier backing the WebSocket fan-out.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ConversationEvent>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// Subscribe to the live event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: ConversationEvent) {
        // send() errors only when there are no receivers; that is fine.
        if self.tx.send(event).is_err() {
            debug!("No live subscribers for conversation event");
        }
    }
}

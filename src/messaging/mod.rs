//! Outbound messaging.

pub mod outbound;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::model::{Message, Partner};

/// Physical delivery seam — the actual channel transport lives outside the
/// core. Implementations receive the persisted message and do whatever the
/// provider needs.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// Side channel used to tell a partner about a new referral. Best-effort.
#[async_trait]
pub trait PartnerNotifier: Send + Sync {
    async fn notify_partner(
        &self,
        partner: &Partner,
        conversation_id: Uuid,
    ) -> Result<(), DeliveryError>;
}

/// Channel client that only logs. Default wiring until a real transport is
/// configured; also handy in tests.
pub struct NullChannelClient;

#[async_trait]
impl ChannelClient for NullChannelClient {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        debug!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            "Channel delivery skipped (no transport configured)"
        );
        Ok(())
    }
}

/// Partner notifier that only logs.
pub struct NullPartnerNotifier;

#[async_trait]
impl PartnerNotifier for NullPartnerNotifier {
    async fn notify_partner(
        &self,
        partner: &Partner,
        conversation_id: Uuid,
    ) -> Result<(), DeliveryError> {
        debug!(
            partner_id = %partner.id,
            conversation_id = %conversation_id,
            "Partner notification skipped (no side channel configured)"
        );
        Ok(())
    }
}

//! Identity resolution — find-or-create contact and open conversation.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{Contact, Conversation, ConversationStatus, ReferralState, Urgency};
use crate::store::Database;

/// Resolves inbound addresses to contacts and open conversations, creating
/// them lazily on first sight.
pub struct IdentityResolver {
    db: Arc<dyn Database>,
}

impl IdentityResolver {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Find the contact for an address, creating it if absent.
    ///
    /// New contacts get the address as display name until someone renames
    /// them. A concurrent create losing the unique-constraint race falls back
    /// to the winner's row.
    pub async fn resolve_contact(
        &self,
        tenant_id: Uuid,
        address: &str,
    ) -> Result<Contact, DatabaseError> {
        if let Some(existing) = self.db.get_contact_by_address(tenant_id, address).await? {
            return Ok(existing);
        }

        let contact = Contact {
            id: Uuid::new_v4(),
            tenant_id,
            address: address.to_string(),
            display_name: address.to_string(),
            created_at: Utc::now(),
        };

        match self.db.insert_contact(&contact).await {
            Ok(()) => {
                debug!(contact_id = %contact.id, address = %address, "Contact created");
                Ok(contact)
            }
            Err(DatabaseError::Constraint(_)) => self
                .db
                .get_contact_by_address(tenant_id, address)
                .await?
                .ok_or(DatabaseError::NotFound {
                    entity: "contact",
                    id: contact.id,
                }),
            Err(e) => Err(e),
        }
    }

    /// Find the contact's OPEN conversation, creating one if none exists.
    ///
    /// New conversations start `OPEN / NORMAL / NONE`.
    pub async fn resolve_open_conversation(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Conversation, DatabaseError> {
        if let Some(existing) = self.db.get_open_conversation(tenant_id, contact_id).await? {
            return Ok(existing);
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            tenant_id,
            contact_id,
            status: ConversationStatus::Open,
            urgency: Urgency::Normal,
            referral_state: ReferralState::None,
            last_message_at: None,
            created_at: Utc::now(),
        };

        match self.db.insert_conversation(&conversation).await {
            Ok(()) => {
                debug!(conversation_id = %conversation.id, "Conversation opened");
                Ok(conversation)
            }
            Err(DatabaseError::Constraint(_)) => self
                .db
                .get_open_conversation(tenant_id, contact_id)
                .await?
                .ok_or(DatabaseError::NotFound {
                    entity: "conversation",
                    id: conversation.id,
                }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn resolver() -> (IdentityResolver, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (IdentityResolver::new(Arc::clone(&db)), db)
    }

    #[tokio::test]
    async fn creates_contact_on_first_sight() {
        let (resolver, _db) = resolver().await;
        let tenant = Uuid::new_v4();

        let contact = resolver
            .resolve_contact(tenant, "+5511987654321")
            .await
            .unwrap();
        assert_eq!(contact.display_name, "+5511987654321");

        let again = resolver
            .resolve_contact(tenant, "+5511987654321")
            .await
            .unwrap();
        assert_eq!(again.id, contact.id);
    }

    #[tokio::test]
    async fn contacts_are_tenant_scoped() {
        let (resolver, _db) = resolver().await;

        let a = resolver
            .resolve_contact(Uuid::new_v4(), "+551100")
            .await
            .unwrap();
        let b = resolver
            .resolve_contact(Uuid::new_v4(), "+551100")
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn reuses_open_conversation() {
        let (resolver, _db) = resolver().await;
        let tenant = Uuid::new_v4();
        let contact = resolver.resolve_contact(tenant, "+551101").await.unwrap();

        let first = resolver
            .resolve_open_conversation(tenant, contact.id)
            .await
            .unwrap();
        assert_eq!(first.status, ConversationStatus::Open);
        assert_eq!(first.urgency, Urgency::Normal);
        assert_eq!(first.referral_state, ReferralState::None);

        let second = resolver
            .resolve_open_conversation(tenant, contact.id)
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
    }
}

//! Referral coordinator — consent state machine and partner handoff.
//!
//! Consent transitions: `NONE → WAITING_CONSENT` (prompt sent), then an
//! affirmative reply moves to `REFERRED` via partner selection and a negative
//! reply falls back to `NONE`. Unrecognized replies leave the state alone.
//! All transitions are conditional store updates keyed on the expected prior
//! state, so two near-simultaneous replies cannot both take the same edge.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog, entity};
use crate::config::{IntakeConfig, NoPartnerPolicy};
use crate::error::Result;
use crate::messaging::PartnerNotifier;
use crate::messaging::outbound::OutboundMessenger;
use crate::model::{REFERRAL_STATUS_PENDING, Referral, ReferralState};
use crate::referral::selection::PartnerSelector;
use crate::store::Database;

/// What a consent reply meant, after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsentReply {
    Affirmative,
    Negative,
    Unrecognized,
}

/// Normalize a consent reply: trim, uppercase, fold Portuguese diacritics.
///
/// Folding makes `"não"`, `"NÃO"` and `"nao"` all hit the negative set
/// instead of depending on how the sender's keyboard composed the accent.
fn normalize_reply(content: &str) -> String {
    content
        .trim()
        .to_uppercase()
        .chars()
        .map(|c| match c {
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'É' | 'Ê' | 'Ë' | 'È' => 'E',
            'Í' | 'Î' | 'Ï' | 'Ì' => 'I',
            'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ò' => 'O',
            'Ú' | 'Û' | 'Ü' | 'Ù' => 'U',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

fn parse_reply(content: &str) -> ConsentReply {
    match normalize_reply(content).as_str() {
        "SIM" | "S" => ConsentReply::Affirmative,
        "NAO" | "N" => ConsentReply::Negative,
        _ => ConsentReply::Unrecognized,
    }
}

/// Drives the consent flow and the handoff to partners.
pub struct ReferralCoordinator {
    db: Arc<dyn Database>,
    messenger: Arc<OutboundMessenger>,
    audit: AuditLog,
    selector: PartnerSelector,
    partner_notifier: Arc<dyn PartnerNotifier>,
    config: IntakeConfig,
}

impl ReferralCoordinator {
    pub fn new(
        db: Arc<dyn Database>,
        messenger: Arc<OutboundMessenger>,
        audit: AuditLog,
        partner_notifier: Arc<dyn PartnerNotifier>,
        config: IntakeConfig,
    ) -> Self {
        let selector = PartnerSelector::new(Arc::clone(&db));
        Self {
            db,
            messenger,
            audit,
            selector,
            partner_notifier,
            config,
        }
    }

    /// Ask the contact for consent to refer their case.
    ///
    /// Only conversations in `NONE` transition; anything else is a no-op so
    /// repeated requests do not spam the contact.
    pub async fn request_consent(&self, tenant_id: Uuid, conversation_id: Uuid) -> Result<()> {
        let moved = self
            .db
            .update_referral_state(
                tenant_id,
                conversation_id,
                ReferralState::None,
                ReferralState::WaitingConsent,
            )
            .await?;
        if !moved {
            debug!(
                conversation_id = %conversation_id,
                "Consent request skipped, conversation not in NONE"
            );
            return Ok(());
        }

        self.messenger
            .send(tenant_id, conversation_id, &self.config.consent_prompt, None)
            .await?;

        self.audit
            .append(
                tenant_id,
                entity::CONVERSATION,
                conversation_id,
                AuditAction::ConsentRequested,
                None,
                Some(serde_json::json!(ReferralState::None.as_str())),
                Some(serde_json::json!(ReferralState::WaitingConsent.as_str())),
            )
            .await?;

        info!(conversation_id = %conversation_id, "Consent requested");
        Ok(())
    }

    /// Route a contact's reply while the conversation waits on consent.
    ///
    /// Called by the intake gateway before urgency processing. Unrecognized
    /// text changes nothing; the gateway records the message either way.
    pub async fn handle_consent_response(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<()> {
        match parse_reply(content) {
            ConsentReply::Affirmative => self.execute_referral(tenant_id, conversation_id).await,
            ConsentReply::Negative => self.handle_refusal(tenant_id, conversation_id).await,
            ConsentReply::Unrecognized => {
                debug!(
                    conversation_id = %conversation_id,
                    "Reply did not match consent vocabulary, state unchanged"
                );
                Ok(())
            }
        }
    }

    /// Hand the conversation to the next eligible partner.
    pub async fn execute_referral(&self, tenant_id: Uuid, conversation_id: Uuid) -> Result<()> {
        let area = self.config.default_practice_area.as_str();

        let Some(partner) = self.selector.select_partner(tenant_id, area).await? else {
            return self.handle_no_partner(tenant_id, conversation_id, area).await;
        };

        let referral = Referral {
            id: Uuid::new_v4(),
            tenant_id,
            conversation_id,
            partner_id: partner.id,
            status: REFERRAL_STATUS_PENDING.to_string(),
            created_at: Utc::now(),
        };
        self.db.insert_referral(&referral).await?;

        // Best-effort side channel; the referral stands even if it fails.
        if let Err(e) = self
            .partner_notifier
            .notify_partner(&partner, conversation_id)
            .await
        {
            warn!(partner_id = %partner.id, error = %e, "Partner notification failed");
        }

        self.messenger
            .send(
                tenant_id,
                conversation_id,
                &self.config.referral_confirmation,
                None,
            )
            .await?;

        let moved = self
            .db
            .update_referral_state(
                tenant_id,
                conversation_id,
                ReferralState::WaitingConsent,
                ReferralState::Referred,
            )
            .await?;
        // Only audit the transition if we actually took it; a concurrent
        // writer that moved the state first owns its own trail.
        if moved {
            self.audit
                .append(
                    tenant_id,
                    entity::CONVERSATION,
                    conversation_id,
                    AuditAction::ReferredToPartner,
                    None,
                    Some(serde_json::json!(ReferralState::WaitingConsent.as_str())),
                    Some(serde_json::json!({
                        "state": ReferralState::Referred.as_str(),
                        "partner_id": partner.id,
                    })),
                )
                .await?;
        } else {
            warn!(
                conversation_id = %conversation_id,
                "Conversation left WAITING_CONSENT during referral"
            );
        }

        info!(
            conversation_id = %conversation_id,
            partner_id = %partner.id,
            "Conversation referred to partner"
        );
        Ok(())
    }

    /// The contact declined: offer the fallback and reset the flow.
    pub async fn handle_refusal(&self, tenant_id: Uuid, conversation_id: Uuid) -> Result<()> {
        self.messenger
            .send(
                tenant_id,
                conversation_id,
                &self.config.refusal_fallback,
                None,
            )
            .await?;

        self.db
            .update_referral_state(
                tenant_id,
                conversation_id,
                ReferralState::WaitingConsent,
                ReferralState::None,
            )
            .await?;

        self.audit
            .append(
                tenant_id,
                entity::CONVERSATION,
                conversation_id,
                AuditAction::ConsentDenied,
                None,
                Some(serde_json::json!(ReferralState::WaitingConsent.as_str())),
                Some(serde_json::json!(ReferralState::None.as_str())),
            )
            .await?;

        info!(conversation_id = %conversation_id, "Consent denied");
        Ok(())
    }

    async fn handle_no_partner(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        area: &str,
    ) -> Result<()> {
        self.messenger
            .send(
                tenant_id,
                conversation_id,
                &self.config.no_partner_fallback,
                None,
            )
            .await?;

        self.audit
            .append(
                tenant_id,
                entity::CONVERSATION,
                conversation_id,
                AuditAction::ReferralFailedNoPartner,
                None,
                None,
                Some(serde_json::json!({ "area": area })),
            )
            .await?;

        match self.config.no_partner_policy {
            NoPartnerPolicy::KeepWaiting => {
                debug!(
                    conversation_id = %conversation_id,
                    "No partner available, keeping WAITING_CONSENT"
                );
            }
            NoPartnerPolicy::ResetConsent => {
                self.db
                    .update_referral_state(
                        tenant_id,
                        conversation_id,
                        ReferralState::WaitingConsent,
                        ReferralState::None,
                    )
                    .await?;
                debug!(
                    conversation_id = %conversation_id,
                    "No partner available, consent reset to NONE"
                );
            }
        }

        warn!(
            conversation_id = %conversation_id,
            area = %area,
            "Referral failed: no eligible partner"
        );
        Ok(())
    }
}

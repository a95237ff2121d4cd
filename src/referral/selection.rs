//! Round-robin partner selection with a capability filter.
//!
//! Eligible partners are ACTIVE and cover the requested practice area. The
//! queue orders by `last_referral_at` ascending with never-referred partners
//! first; selecting a partner advances its `last_referral_at` to now, pushing
//! it to the back, so repeated selection distributes evenly. Ties break on
//! `(created_at, id)` to keep the order stable.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::Partner;
use crate::store::Database;

/// Picks the least-recently-used eligible partner.
pub struct PartnerSelector {
    db: Arc<dyn Database>,
}

impl PartnerSelector {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Select the next partner for `area`, advancing its `last_referral_at`.
    ///
    /// Returns `None` when no ACTIVE partner covers the area. Area matching
    /// is ASCII-case-insensitive (areas are stored uppercase by convention).
    pub async fn select_partner(
        &self,
        tenant_id: Uuid,
        area: &str,
    ) -> Result<Option<Partner>, DatabaseError> {
        let mut eligible: Vec<Partner> = self
            .db
            .list_active_partners(tenant_id)
            .await?
            .into_iter()
            .filter(|p| p.areas.iter().any(|a| a.eq_ignore_ascii_case(area)))
            .collect();

        // Nulls first, then oldest referral, then stable creation order.
        eligible.sort_by(|a, b| {
            a.last_referral_at
                .cmp(&b.last_referral_at)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let Some(mut chosen) = eligible.into_iter().next() else {
            debug!(area = %area, "No eligible partner");
            return Ok(None);
        };

        let now = Utc::now();
        self.db
            .update_partner_last_referral(tenant_id, chosen.id, now)
            .await?;
        chosen.last_referral_at = Some(now);

        debug!(partner_id = %chosen.id, area = %area, "Partner selected");
        Ok(Some(chosen))
    }
}

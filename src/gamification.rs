//! Gamification hook — points for human agents answering conversations.
//!
//! The messenger calls this after persisting a human-authored outbound
//! message. Failures here are logged by the caller and never roll back the
//! message.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::Database;

/// Hook invoked for each human-authored outbound message.
#[async_trait]
pub trait GamificationHook: Send + Sync {
    /// Award one point to the agent. Returns the agent's new total.
    async fn award_point(&self, tenant_id: Uuid, agent_id: Uuid) -> Result<i64, DatabaseError>;
}

/// Store-backed points ledger.
pub struct PointsLedger {
    db: Arc<dyn Database>,
}

impl PointsLedger {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GamificationHook for PointsLedger {
    async fn award_point(&self, tenant_id: Uuid, agent_id: Uuid) -> Result<i64, DatabaseError> {
        let total = self.db.add_agent_point(tenant_id, agent_id).await?;
        debug!(agent_id = %agent_id, total, "Point awarded");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    #[tokio::test]
    async fn ledger_awards_points_per_agent() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let ledger = PointsLedger::new(Arc::clone(&db));
        let tenant = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bruno = Uuid::new_v4();

        assert_eq!(ledger.award_point(tenant, alice).await.unwrap(), 1);
        assert_eq!(ledger.award_point(tenant, alice).await.unwrap(), 2);
        assert_eq!(ledger.award_point(tenant, bruno).await.unwrap(), 1);
        assert_eq!(db.get_agent_points(tenant, alice).await.unwrap(), 2);
    }
}

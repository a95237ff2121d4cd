//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! RFC 3339 text; `Partner::areas` and audit old/new values are JSON text
//! columns.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    AuditEvent, Contact, Conversation, ConversationStatus, Direction, Message, MessageStatus,
    Partner, PartnerStatus, Referral, ReferralState, Urgency,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_optional_uuid(s: &Option<String>) -> Option<Uuid> {
    s.as_ref().map(|s| parse_uuid(s))
}

fn str_to_conversation_status(s: &str) -> ConversationStatus {
    match s {
        "CLOSED" => ConversationStatus::Closed,
        _ => ConversationStatus::Open,
    }
}

fn str_to_direction(s: &str) -> Direction {
    match s {
        "OUTBOUND" => Direction::Outbound,
        _ => Direction::Inbound,
    }
}

fn str_to_msg_status(s: &str) -> MessageStatus {
    match s {
        "QUEUED" => MessageStatus::Queued,
        "SENT" => MessageStatus::Sent,
        _ => MessageStatus::Received,
    }
}

fn str_to_partner_status(s: &str) -> PartnerStatus {
    match s {
        "INACTIVE" => PartnerStatus::Inactive,
        _ => PartnerStatus::Active,
    }
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map an execute error, tagging unique-constraint hits.
fn map_exec_err(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

// ── Row mappers ─────────────────────────────────────────────────────

const CONTACT_COLUMNS: &str = "id, tenant_id, address, display_name, created_at";

fn row_to_contact(row: &libsql::Row) -> Result<Contact, libsql::Error> {
    let id: String = row.get(0)?;
    let tenant_id: String = row.get(1)?;
    let created_str: String = row.get(4)?;

    Ok(Contact {
        id: parse_uuid(&id),
        tenant_id: parse_uuid(&tenant_id),
        address: row.get(2)?,
        display_name: row.get(3)?,
        created_at: parse_datetime(&created_str),
    })
}

const CONVERSATION_COLUMNS: &str =
    "id, tenant_id, contact_id, status, urgency, referral_state, last_message_at, created_at";

fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, libsql::Error> {
    let id: String = row.get(0)?;
    let tenant_id: String = row.get(1)?;
    let contact_id: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let urgency_str: String = row.get(4)?;
    let referral_str: String = row.get(5)?;
    let last_message_str: Option<String> = row.get(6).ok();
    let created_str: String = row.get(7)?;

    Ok(Conversation {
        id: parse_uuid(&id),
        tenant_id: parse_uuid(&tenant_id),
        contact_id: parse_uuid(&contact_id),
        status: str_to_conversation_status(&status_str),
        urgency: urgency_str.parse::<Urgency>().unwrap_or_default(),
        referral_state: referral_str.parse::<ReferralState>().unwrap_or_default(),
        last_message_at: parse_optional_datetime(&last_message_str),
        created_at: parse_datetime(&created_str),
    })
}

const MESSAGE_COLUMNS: &str =
    "id, tenant_id, conversation_id, direction, status, content, provider_message_id, actor_id, created_at";

fn row_to_message(row: &libsql::Row) -> Result<Message, libsql::Error> {
    let id: String = row.get(0)?;
    let tenant_id: String = row.get(1)?;
    let conversation_id: String = row.get(2)?;
    let direction_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let provider_id: Option<String> = row.get(6).ok();
    let actor_id: Option<String> = row.get(7).ok();
    let created_str: String = row.get(8)?;

    Ok(Message {
        id: parse_uuid(&id),
        tenant_id: parse_uuid(&tenant_id),
        conversation_id: parse_uuid(&conversation_id),
        direction: str_to_direction(&direction_str),
        status: str_to_msg_status(&status_str),
        content: row.get(5)?,
        provider_message_id: provider_id,
        actor_id: parse_optional_uuid(&actor_id),
        created_at: parse_datetime(&created_str),
    })
}

const PARTNER_COLUMNS: &str = "id, tenant_id, name, areas, status, last_referral_at, created_at";

fn row_to_partner(row: &libsql::Row) -> Result<Partner, libsql::Error> {
    let id: String = row.get(0)?;
    let tenant_id: String = row.get(1)?;
    let areas_json: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let last_referral_str: Option<String> = row.get(5).ok();
    let created_str: String = row.get(6)?;

    Ok(Partner {
        id: parse_uuid(&id),
        tenant_id: parse_uuid(&tenant_id),
        name: row.get(2)?,
        areas: serde_json::from_str(&areas_json).unwrap_or_default(),
        status: str_to_partner_status(&status_str),
        last_referral_at: parse_optional_datetime(&last_referral_str),
        created_at: parse_datetime(&created_str),
    })
}

const REFERRAL_COLUMNS: &str = "id, tenant_id, conversation_id, partner_id, status, created_at";

fn row_to_referral(row: &libsql::Row) -> Result<Referral, libsql::Error> {
    let id: String = row.get(0)?;
    let tenant_id: String = row.get(1)?;
    let conversation_id: String = row.get(2)?;
    let partner_id: String = row.get(3)?;
    let created_str: String = row.get(5)?;

    Ok(Referral {
        id: parse_uuid(&id),
        tenant_id: parse_uuid(&tenant_id),
        conversation_id: parse_uuid(&conversation_id),
        partner_id: parse_uuid(&partner_id),
        status: row.get(4)?,
        created_at: parse_datetime(&created_str),
    })
}

const AUDIT_COLUMNS: &str =
    "id, tenant_id, entity_type, entity_id, action, old_value, new_value, actor_id, created_at";

fn row_to_audit_event(row: &libsql::Row) -> Result<AuditEvent, libsql::Error> {
    let id: String = row.get(0)?;
    let tenant_id: String = row.get(1)?;
    let entity_id: String = row.get(3)?;
    let old_value: Option<String> = row.get(5).ok();
    let new_value: Option<String> = row.get(6).ok();
    let actor_id: Option<String> = row.get(7).ok();
    let created_str: String = row.get(8)?;

    Ok(AuditEvent {
        id: parse_uuid(&id),
        tenant_id: parse_uuid(&tenant_id),
        entity_type: row.get(2)?,
        entity_id: parse_uuid(&entity_id),
        action: row.get(4)?,
        old_value: old_value.and_then(|s| serde_json::from_str(&s).ok()),
        new_value: new_value.and_then(|s| serde_json::from_str(&s).ok()),
        actor_id: parse_optional_uuid(&actor_id),
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn get_contact_by_address(
        &self,
        tenant_id: Uuid,
        address: &str,
    ) -> Result<Option<Contact>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = ?1 AND address = ?2"
                ),
                params![tenant_id.to_string(), address],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_contact_by_address: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let contact = row_to_contact(&row).map_err(|e| {
                    DatabaseError::Query(format!("get_contact_by_address row parse: {e}"))
                })?;
                Ok(Some(contact))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_contact_by_address: {e}"))),
        }
    }

    async fn insert_contact(&self, contact: &Contact) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO contacts (id, tenant_id, address, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    contact.id.to_string(),
                    contact.tenant_id.to_string(),
                    contact.address.as_str(),
                    contact.display_name.as_str(),
                    contact.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_exec_err("insert_contact", e))?;

        debug!(contact_id = %contact.id, address = %contact.address, "Contact inserted");
        Ok(())
    }

    async fn get_conversation(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE tenant_id = ?1 AND id = ?2"
                ),
                params![tenant_id.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_conversation(&row).map_err(|e| {
                DatabaseError::Query(format!("get_conversation row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_conversation: {e}"))),
        }
    }

    async fn get_open_conversation(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE tenant_id = ?1 AND contact_id = ?2 AND status = 'OPEN'"
                ),
                params![tenant_id.to_string(), contact_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_open_conversation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_conversation(&row).map_err(|e| {
                DatabaseError::Query(format!("get_open_conversation row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_open_conversation: {e}"))),
        }
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO conversations
                     (id, tenant_id, contact_id, status, urgency, referral_state, last_message_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    conversation.id.to_string(),
                    conversation.tenant_id.to_string(),
                    conversation.contact_id.to_string(),
                    conversation.status.as_str(),
                    conversation.urgency.as_str(),
                    conversation.referral_state.as_str(),
                    conversation.last_message_at.map(|t| t.to_rfc3339()),
                    conversation.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_exec_err("insert_conversation", e))?;

        debug!(conversation_id = %conversation.id, "Conversation inserted");
        Ok(())
    }

    async fn update_conversation_urgency(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected: Urgency,
        new: Urgency,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE conversations SET urgency = ?1
                 WHERE tenant_id = ?2 AND id = ?3 AND urgency = ?4",
                params![
                    new.as_str(),
                    tenant_id.to_string(),
                    id.to_string(),
                    expected.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_conversation_urgency: {e}")))?;

        Ok(affected > 0)
    }

    async fn update_referral_state(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected: ReferralState,
        new: ReferralState,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE conversations SET referral_state = ?1
                 WHERE tenant_id = ?2 AND id = ?3 AND referral_state = ?4",
                params![
                    new.as_str(),
                    tenant_id.to_string(),
                    id.to_string(),
                    expected.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_referral_state: {e}")))?;

        Ok(affected > 0)
    }

    async fn touch_conversation(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE conversations SET last_message_at = ?1
                 WHERE tenant_id = ?2 AND id = ?3",
                params![at.to_rfc3339(), tenant_id.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch_conversation: {e}")))?;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO messages
                     (id, tenant_id, conversation_id, direction, status, content, provider_message_id, actor_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    message.id.to_string(),
                    message.tenant_id.to_string(),
                    message.conversation_id.to_string(),
                    message.direction.as_str(),
                    message.status.as_str(),
                    message.content.as_str(),
                    opt_text(message.provider_message_id.as_deref()),
                    message.actor_id.map(|a| a.to_string()),
                    message.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_exec_err("insert_message", e))?;

        debug!(
            message_id = %message.id,
            direction = message.direction.as_str(),
            "Message inserted"
        );
        Ok(())
    }

    async fn get_message_by_provider_id(
        &self,
        tenant_id: Uuid,
        provider_message_id: &str,
    ) -> Result<Option<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE tenant_id = ?1 AND provider_message_id = ?2"
                ),
                params![tenant_id.to_string(), provider_message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_message_by_provider_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_message(&row).map_err(|e| {
                DatabaseError::Query(format!("get_message_by_provider_id row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "get_message_by_provider_id: {e}"
            ))),
        }
    }

    async fn mark_message_sent(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE messages SET status = 'SENT' WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_message_sent: {e}")))?;
        Ok(())
    }

    async fn list_messages(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE tenant_id = ?1 AND conversation_id = ?2
                     ORDER BY created_at ASC LIMIT ?3"
                ),
                params![
                    tenant_id.to_string(),
                    conversation_id.to_string(),
                    limit as i64
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_message(&row) {
                Ok(m) => messages.push(m),
                Err(e) => tracing::warn!("Skipping message row: {e}"),
            }
        }
        Ok(messages)
    }

    async fn insert_partner(&self, partner: &Partner) -> Result<(), DatabaseError> {
        let areas_json = serde_json::to_string(&partner.areas)
            .map_err(|e| DatabaseError::Serialization(format!("partner areas: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO partners (id, tenant_id, name, areas, status, last_referral_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    partner.id.to_string(),
                    partner.tenant_id.to_string(),
                    partner.name.as_str(),
                    areas_json,
                    partner.status.as_str(),
                    partner.last_referral_at.map(|t| t.to_rfc3339()),
                    partner.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_exec_err("insert_partner", e))?;

        debug!(partner_id = %partner.id, name = %partner.name, "Partner inserted");
        Ok(())
    }

    async fn list_active_partners(&self, tenant_id: Uuid) -> Result<Vec<Partner>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PARTNER_COLUMNS} FROM partners
                     WHERE tenant_id = ?1 AND status = 'ACTIVE'
                     ORDER BY created_at ASC"
                ),
                params![tenant_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_partners: {e}")))?;

        let mut partners = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_partner(&row) {
                Ok(p) => partners.push(p),
                Err(e) => tracing::warn!("Skipping partner row: {e}"),
            }
        }
        Ok(partners)
    }

    async fn update_partner_last_referral(
        &self,
        tenant_id: Uuid,
        partner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE partners SET last_referral_at = ?1 WHERE tenant_id = ?2 AND id = ?3",
                params![
                    at.to_rfc3339(),
                    tenant_id.to_string(),
                    partner_id.to_string()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_partner_last_referral: {e}")))?;
        Ok(())
    }

    async fn insert_referral(&self, referral: &Referral) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO referrals (id, tenant_id, conversation_id, partner_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    referral.id.to_string(),
                    referral.tenant_id.to_string(),
                    referral.conversation_id.to_string(),
                    referral.partner_id.to_string(),
                    referral.status.as_str(),
                    referral.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_exec_err("insert_referral", e))?;

        debug!(
            referral_id = %referral.id,
            partner_id = %referral.partner_id,
            "Referral inserted"
        );
        Ok(())
    }

    async fn list_referrals_for_conversation(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Vec<Referral>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {REFERRAL_COLUMNS} FROM referrals
                     WHERE tenant_id = ?1 AND conversation_id = ?2
                     ORDER BY created_at ASC"
                ),
                params![tenant_id.to_string(), conversation_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_referrals_for_conversation: {e}")))?;

        let mut referrals = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_referral(&row) {
                Ok(r) => referrals.push(r),
                Err(e) => tracing::warn!("Skipping referral row: {e}"),
            }
        }
        Ok(referrals)
    }

    async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), DatabaseError> {
        let old_value = event
            .old_value
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()
            .map_err(|e| DatabaseError::Serialization(format!("audit old_value: {e}")))?;
        let new_value = event
            .new_value
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()
            .map_err(|e| DatabaseError::Serialization(format!("audit new_value: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO audit_events
                     (id, tenant_id, entity_type, entity_id, action, old_value, new_value, actor_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.id.to_string(),
                    event.tenant_id.to_string(),
                    event.entity_type.as_str(),
                    event.entity_id.to_string(),
                    event.action.as_str(),
                    old_value,
                    new_value,
                    event.actor_id.map(|a| a.to_string()),
                    event.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_exec_err("append_audit_event", e))?;
        Ok(())
    }

    async fn list_audit_events(
        &self,
        tenant_id: Uuid,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEvent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_events
                     WHERE tenant_id = ?1 AND entity_id = ?2
                     ORDER BY created_at ASC, id ASC"
                ),
                params![tenant_id.to_string(), entity_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_audit_events: {e}")))?;

        let mut events = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_audit_event(&row) {
                Ok(ev) => events.push(ev),
                Err(e) => tracing::warn!("Skipping audit row: {e}"),
            }
        }
        Ok(events)
    }

    async fn add_agent_point(
        &self,
        tenant_id: Uuid,
        agent_id: Uuid,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO agent_points (tenant_id, agent_id, points, updated_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT (tenant_id, agent_id)
                 DO UPDATE SET points = points + 1, updated_at = ?3",
                params![tenant_id.to_string(), agent_id.to_string(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_agent_point: {e}")))?;

        self.get_agent_points(tenant_id, agent_id).await
    }

    async fn get_agent_points(
        &self,
        tenant_id: Uuid,
        agent_id: Uuid,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT points FROM agent_points WHERE tenant_id = ?1 AND agent_id = ?2",
                params![tenant_id.to_string(), agent_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_agent_points: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("get_agent_points parse: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("get_agent_points: {e}"))),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

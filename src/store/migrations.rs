//! Version-tracked schema migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks the
//! current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            address TEXT NOT NULL,
            display_name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (tenant_id, address)
        );
        CREATE INDEX IF NOT EXISTS idx_contacts_tenant ON contacts(tenant_id);

        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            contact_id TEXT NOT NULL REFERENCES contacts(id),
            status TEXT NOT NULL DEFAULT 'OPEN',
            urgency TEXT NOT NULL DEFAULT 'NORMAL',
            referral_state TEXT NOT NULL DEFAULT 'NONE',
            last_message_at TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_tenant_contact
            ON conversations(tenant_id, contact_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_one_open
            ON conversations(tenant_id, contact_id) WHERE status = 'OPEN';

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            direction TEXT NOT NULL,
            status TEXT NOT NULL,
            content TEXT NOT NULL,
            provider_message_id TEXT,
            actor_id TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_provider_id
            ON messages(tenant_id, provider_message_id)
            WHERE provider_message_id IS NOT NULL;

        CREATE TABLE IF NOT EXISTS partners (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            areas TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            last_referral_at TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_partners_tenant_status
            ON partners(tenant_id, status);

        CREATE TABLE IF NOT EXISTS referrals (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            partner_id TEXT NOT NULL REFERENCES partners(id),
            status TEXT NOT NULL DEFAULT 'PENDING',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_referrals_conversation
            ON referrals(conversation_id);

        CREATE TABLE IF NOT EXISTS audit_events (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            action TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT,
            actor_id TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_tenant_entity
            ON audit_events(tenant_id, entity_id);

        CREATE TABLE IF NOT EXISTS agent_points (
            tenant_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            points INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (tenant_id, agent_id)
        );
    "#,
}];

/// Run all pending migrations against the connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in &[
            "contacts",
            "conversations",
            "messages",
            "partners",
            "referrals",
            "audit_events",
            "agent_points",
            "_migrations",
        ] {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            let count: i64 = row.get(0).unwrap();
            assert_eq!(count, 1, "Table '{}' should exist", table);
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn one_open_conversation_per_contact() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        conn.execute(
            "INSERT INTO contacts (id, tenant_id, address, display_name, created_at)
             VALUES ('c1', 't1', '+5511999', '+5511999', '2026-01-01T00:00:00Z')",
            (),
        )
        .await
        .unwrap();

        conn.execute(
            "INSERT INTO conversations (id, tenant_id, contact_id, status, created_at)
             VALUES ('v1', 't1', 'c1', 'OPEN', '2026-01-01T00:00:00Z')",
            (),
        )
        .await
        .unwrap();

        // Second OPEN conversation for the same contact violates the partial
        // unique index.
        let result = conn
            .execute(
                "INSERT INTO conversations (id, tenant_id, contact_id, status, created_at)
                 VALUES ('v2', 't1', 'c1', 'OPEN', '2026-01-01T00:00:00Z')",
                (),
            )
            .await;
        assert!(result.is_err());

        // A CLOSED one is fine.
        conn.execute(
            "INSERT INTO conversations (id, tenant_id, contact_id, status, created_at)
             VALUES ('v3', 't1', 'c1', 'CLOSED', '2026-01-01T00:00:00Z')",
            (),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn provider_id_unique_per_tenant() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        conn.execute(
            "INSERT INTO messages (id, tenant_id, conversation_id, direction, status, content, provider_message_id, created_at)
             VALUES ('m1', 't1', 'v1', 'INBOUND', 'RECEIVED', 'oi', 'wamid.1', '2026-01-01T00:00:00Z')",
            (),
        )
        .await
        .unwrap();

        let dup = conn
            .execute(
                "INSERT INTO messages (id, tenant_id, conversation_id, direction, status, content, provider_message_id, created_at)
                 VALUES ('m2', 't1', 'v1', 'INBOUND', 'RECEIVED', 'oi de novo', 'wamid.1', '2026-01-01T00:00:00Z')",
                (),
            )
            .await;
        assert!(dup.is_err());

        // Same provider id under another tenant is allowed.
        conn.execute(
            "INSERT INTO messages (id, tenant_id, conversation_id, direction, status, content, provider_message_id, created_at)
             VALUES ('m3', 't2', 'v9', 'INBOUND', 'RECEIVED', 'oi', 'wamid.1', '2026-01-01T00:00:00Z')",
            (),
        )
        .await
        .unwrap();

        // NULL provider ids never collide.
        for id in ["m4", "m5"] {
            conn.execute(
                &format!(
                    "INSERT INTO messages (id, tenant_id, conversation_id, direction, status, content, created_at)
                     VALUES ('{id}', 't1', 'v1', 'OUTBOUND', 'QUEUED', 'resposta', '2026-01-01T00:00:00Z')"
                ),
                (),
            )
            .await
            .unwrap();
        }
    }
}

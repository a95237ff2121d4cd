//! Error types for the intake core.

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Input rejected before any mutation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Empty {field}")]
    Empty { field: &'static str },

    #[error("Invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Channel/side-channel delivery errors.
///
/// These are auxiliary to the domain event that triggered them: callers log
/// them and move on, they never fail the primary operation.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Channel send failed for conversation {conversation_id}: {reason}")]
    SendFailed {
        conversation_id: Uuid,
        reason: String,
    },

    #[error("Partner notification failed for partner {partner_id}: {reason}")]
    PartnerNotifyFailed { partner_id: Uuid, reason: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;

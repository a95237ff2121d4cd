//! Inbound message intake: identity, urgency, orchestration.

pub mod escalation;
pub mod gateway;
pub mod identity;
pub mod urgency;

pub use gateway::{IngestOutcome, IntakeGateway};

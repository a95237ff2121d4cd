//! Intake core — tenant-scoped conversation intake and referral workflow.

pub mod audit;
pub mod config;
pub mod error;
pub mod gamification;
pub mod http;
pub mod intake;
pub mod messaging;
pub mod model;
pub mod notify;
pub mod referral;
pub mod store;

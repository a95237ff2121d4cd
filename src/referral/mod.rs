//! Consent-gated partner referral.

pub mod coordinator;
pub mod selection;

pub use coordinator::ReferralCoordinator;
pub use selection::PartnerSelector;

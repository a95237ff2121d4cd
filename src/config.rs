//! Configuration types.

/// What to do when an affirmative consent reply finds no eligible partner.
///
/// The referral prompt has already been answered, so the conversation is in
/// `WAITING_CONSENT` with nowhere to go. `KeepWaiting` leaves the state as-is
/// so a later affirmative reply retries selection; `ResetConsent` drops back
/// to `NONE` so the flow has to be restarted explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoPartnerPolicy {
    #[default]
    KeepWaiting,
    ResetConsent,
}

/// Intake engine configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Prompt sent when asking the contact for referral consent.
    pub consent_prompt: String,
    /// Confirmation sent to the contact after a successful referral.
    pub referral_confirmation: String,
    /// Sent when no eligible partner is available.
    pub no_partner_fallback: String,
    /// Sent when the contact declines the referral.
    pub refusal_fallback: String,
    /// Practice area used when executing a referral.
    pub default_practice_area: String,
    /// Behavior when partner selection comes up empty mid-consent.
    pub no_partner_policy: NoPartnerPolicy,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            consent_prompt: "Podemos encaminhar seu caso para um advogado parceiro? \
                             Responda SIM para autorizar ou NAO para continuar conosco."
                .to_string(),
            referral_confirmation: "Perfeito! Seu caso foi encaminhado para um advogado \
                                    parceiro, que entrara em contato em breve."
                .to_string(),
            no_partner_fallback: "No momento nao temos um parceiro disponivel para o seu \
                                  caso. Nossa equipe seguira com o seu atendimento."
                .to_string(),
            refusal_fallback: "Sem problemas! Nossa equipe seguira com o seu atendimento \
                               por aqui."
                .to_string(),
            default_practice_area: "CIVIL".to_string(),
            no_partner_policy: NoPartnerPolicy::KeepWaiting,
        }
    }
}

impl IntakeConfig {
    /// Build a config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            consent_prompt: std::env::var("INTAKE_CONSENT_PROMPT")
                .unwrap_or(defaults.consent_prompt),
            referral_confirmation: std::env::var("INTAKE_REFERRAL_CONFIRMATION")
                .unwrap_or(defaults.referral_confirmation),
            no_partner_fallback: std::env::var("INTAKE_NO_PARTNER_FALLBACK")
                .unwrap_or(defaults.no_partner_fallback),
            refusal_fallback: std::env::var("INTAKE_REFUSAL_FALLBACK")
                .unwrap_or(defaults.refusal_fallback),
            default_practice_area: std::env::var("INTAKE_DEFAULT_AREA")
                .unwrap_or(defaults.default_practice_area),
            no_partner_policy: match std::env::var("INTAKE_NO_PARTNER_POLICY").as_deref() {
                Ok("reset") => NoPartnerPolicy::ResetConsent,
                _ => NoPartnerPolicy::KeepWaiting,
            },
        }
    }
}

//! Keyword-tiered urgency classifier.
//!
//! Pure function over message content: case-insensitive substring match
//! against fixed per-tier keyword sets, checked in strict precedence
//! PLANTAO → HIGH → NORMAL. First match wins; no tier match means NORMAL.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::Urgency;

/// Emergency-tier keywords: on-call/injunction language that needs a lawyer
/// now, regardless of office hours.
static PLANTAO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)liminar|urgente|urgência|urgencia|plantão|plantao|flagrante|preso|presa|prisão|prisao|habeas corpus|emergência|emergencia",
    )
    .unwrap()
});

/// High-tier keywords: deadline and court-event language.
static HIGH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)prazo|audiência|audiencia|intimação|intimacao|citação|citacao|notificação|notificacao|sentença|sentenca|recurso",
    )
    .unwrap()
});

/// Classify message content into an urgency tier.
///
/// Deterministic and side-effect free.
pub fn classify(content: &str) -> Urgency {
    if PLANTAO_RE.is_match(content) {
        Urgency::Plantao
    } else if HIGH_RE.is_match(content) {
        Urgency::High
    } else {
        Urgency::Normal
    }
}

//! Text-column encodings for the domain enums. Kept out of `parley-domain`
//! so that crate stays free of any `sqlx` dependency; everything infra-facing
//! lives here instead.

use parley_domain::error::{Error, FailureKind, Result};
use parley_domain::model::{
    ConversationStatus, CostLevel, InterventionStatus, JudgeCadence, MessageRole, Severity,
};

macro_rules! text_enum {
    ($ty:ty, $to:ident, $from:ident, { $($variant:ident => $text:literal),+ $(,)? }) => {
        pub fn $to(value: $ty) -> &'static str {
            match value {
                $(<$ty>::$variant => $text,)+
            }
        }

        pub fn $from(text: &str) -> Result<$ty> {
            match text {
                $($text => Ok(<$ty>::$variant),)+
                other => Err(Error::persistence(
                    FailureKind::PersistenceFatal,
                    format!("unrecognized {} value: {other}", stringify!($ty)),
                )),
            }
        }
    };
}

text_enum!(ConversationStatus, conversation_status_to_text, text_to_conversation_status, {
    Created => "created",
    Running => "running",
    Paused => "paused",
    Completed => "completed",
    Errored => "errored",
});

text_enum!(JudgeCadence, judge_cadence_to_text, text_to_judge_cadence, {
    PerRound => "per_round",
    FinalRoundOnly => "final_round_only",
    Never => "never",
});

text_enum!(CostLevel, cost_level_to_text, text_to_cost_level, {
    None => "none",
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

text_enum!(MessageRole, message_role_to_text, text_to_message_role, {
    System => "system",
    User => "user",
    Assistant => "assistant",
});

text_enum!(Severity, severity_to_text, text_to_severity, {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

text_enum!(InterventionStatus, intervention_status_to_text, text_to_intervention_status, {
    Detected => "detected",
    Intervened => "intervened",
    Broken => "broken",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_status_round_trips() {
        for s in [
            ConversationStatus::Created,
            ConversationStatus::Running,
            ConversationStatus::Paused,
            ConversationStatus::Completed,
            ConversationStatus::Errored,
        ] {
            let text = conversation_status_to_text(s);
            assert_eq!(text_to_conversation_status(text).unwrap(), s);
        }
    }

    #[test]
    fn severity_round_trips() {
        for s in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
            let text = severity_to_text(s);
            assert_eq!(text_to_severity(text).unwrap(), s);
        }
    }

    #[test]
    fn unknown_text_is_an_error() {
        assert!(text_to_severity("catastrophic").is_err());
    }
}

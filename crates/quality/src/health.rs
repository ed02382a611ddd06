//! Conversation health scoring (§4.5.3).
//!
//! Composite score over four weighted components. Citation has no concrete
//! producer in this implementation (nothing populates a Citation entity),
//! so it stays fixed at 100 — a neutral placeholder rather than a penalty.

use chrono::Utc;
use parley_domain::config::HealthWeightsConfig;
use parley_domain::model::{
    Contradiction, ConversationLoop, HealthComponents, HealthSample, InterventionStatus, Message,
    Severity,
};
use uuid::Uuid;

use crate::vector_store::cosine_similarity;

pub struct HealthScorer {
    config: HealthWeightsConfig,
}

impl HealthScorer {
    pub fn new(config: HealthWeightsConfig) -> Self {
        Self { config }
    }

    /// `assistant_embeddings` is the embedding of each assistant message in
    /// chronological order (one entry per message, `None` when unembedded).
    pub fn score(
        &self,
        conversation_id: Uuid,
        assistant_embeddings: &[Option<Vec<f32>>],
        contradictions: &[Contradiction],
        loops: &[ConversationLoop],
        message_count: u32,
    ) -> HealthSample {
        let weights = self.config.normalized();

        let coherence = coherence_component(assistant_embeddings, weights.too_similar_threshold);
        let contradiction = contradiction_component(contradictions);
        let r#loop = loop_component(loops);
        let citation = 100.0;

        let overall_score = weights.coherence * coherence
            + weights.contradiction * contradiction
            + weights.r#loop * r#loop
            + weights.citation * citation;

        HealthSample {
            id: Uuid::new_v4(),
            conversation_id,
            overall_score,
            components: HealthComponents {
                coherence,
                contradiction,
                r#loop,
                citation,
            },
            message_count,
            contradiction_count: contradictions.iter().filter(|c| !c.resolved).count() as u32,
            loop_count: loops
                .iter()
                .filter(|l| l.intervention_status != InterventionStatus::Broken)
                .count() as u32,
            created_at: Utc::now(),
        }
    }
}

/// 100, minus a penalty for consecutive assistant messages that are "too
/// similar" (cosine similarity above `too_similar_threshold`) — the debate
/// isn't progressing if successive turns just restate each other.
fn coherence_component(embeddings: &[Option<Vec<f32>>], too_similar_threshold: f64) -> f64 {
    let pairs: Vec<f64> = embeddings
        .windows(2)
        .filter_map(|w| match (&w[0], &w[1]) {
            (Some(a), Some(b)) => Some(cosine_similarity(a, b)),
            _ => None,
        })
        .collect();

    if pairs.is_empty() {
        return 100.0;
    }

    let excess: Vec<f64> = pairs
        .iter()
        .filter(|s| **s > too_similar_threshold)
        .copied()
        .collect();

    if excess.is_empty() {
        return 100.0;
    }

    let mean = excess.iter().sum::<f64>() / excess.len() as f64;
    (100.0 - 100.0 * mean).clamp(0.0, 100.0)
}

fn contradiction_component(contradictions: &[Contradiction]) -> f64 {
    let open = contradictions.iter().filter(|c| !c.resolved);
    let mut penalty = 0.0;
    for c in open {
        penalty += match c.severity {
            Severity::Critical => 25.0,
            Severity::High => 10.0,
            Severity::Medium => 4.0,
            Severity::Low => 1.0,
        };
    }
    (100.0 - penalty.min(100.0)).max(0.0)
}

fn loop_component(loops: &[ConversationLoop]) -> f64 {
    let active = loops
        .iter()
        .filter(|l| {
            matches!(
                l.intervention_status,
                InterventionStatus::Detected | InterventionStatus::Intervened
            )
        })
        .count();
    (100.0 - (20.0 * active as f64).min(100.0)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn contradiction(severity: Severity, resolved: bool) -> Contradiction {
        Contradiction {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            message_a_id: Uuid::new_v4(),
            message_b_id: Uuid::new_v4(),
            severity,
            confidence: 0.9,
            similarity: 0.9,
            text_a: "a".into(),
            text_b: "b".into(),
            explanation: "x".into(),
            resolution_suggestion: None,
            acknowledged: false,
            resolved,
            resolution_note: None,
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }

    fn loop_record(status: InterventionStatus) -> ConversationLoop {
        ConversationLoop {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            pattern_hash: "h".into(),
            description: "d".into(),
            loop_size: 2,
            repetition_count: 2,
            first_occurrence_message_id: Uuid::new_v4(),
            last_occurrence_message_id: Uuid::new_v4(),
            intervention_status: status,
            suggested_intervention: None,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn no_contradictions_or_loops_scores_perfect_components() {
        let scorer = HealthScorer::new(HealthWeightsConfig::default());
        let sample = scorer.score(Uuid::new_v4(), &[], &[], &[], 0);
        assert_eq!(sample.components.contradiction, 100.0);
        assert_eq!(sample.components.r#loop, 100.0);
        assert_eq!(sample.components.citation, 100.0);
        assert_eq!(sample.overall_score, 100.0);
    }

    #[test]
    fn unresolved_critical_contradiction_penalizes_heavily() {
        let contradictions = vec![contradiction(Severity::Critical, false)];
        let score = contradiction_component(&contradictions);
        assert_eq!(score, 75.0);
    }

    #[test]
    fn resolved_contradictions_dont_count() {
        let contradictions = vec![contradiction(Severity::Critical, true)];
        let score = contradiction_component(&contradictions);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn active_loops_penalize_loop_component() {
        let loops = vec![loop_record(InterventionStatus::Detected)];
        assert_eq!(loop_component(&loops), 80.0);
    }

    #[test]
    fn broken_loops_dont_count_as_active() {
        let loops = vec![loop_record(InterventionStatus::Broken)];
        assert_eq!(loop_component(&loops), 100.0);
    }

    #[test]
    fn coherence_penalizes_near_identical_consecutive_messages() {
        let embeddings = vec![
            Some(vec![1.0, 0.0]),
            Some(vec![1.0, 0.0]),
            Some(vec![0.0, 1.0]),
        ];
        let score = coherence_component(&embeddings, 0.92);
        assert!(score < 100.0);
    }

    #[test]
    fn coherence_is_perfect_without_embeddings() {
        let embeddings = vec![None, None];
        assert_eq!(coherence_component(&embeddings, 0.92), 100.0);
    }
}

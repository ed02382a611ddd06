//! Contradiction detection (§4.5.1).
//!
//! For each newly completed message: find its k nearest prior messages by
//! embedding similarity, ask the model whether each pair actually opposes
//! each other, and record the ones that do. Runs independently per message;
//! a failure here never blocks the debate turn that triggered it.

use std::sync::Arc;

use chrono::Utc;
use parley_domain::config::ContradictionConfig;
use parley_domain::error::{Error, FailureKind, Result};
use parley_domain::model::{Contradiction, Message, Severity};
use parley_providers::CompletionProvider;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::embedder::Embedder;
use crate::vector_store::VectorStore;

pub struct ContradictionDetector {
    embedder: Arc<dyn Embedder>,
    judge: Arc<dyn CompletionProvider>,
    config: ContradictionConfig,
}

impl ContradictionDetector {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        judge: Arc<dyn CompletionProvider>,
        config: ContradictionConfig,
    ) -> Self {
        Self {
            embedder,
            judge,
            config,
        }
    }

    /// Embed `candidate`, insert it into `store`, and check it against its k
    /// nearest neighbors in the same conversation. `history` must contain
    /// every message that has already been inserted into `store`, so the
    /// neighbor ids can be resolved back to their text and sequence number.
    /// `existing` is consulted to avoid re-recording an already-known pair.
    pub async fn detect(
        &self,
        candidate: &Message,
        history: &[Message],
        store: &mut VectorStore,
        existing: &[Contradiction],
    ) -> Result<Vec<Contradiction>> {
        let vector = self.embedder.embed(&candidate.content).await?;
        store.insert(candidate.conversation_id, candidate.id, vector.clone());

        let neighbors = store.knn(
            candidate.conversation_id,
            &vector,
            self.config.knn_k,
            self.config.min_similarity,
            candidate.id,
        );

        let mut found = Vec::new();
        for (neighbor_id, similarity) in neighbors {
            let Some(neighbor) = history.iter().find(|m| m.id == neighbor_id) else {
                continue;
            };

            let (earlier, later) = if neighbor.sequence_number < candidate.sequence_number {
                (neighbor, candidate)
            } else {
                (candidate, neighbor)
            };

            if existing
                .iter()
                .any(|c| c.message_a_id == earlier.id && c.message_b_id == later.id)
            {
                continue;
            }

            let opposition = self.check_opposition(earlier, later).await?;
            if !opposition.contradicts {
                continue;
            }

            let severity = classify_severity(similarity, opposition.confidence);
            found.push(Contradiction {
                id: Uuid::new_v4(),
                conversation_id: candidate.conversation_id,
                message_a_id: earlier.id,
                message_b_id: later.id,
                severity,
                confidence: opposition.confidence,
                similarity,
                text_a: earlier.content.clone(),
                text_b: later.content.clone(),
                explanation: opposition.explanation,
                resolution_suggestion: None,
                acknowledged: false,
                resolved: false,
                resolution_note: None,
                detected_at: Utc::now(),
                resolved_at: None,
            });
        }

        Ok(found)
    }

    async fn check_opposition(&self, a: &Message, b: &Message) -> Result<Opposition> {
        let schema = json!({
            "type": "object",
            "properties": {
                "contradicts": {"type": "boolean"},
                "confidence": {"type": "number"},
                "explanation": {"type": "string"}
            },
            "required": ["contradicts", "confidence", "explanation"]
        });

        let prompt = format!(
            "Statement A (by {}): {}\n\nStatement B (by {}): {}\n\n\
             Does Statement B contradict or directly oppose a claim made in Statement A? \
             Answer only about logical/factual opposition, not differences in tone or emphasis.",
            a.participant_name, a.content, b.participant_name, b.content
        );

        let request = parley_providers::CompletionRequest {
            messages: vec![parley_providers::Message::user(prompt)],
            temperature: Some(0.0),
            max_tokens: Some(256),
            model: None,
        };

        let value = self.judge.complete_structured(request, &schema).await?;
        parse_opposition(&value)
    }
}

struct Opposition {
    contradicts: bool,
    confidence: f64,
    explanation: String,
}

fn parse_opposition(value: &Value) -> Result<Opposition> {
    let contradicts = value
        .get("contradicts")
        .and_then(Value::as_bool)
        .ok_or_else(|| {
            Error::provider(
                "judge",
                FailureKind::ProviderInvalid,
                "opposition check response missing boolean `contradicts`",
            )
        })?;
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Opposition {
        contradicts,
        confidence,
        explanation,
    })
}

/// Severity thresholds from §4.5.1: similarity and confidence are both
/// evidence strength, not independent signals, so the classification takes
/// whichever threshold is met first, most severe first.
fn classify_severity(similarity: f64, confidence: f64) -> Severity {
    if similarity >= 0.95 && confidence >= 0.9 {
        Severity::Critical
    } else if similarity >= 0.9 || confidence >= 0.8 {
        Severity::High
    } else if similarity >= 0.85 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_critical_requires_both_thresholds() {
        assert_eq!(classify_severity(0.95, 0.9), Severity::Critical);
        assert_eq!(classify_severity(0.95, 0.85), Severity::High);
    }

    #[test]
    fn severity_high_on_either_threshold() {
        assert_eq!(classify_severity(0.91, 0.5), Severity::High);
        assert_eq!(classify_severity(0.5, 0.85), Severity::High);
    }

    #[test]
    fn severity_medium_floor() {
        assert_eq!(classify_severity(0.86, 0.1), Severity::Medium);
    }

    #[test]
    fn severity_low_below_all_thresholds() {
        assert_eq!(classify_severity(0.5, 0.1), Severity::Low);
    }

    #[test]
    fn parse_opposition_rejects_missing_field() {
        let v = json!({"confidence": 0.5, "explanation": "x"});
        assert!(parse_opposition(&v).is_err());
    }

    #[test]
    fn parse_opposition_clamps_confidence() {
        let v = json!({"contradicts": true, "confidence": 1.5, "explanation": "x"});
        let parsed = parse_opposition(&v).unwrap();
        assert_eq!(parsed.confidence, 1.0);
    }
}

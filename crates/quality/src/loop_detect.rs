//! Repetition loop detection (§4.5.2).
//!
//! Slides a pattern length over the participant-index sequence of the last
//! `window` messages and looks for a pattern that immediately repeats.
//! Fingerprints messages by embedding (rounded to 8 dims) when available,
//! falling back to 5-gram text shingles in text-only mode.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use chrono::Utc;
use parley_domain::config::LoopDetectionConfig;
use parley_domain::model::{ConversationLoop, InterventionStatus, Message};
use uuid::Uuid;

pub struct LoopDetector {
    config: LoopDetectionConfig,
}

impl LoopDetector {
    pub fn new(config: LoopDetectionConfig) -> Self {
        Self { config }
    }

    /// `messages` is the full conversation history in chronological order;
    /// `embeddings` supplies a vector for a message id when one exists (text
    /// fingerprinting is used for messages it doesn't cover).
    /// `existing` is searched for a loop with a matching `pattern_hash` so
    /// repeated detections accumulate onto one record instead of duplicating.
    pub fn detect(
        &self,
        messages: &[Message],
        embeddings: impl Fn(Uuid) -> Option<Vec<f32>>,
        existing: &[ConversationLoop],
    ) -> Option<LoopOutcome> {
        let window = &messages[messages.len().saturating_sub(self.config.window)..];
        if window.len() < self.config.min_pattern_length * 2 {
            return None;
        }

        let fingerprints: Vec<String> = window
            .iter()
            .map(|m| fingerprint(m, &embeddings))
            .collect();

        let max_len = window.len() / 2;
        for pattern_len in self.config.min_pattern_length..=max_len.max(self.config.min_pattern_length)
        {
            if pattern_len == 0 || pattern_len * 2 > fingerprints.len() {
                continue;
            }
            let tail = &fingerprints[fingerprints.len() - pattern_len..];

            let mut repeats = 1u32;
            let mut cursor = fingerprints.len() - pattern_len;
            while cursor >= pattern_len {
                let candidate = &fingerprints[cursor - pattern_len..cursor];
                if candidate == tail {
                    repeats += 1;
                    cursor -= pattern_len;
                } else {
                    break;
                }
            }

            if repeats >= self.config.min_repetitions {
                let pattern_hash = hash_pattern(tail);
                let first_idx = window.len() - pattern_len * repeats as usize;
                let first_message = window[first_idx].id;
                let last_message = window[window.len() - 1].id;

                return Some(build_outcome(
                    &pattern_hash,
                    pattern_len as u32,
                    repeats,
                    first_message,
                    last_message,
                    window[0].conversation_id,
                    existing,
                ));
            }
        }

        None
    }
}

pub enum LoopOutcome {
    New(ConversationLoop),
    Update {
        loop_id: Uuid,
        repetition_count: u32,
        last_occurrence_message_id: Uuid,
        intervention_status: InterventionStatus,
    },
}

fn build_outcome(
    pattern_hash: &str,
    loop_size: u32,
    repetitions: u32,
    first_message: Uuid,
    last_message: Uuid,
    conversation_id: Uuid,
    existing: &[ConversationLoop],
) -> LoopOutcome {
    // `Detected` is the resting state for any tracked loop; `Intervened`/
    // `Broken` only ever get set once an intervention has actually been
    // applied, which happens downstream of this detector, so a previously
    // escalated record is never silently demoted back to `Detected` here.
    if let Some(found) = existing.iter().find(|l| l.pattern_hash == pattern_hash) {
        let repetition_count = found.repetition_count + 1;
        let intervention_status = match found.intervention_status {
            InterventionStatus::Intervened | InterventionStatus::Broken => {
                found.intervention_status
            }
            InterventionStatus::Detected => InterventionStatus::Detected,
        };
        LoopOutcome::Update {
            loop_id: found.id,
            repetition_count,
            last_occurrence_message_id: last_message,
            intervention_status,
        }
    } else {
        LoopOutcome::New(ConversationLoop {
            id: Uuid::new_v4(),
            conversation_id,
            pattern_hash: pattern_hash.to_string(),
            description: format!("repeating pattern of {loop_size} messages"),
            loop_size,
            repetition_count: repetitions,
            first_occurrence_message_id: first_message,
            last_occurrence_message_id: last_message,
            intervention_status: InterventionStatus::Detected,
            suggested_intervention: None,
            detected_at: Utc::now(),
        })
    }
}

fn fingerprint(message: &Message, embeddings: &impl Fn(Uuid) -> Option<Vec<f32>>) -> String {
    let embedding_part = match embeddings(message.id) {
        Some(vector) => vector
            .iter()
            .take(8)
            .map(|v| format!("{:.2}", v))
            .collect::<Vec<_>>()
            .join(","),
        None => shingle_set(&message.content)
            .into_iter()
            .collect::<Vec<_>>()
            .join("|"),
    };
    format!("{}:{}", message.participant_index, embedding_part)
}

fn shingle_set(text: &str) -> HashSet<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 5 {
        return vec![words.join(" ")].into_iter().collect();
    }
    words
        .windows(5)
        .map(|w| w.join(" ").to_lowercase())
        .collect()
}

fn hash_pattern(pattern: &[String]) -> String {
    let mut hasher = DefaultHasher::new();
    pattern.join("~").hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

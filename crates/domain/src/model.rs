//! Persisted entities of §3: Conversation, Participant, Message, embeddings,
//! and the three quality-analyzer child tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Created,
    Running,
    Paused,
    Completed,
    Errored,
}

/// Per-conversation judge cadence (open question in the design notes,
/// pinned here as configurable with "per round" as the default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JudgeCadence {
    #[default]
    PerRound,
    FinalRoundOnly,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub topic: String,
    pub participants: Vec<Participant>,
    pub max_rounds: u32,
    pub context_window_rounds: u32,
    pub cost_warning_threshold: f64,
    pub judge_model: Option<String>,
    pub judge_cadence: JudgeCadence,
    pub status: ConversationStatus,
    pub current_round: u32,
    pub current_turn_index: u32,
    pub total_cost_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub current_health_score: Option<f64>,
    /// Highest cost-warning level already surfaced, so `cost.warning` only
    /// fires on transitions (see `Orchestrator` cost governance).
    pub last_cost_level: CostLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(
        topic: String,
        participants: Vec<Participant>,
        max_rounds: u32,
        context_window_rounds: u32,
        cost_warning_threshold: f64,
        judge_model: Option<String>,
        judge_cadence: JudgeCadence,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            topic,
            participants,
            max_rounds,
            context_window_rounds,
            cost_warning_threshold,
            judge_model,
            judge_cadence,
            status: ConversationStatus::Created,
            current_round: 0,
            current_turn_index: 0,
            total_cost_usd: 0.0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            current_health_score: None,
            last_cost_level: CostLevel::None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Participant
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// 0-based, authoritative for turn cycling order.
    pub index: u32,
    /// Unique within the conversation.
    pub name: String,
    /// Model identifier interpreted by the Completion Provider registry,
    /// e.g. `"openai/gpt-4o"`.
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One completed turn. Immutable after finalization; quality annotations
/// live in separate child tables, never on this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub participant_index: u32,
    pub participant_name: String,
    pub model: String,
    pub role: MessageRole,
    pub content: String,
    /// Global 0-based monotonic sequence within the conversation.
    pub sequence_number: u32,
    pub round_number: u32,
    pub turn_index: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub response_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MessageEmbedding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const EMBEDDING_DIMENSION: usize = 1536;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEmbedding {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub vector: Vec<f32>,
    pub embedding_model: String,
    pub embedding_version: String,
    pub embedded_text: String,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contradiction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// Ordered by sequence number: `message_a.sequence_number < message_b.sequence_number`.
    pub message_a_id: Uuid,
    pub message_b_id: Uuid,
    pub severity: Severity,
    pub confidence: f64,
    pub similarity: f64,
    pub text_a: String,
    pub text_b: String,
    pub explanation: String,
    pub resolution_suggestion: Option<String>,
    pub acknowledged: bool,
    pub resolved: bool,
    pub resolution_note: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConversationLoop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionStatus {
    Detected,
    Intervened,
    Broken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLoop {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub pattern_hash: String,
    pub description: String,
    pub loop_size: u32,
    pub repetition_count: u32,
    pub first_occurrence_message_id: Uuid,
    pub last_occurrence_message_id: Uuid,
    pub intervention_status: InterventionStatus,
    pub suggested_intervention: Option<String>,
    pub detected_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HealthSample
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HealthComponents {
    pub coherence: f64,
    pub contradiction: f64,
    pub r#loop: f64,
    pub citation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            HealthStatus::Excellent
        } else if score >= 70.0 {
            HealthStatus::Good
        } else if score >= 50.0 {
            HealthStatus::Fair
        } else {
            HealthStatus::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSample {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub overall_score: f64,
    pub components: HealthComponents,
    pub message_count: u32,
    pub contradiction_count: u32,
    pub loop_count: u32,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cost governance levels (§4.1, §4.7)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl CostLevel {
    /// Classify `total_cost` against the conversation's warning threshold T,
    /// per §4.1's fixed fraction table.
    pub fn classify(total_cost: f64, threshold: f64) -> Self {
        if threshold <= 0.0 {
            return CostLevel::None;
        }
        if total_cost < 0.5 * threshold {
            CostLevel::None
        } else if total_cost < 0.75 * threshold {
            CostLevel::Low
        } else if total_cost < threshold {
            CostLevel::Medium
        } else if total_cost < 1.5 * threshold {
            CostLevel::High
        } else {
            CostLevel::Critical
        }
    }
}

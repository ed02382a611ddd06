//! Event Bus envelope and kinds (§4.6). Grounded on the gateway's
//! `RunEvent` tagged-enum convention, generalized to one conversation-wide
//! ordered channel instead of one channel per node.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{HealthComponents, InterventionStatus, Severity};

/// One entry on a conversation's event bus. `sequence` is the external
/// resume cursor (`Last-Event-ID`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    pub conversation_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "lifecycle.ready")]
    LifecycleReady,
    #[serde(rename = "lifecycle.running")]
    LifecycleRunning,
    #[serde(rename = "lifecycle.paused")]
    LifecyclePaused,
    #[serde(rename = "lifecycle.completed")]
    LifecycleCompleted,
    #[serde(rename = "lifecycle.error")]
    LifecycleError { kind: String, message: String },
    #[serde(rename = "lifecycle.resync")]
    LifecycleResync,

    #[serde(rename = "turn.started")]
    TurnStarted {
        round: u32,
        turn_index: u32,
        participant_index: u32,
        participant_name: String,
    },
    #[serde(rename = "turn.token_delta")]
    TurnTokenDelta {
        participant_index: u32,
        delta: String,
    },
    #[serde(rename = "turn.completed")]
    TurnCompleted {
        message_id: Uuid,
        input_tokens: u32,
        output_tokens: u32,
        cost_usd: f64,
        response_time_ms: u64,
    },

    #[serde(rename = "round.completed")]
    RoundCompleted { round: u32 },

    #[serde(rename = "judge.assessment")]
    JudgeAssessment {
        round: u32,
        payload: serde_json::Value,
    },

    #[serde(rename = "quality.contradiction_detected")]
    QualityContradictionDetected {
        contradiction_id: Uuid,
        severity: Severity,
        message_a_id: Uuid,
        message_b_id: Uuid,
        similarity: f64,
        confidence: f64,
    },
    #[serde(rename = "quality.loop_detected")]
    QualityLoopDetected {
        loop_id: Uuid,
        repetition_count: u32,
        loop_size: u32,
        intervention_status: InterventionStatus,
    },
    #[serde(rename = "quality.health_update")]
    QualityHealthUpdate {
        score: f64,
        components: HealthComponents,
    },

    #[serde(rename = "cost.warning")]
    CostWarning {
        level: String,
        total_cost: f64,
        threshold: f64,
    },
}

impl EventKind {
    /// The SSE `event:` field — matches the serde tag values above.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::LifecycleReady => "lifecycle.ready",
            EventKind::LifecycleRunning => "lifecycle.running",
            EventKind::LifecyclePaused => "lifecycle.paused",
            EventKind::LifecycleCompleted => "lifecycle.completed",
            EventKind::LifecycleError { .. } => "lifecycle.error",
            EventKind::LifecycleResync => "lifecycle.resync",
            EventKind::TurnStarted { .. } => "turn.started",
            EventKind::TurnTokenDelta { .. } => "turn.token_delta",
            EventKind::TurnCompleted { .. } => "turn.completed",
            EventKind::RoundCompleted { .. } => "round.completed",
            EventKind::JudgeAssessment { .. } => "judge.assessment",
            EventKind::QualityContradictionDetected { .. } => "quality.contradiction_detected",
            EventKind::QualityLoopDetected { .. } => "quality.loop_detected",
            EventKind::QualityHealthUpdate { .. } => "quality.health_update",
            EventKind::CostWarning { .. } => "cost.warning",
        }
    }
}

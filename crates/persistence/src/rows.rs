//! `sqlx::FromRow` row shapes and their conversions to/from domain types.

use chrono::{DateTime, Utc};
use parley_domain::error::Result;
use parley_domain::model::{
    Contradiction, Conversation, ConversationLoop, HealthComponents, HealthSample, Message,
    MessageEmbedding, Participant,
};
use uuid::Uuid;

use crate::codec::*;

#[derive(sqlx::FromRow)]
pub struct ConversationRow {
    pub id: Uuid,
    pub topic: String,
    pub participants: serde_json::Value,
    pub max_rounds: i32,
    pub context_window_rounds: i32,
    pub cost_warning_threshold: f64,
    pub judge_model: Option<String>,
    pub judge_cadence: String,
    pub status: String,
    pub current_round: i32,
    pub current_turn_index: i32,
    pub total_cost_usd: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub current_health_score: Option<f64>,
    pub last_cost_level: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRow {
    pub fn into_domain(self) -> Result<Conversation> {
        let participants: Vec<Participant> = serde_json::from_value(self.participants)?;
        Ok(Conversation {
            id: self.id,
            topic: self.topic,
            participants,
            max_rounds: self.max_rounds as u32,
            context_window_rounds: self.context_window_rounds as u32,
            cost_warning_threshold: self.cost_warning_threshold,
            judge_model: self.judge_model,
            judge_cadence: text_to_judge_cadence(&self.judge_cadence)?,
            status: text_to_conversation_status(&self.status)?,
            current_round: self.current_round as u32,
            current_turn_index: self.current_turn_index as u32,
            total_cost_usd: self.total_cost_usd,
            total_input_tokens: self.total_input_tokens as u64,
            total_output_tokens: self.total_output_tokens as u64,
            current_health_score: self.current_health_score,
            last_cost_level: text_to_cost_level(&self.last_cost_level)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub fn participants_json(conversation: &Conversation) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(&conversation.participants)?)
}

#[derive(sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub participant_index: i32,
    pub participant_name: String,
    pub model: String,
    pub role: String,
    pub content: String,
    pub sequence_number: i32,
    pub round_number: i32,
    pub turn_index: i32,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub response_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn into_domain(self) -> Result<Message> {
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            participant_index: self.participant_index as u32,
            participant_name: self.participant_name,
            model: self.model,
            role: text_to_message_role(&self.role)?,
            content: self.content,
            sequence_number: self.sequence_number as u32,
            round_number: self.round_number as u32,
            turn_index: self.turn_index as u32,
            input_tokens: self.input_tokens as u32,
            output_tokens: self.output_tokens as u32,
            response_time_ms: self.response_time_ms as u64,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct EmbeddingRow {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub vector: pgvector::Vector,
    pub embedding_model: String,
    pub embedding_version: String,
    pub embedded_text: String,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRow {
    pub fn into_domain(self) -> MessageEmbedding {
        MessageEmbedding {
            message_id: self.message_id,
            conversation_id: self.conversation_id,
            vector: self.vector.as_slice().to_vec(),
            embedding_model: self.embedding_model,
            embedding_version: self.embedding_version,
            embedded_text: self.embedded_text,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct ContradictionRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub message_a_id: Uuid,
    pub message_b_id: Uuid,
    pub severity: String,
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

impl ContradictionRow {
    pub fn into_domain(self) -> Result<Contradiction> {
        Ok(Contradiction {
            id: self.id,
            conversation_id: self.conversation_id,
            message_a_id: self.message_a_id,
            message_b_id: self.message_b_id,
            severity: text_to_severity(&self.severity)?,
            confidence: self.confidence,
            similarity: self.similarity,
            text_a: self.text_a,
            text_b: self.text_b,
            explanation: self.explanation,
            resolution_suggestion: self.resolution_suggestion,
            acknowledged: self.acknowledged,
            resolved: self.resolved,
            resolution_note: self.resolution_note,
            detected_at: self.detected_at,
            resolved_at: self.resolved_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct LoopRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub pattern_hash: String,
    pub description: String,
    pub loop_size: i32,
    pub repetition_count: i32,
    pub first_occurrence_message_id: Uuid,
    pub last_occurrence_message_id: Uuid,
    pub intervention_status: String,
    pub suggested_intervention: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl LoopRow {
    pub fn into_domain(self) -> Result<ConversationLoop> {
        Ok(ConversationLoop {
            id: self.id,
            conversation_id: self.conversation_id,
            pattern_hash: self.pattern_hash,
            description: self.description,
            loop_size: self.loop_size as u32,
            repetition_count: self.repetition_count as u32,
            first_occurrence_message_id: self.first_occurrence_message_id,
            last_occurrence_message_id: self.last_occurrence_message_id,
            intervention_status: text_to_intervention_status(&self.intervention_status)?,
            suggested_intervention: self.suggested_intervention,
            detected_at: self.detected_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct HealthSampleRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub overall_score: f64,
    pub components: serde_json::Value,
    pub message_count: i32,
    pub contradiction_count: i32,
    pub loop_count: i32,
    pub created_at: DateTime<Utc>,
}

impl HealthSampleRow {
    pub fn into_domain(self) -> Result<HealthSample> {
        let components: HealthComponents = serde_json::from_value(self.components)?;
        Ok(HealthSample {
            id: self.id,
            conversation_id: self.conversation_id,
            overall_score: self.overall_score,
            components,
            message_count: self.message_count as u32,
            contradiction_count: self.contradiction_count as u32,
            loop_count: self.loop_count as u32,
            created_at: self.created_at,
        })
    }
}

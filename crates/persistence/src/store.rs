//! Relational + vector hybrid store (§4.9): a thin trait over the debate's
//! durable state, backed by Postgres + pgvector. The trait exists so the
//! orchestrator and quality analyzers depend on an interface rather than a
//! concrete pool, the same seam `CompletionProvider` draws over provider
//! adapters.

use std::collections::HashMap;

use chrono::Utc;
use parley_domain::config::ModelPricing;
use parley_domain::error::{Error, FailureKind, Result};
use parley_domain::model::{
    Contradiction, Conversation, ConversationLoop, HealthSample, Message, MessageEmbedding,
    Severity,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::codec::*;
use crate::rows::{
    participants_json, ContradictionRow, ConversationRow, EmbeddingRow, HealthSampleRow, LoopRow,
    MessageRow,
};

#[derive(Debug, Clone, Default)]
pub struct ContradictionFilter {
    pub resolved: Option<bool>,
    pub acknowledged: Option<bool>,
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, Default)]
pub struct LoopFilter {
    pub intervention_status: Option<parley_domain::model::InterventionStatus>,
    pub min_repetitions: Option<u32>,
}

#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<()>;
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;
    async fn update_conversation(&self, conversation: &Conversation) -> Result<()>;
    async fn delete_conversation(&self, id: Uuid) -> Result<()>;

    /// Inserts `message` under a per-conversation advisory lock and assigns
    /// the next dense sequence number, returning it. `message.sequence_number`
    /// is ignored on input.
    async fn insert_message(&self, message: &Message) -> Result<u32>;
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    async fn insert_embedding(&self, embedding: &MessageEmbedding) -> Result<()>;
    /// pgvector cosine-distance kNN, mirroring `parley_quality::VectorStore::knn`.
    async fn knn_embeddings(
        &self,
        conversation_id: Uuid,
        query: &[f32],
        k: i64,
        min_similarity: f64,
        exclude: Uuid,
    ) -> Result<Vec<(Uuid, f64)>>;

    /// Returns `false` without error if the `(conversation_id, message_a,
    /// message_b)` pair already exists (natural-key conflict, not a failure).
    async fn insert_contradiction(&self, contradiction: &Contradiction) -> Result<bool>;
    async fn list_contradictions(
        &self,
        conversation_id: Uuid,
        filter: &ContradictionFilter,
    ) -> Result<Vec<Contradiction>>;
    async fn resolve_contradiction(&self, id: Uuid, note: Option<String>) -> Result<()>;

    /// Insert if `(conversation_id, pattern_hash)` is new, else update the
    /// existing row's repetition count / last-seen message / status.
    async fn upsert_loop(&self, loop_record: &ConversationLoop) -> Result<()>;
    async fn list_loops(
        &self,
        conversation_id: Uuid,
        filter: &LoopFilter,
    ) -> Result<Vec<ConversationLoop>>;

    async fn insert_health_sample(&self, sample: &HealthSample) -> Result<()>;
    async fn list_health_samples(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<HealthSample>>;

    /// Recompute `total_input_tokens`/`total_output_tokens`/`total_cost_usd`
    /// from the Message table and write them back (§3: cost aggregates are
    /// "eventually consistent; reconcilable at any time"). `pricing` resolves
    /// each message's `model` field to a per-million-token rate; a model with
    /// no pricing entry contributes its tokens but no cost.
    async fn reconcile_costs(
        &self,
        conversation_id: Uuid,
        pricing: &HashMap<String, ModelPricing>,
    ) -> Result<()>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await
            .map_err(|e| Error::persistence(FailureKind::PersistenceFatal, e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::persistence(FailureKind::PersistenceFatal, e.to_string()))
    }

    /// Advisory lock keyed on the conversation id, held for the duration of
    /// the calling transaction so sequence-number assignment never races
    /// across concurrent turns of the same debate.
    async fn lock_conversation(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        conversation_id: Uuid,
    ) -> Result<()> {
        let key = conversation_id.as_u128() as i64;
        sqlx::query("select pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

fn map_sqlx(e: sqlx::Error) -> Error {
    Error::persistence(FailureKind::PersistenceFatal, e.to_string())
}

#[async_trait::async_trait]
impl ConversationStore for PgStore {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            r#"
            insert into conversation (
                id, topic, participants, max_rounds, context_window_rounds,
                cost_warning_threshold, judge_model, judge_cadence, status,
                current_round, current_turn_index, total_cost_usd,
                total_input_tokens, total_output_tokens, current_health_score,
                last_cost_level, created_at, updated_at
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
            "#,
        )
        .bind(conversation.id)
        .bind(&conversation.topic)
        .bind(participants_json(conversation)?)
        .bind(conversation.max_rounds as i32)
        .bind(conversation.context_window_rounds as i32)
        .bind(conversation.cost_warning_threshold)
        .bind(&conversation.judge_model)
        .bind(judge_cadence_to_text(conversation.judge_cadence))
        .bind(conversation_status_to_text(conversation.status))
        .bind(conversation.current_round as i32)
        .bind(conversation.current_turn_index as i32)
        .bind(conversation.total_cost_usd)
        .bind(conversation.total_input_tokens as i64)
        .bind(conversation.total_output_tokens as i64)
        .bind(conversation.current_health_score)
        .bind(cost_level_to_text(conversation.last_cost_level))
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let row: Option<ConversationRow> = sqlx::query_as("select * from conversation where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(ConversationRow::into_domain).transpose()
    }

    async fn update_conversation(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            r#"
            update conversation set
                status = $2, current_round = $3, current_turn_index = $4,
                total_cost_usd = $5, total_input_tokens = $6,
                total_output_tokens = $7, current_health_score = $8,
                last_cost_level = $9, updated_at = $10
            where id = $1
            "#,
        )
        .bind(conversation.id)
        .bind(conversation_status_to_text(conversation.status))
        .bind(conversation.current_round as i32)
        .bind(conversation.current_turn_index as i32)
        .bind(conversation.total_cost_usd)
        .bind(conversation.total_input_tokens as i64)
        .bind(conversation.total_output_tokens as i64)
        .bind(conversation.current_health_score)
        .bind(cost_level_to_text(conversation.last_cost_level))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<()> {
        sqlx::query("delete from conversation where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<u32> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        Self::lock_conversation(&mut tx, message.conversation_id).await?;

        let next_sequence: i64 = sqlx::query_scalar(
            "select coalesce(max(sequence_number), -1) + 1 from message where conversation_id = $1",
        )
        .bind(message.conversation_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            r#"
            insert into message (
                id, conversation_id, participant_index, participant_name, model,
                role, content, sequence_number, round_number, turn_index,
                input_tokens, output_tokens, response_time_ms, created_at
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.participant_index as i32)
        .bind(&message.participant_name)
        .bind(&message.model)
        .bind(message_role_to_text(message.role))
        .bind(&message.content)
        .bind(next_sequence as i32)
        .bind(message.round_number as i32)
        .bind(message.turn_index as i32)
        .bind(message.input_tokens as i32)
        .bind(message.output_tokens as i32)
        .bind(message.response_time_ms as i64)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(next_sequence as u32)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "select * from message where conversation_id = $1 order by sequence_number asc",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(MessageRow::into_domain).collect()
    }

    async fn insert_embedding(&self, embedding: &MessageEmbedding) -> Result<()> {
        let vector = pgvector::Vector::from(embedding.vector.clone());
        sqlx::query(
            r#"
            insert into message_embedding (
                message_id, conversation_id, vector, embedding_model,
                embedding_version, embedded_text, created_at
            ) values ($1,$2,$3,$4,$5,$6,$7)
            on conflict (message_id) do nothing
            "#,
        )
        .bind(embedding.message_id)
        .bind(embedding.conversation_id)
        .bind(vector)
        .bind(&embedding.embedding_model)
        .bind(&embedding.embedding_version)
        .bind(&embedding.embedded_text)
        .bind(embedding.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn knn_embeddings(
        &self,
        conversation_id: Uuid,
        query: &[f32],
        k: i64,
        min_similarity: f64,
        exclude: Uuid,
    ) -> Result<Vec<(Uuid, f64)>> {
        let vector = pgvector::Vector::from(query.to_vec());
        // pgvector's `<=>` operator is cosine *distance*; similarity = 1 - distance.
        let rows: Vec<(Uuid, f64)> = sqlx::query_as(
            r#"
            select message_id, 1 - (vector <=> $2) as similarity
            from message_embedding
            where conversation_id = $1 and message_id != $4
            order by vector <=> $2
            limit $3
            "#,
        )
        .bind(conversation_id)
        .bind(vector)
        .bind(k)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .filter(|(_, similarity)| *similarity >= min_similarity)
            .collect())
    }

    async fn insert_contradiction(&self, contradiction: &Contradiction) -> Result<bool> {
        let result = sqlx::query(
            r#"
            insert into contradiction (
                id, conversation_id, message_a_id, message_b_id, severity,
                confidence, similarity, text_a, text_b, explanation,
                resolution_suggestion, acknowledged, resolved, resolution_note,
                detected_at, resolved_at
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
            on conflict (conversation_id, message_a_id, message_b_id) do nothing
            "#,
        )
        .bind(contradiction.id)
        .bind(contradiction.conversation_id)
        .bind(contradiction.message_a_id)
        .bind(contradiction.message_b_id)
        .bind(severity_to_text(contradiction.severity))
        .bind(contradiction.confidence)
        .bind(contradiction.similarity)
        .bind(&contradiction.text_a)
        .bind(&contradiction.text_b)
        .bind(&contradiction.explanation)
        .bind(&contradiction.resolution_suggestion)
        .bind(contradiction.acknowledged)
        .bind(contradiction.resolved)
        .bind(&contradiction.resolution_note)
        .bind(contradiction.detected_at)
        .bind(contradiction.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_contradictions(
        &self,
        conversation_id: Uuid,
        filter: &ContradictionFilter,
    ) -> Result<Vec<Contradiction>> {
        let severity_text = filter.severity.map(severity_to_text);
        let rows: Vec<ContradictionRow> = sqlx::query_as(
            r#"
            select * from contradiction
            where conversation_id = $1
              and ($2::boolean is null or resolved = $2)
              and ($3::boolean is null or acknowledged = $3)
              and ($4::text is null or severity = $4)
            order by detected_at desc
            "#,
        )
        .bind(conversation_id)
        .bind(filter.resolved)
        .bind(filter.acknowledged)
        .bind(severity_text)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(ContradictionRow::into_domain).collect()
    }

    async fn resolve_contradiction(&self, id: Uuid, note: Option<String>) -> Result<()> {
        sqlx::query(
            r#"
            update contradiction
            set resolved = true, resolution_note = $2, resolved_at = $3
            where id = $1 and resolved = false
            "#,
        )
        .bind(id)
        .bind(note)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn upsert_loop(&self, loop_record: &ConversationLoop) -> Result<()> {
        sqlx::query(
            r#"
            insert into conversation_loop (
                id, conversation_id, pattern_hash, description, loop_size,
                repetition_count, first_occurrence_message_id,
                last_occurrence_message_id, intervention_status,
                suggested_intervention, detected_at
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            on conflict (conversation_id, pattern_hash) do update set
                repetition_count = excluded.repetition_count,
                last_occurrence_message_id = excluded.last_occurrence_message_id,
                intervention_status = excluded.intervention_status,
                suggested_intervention = coalesce(
                    excluded.suggested_intervention,
                    conversation_loop.suggested_intervention
                )
            "#,
        )
        .bind(loop_record.id)
        .bind(loop_record.conversation_id)
        .bind(&loop_record.pattern_hash)
        .bind(&loop_record.description)
        .bind(loop_record.loop_size as i32)
        .bind(loop_record.repetition_count as i32)
        .bind(loop_record.first_occurrence_message_id)
        .bind(loop_record.last_occurrence_message_id)
        .bind(intervention_status_to_text(loop_record.intervention_status))
        .bind(&loop_record.suggested_intervention)
        .bind(loop_record.detected_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_loops(
        &self,
        conversation_id: Uuid,
        filter: &LoopFilter,
    ) -> Result<Vec<ConversationLoop>> {
        let status_text = filter.intervention_status.map(intervention_status_to_text);
        let min_repetitions = filter.min_repetitions.map(|v| v as i32);
        let rows: Vec<LoopRow> = sqlx::query_as(
            r#"
            select * from conversation_loop
            where conversation_id = $1
              and ($2::text is null or intervention_status = $2)
              and ($3::integer is null or repetition_count >= $3)
            order by detected_at desc
            "#,
        )
        .bind(conversation_id)
        .bind(status_text)
        .bind(min_repetitions)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(LoopRow::into_domain).collect()
    }

    async fn insert_health_sample(&self, sample: &HealthSample) -> Result<()> {
        sqlx::query(
            r#"
            insert into health_sample (
                id, conversation_id, overall_score, components, message_count,
                contradiction_count, loop_count, created_at
            ) values ($1,$2,$3,$4,$5,$6,$7,$8)
            "#,
        )
        .bind(sample.id)
        .bind(sample.conversation_id)
        .bind(sample.overall_score)
        .bind(serde_json::to_value(sample.components)?)
        .bind(sample.message_count as i32)
        .bind(sample.contradiction_count as i32)
        .bind(sample.loop_count as i32)
        .bind(sample.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_health_samples(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<HealthSample>> {
        let rows: Vec<HealthSampleRow> = sqlx::query_as(
            "select * from health_sample where conversation_id = $1 order by created_at desc limit $2",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(HealthSampleRow::into_domain).collect()
    }

    async fn reconcile_costs(
        &self,
        conversation_id: Uuid,
        pricing: &HashMap<String, ModelPricing>,
    ) -> Result<()> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            select model, coalesce(sum(input_tokens), 0), coalesce(sum(output_tokens), 0)
            from message
            where conversation_id = $1
            group by model
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut total_input_tokens = 0i64;
        let mut total_output_tokens = 0i64;
        let mut total_cost_usd = 0.0;
        for (model, input_tokens, output_tokens) in rows {
            total_input_tokens += input_tokens;
            total_output_tokens += output_tokens;
            if let Some(p) = pricing.get(&model) {
                total_cost_usd += p.estimate_cost(input_tokens as u32, output_tokens as u32);
            }
        }

        sqlx::query(
            r#"
            update conversation set
                total_input_tokens = $2, total_output_tokens = $3,
                total_cost_usd = $4, updated_at = $5
            where id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(total_input_tokens)
        .bind(total_output_tokens)
        .bind(total_cost_usd)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

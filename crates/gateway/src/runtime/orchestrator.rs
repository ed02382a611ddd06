//! Orchestrator (§4.7): the FSM that drives one debate conversation through
//! its turn/round/judge cycle — resolving a participant's provider, building
//! its bounded prompt, streaming the completion, persisting the resulting
//! message, and handing the finished turn to the quality pipeline — until
//! every round has run or the debate is paused, stopped, or errors out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::RwLock;
use parley_context::builder::{ContextBuilder, PromptRole};
use parley_domain::error::{Error, FailureKind, Result};
use parley_domain::event::EventKind;
use parley_domain::model::{
    Conversation, ConversationLoop, ConversationStatus, CostLevel, InterventionStatus, JudgeCadence,
    Message, MessageRole,
};
use parley_domain::stream::{StreamEvent, Usage};
use parley_providers::{CompletionProvider, CompletionRequest, Message as ProviderMessage, Role as ProviderRole};
use parley_quality::LoopOutcome;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use super::cancel::CancelToken;
use super::event_bus::EventBus;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Control plane
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub enum OrchestratorCommand {
    Pause,
    /// Resume takes effect at the next turn/round boundary, never mid-turn.
    /// `override_critical_cost` must be set to resume a debate the
    /// orchestrator auto-paused for `CostLevel::Critical`.
    Resume { override_critical_cost: bool },
    /// Stop is immediate at the next delta boundary; any in-flight turn is
    /// cancelled and not persisted.
    Stop,
}

/// Handle an API caller uses to control a running orchestrator. `Clone`
/// because both the registry and the API handler that issued the control
/// command need to hold one.
#[derive(Clone)]
pub struct OrchestratorHandle {
    control_tx: mpsc::Sender<OrchestratorCommand>,
    cancel: CancelToken,
}

impl OrchestratorHandle {
    pub async fn send(&self, command: OrchestratorCommand) -> bool {
        self.control_tx.send(command).await.is_ok()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Per-process registry of running orchestrators, one per active
/// conversation.
#[derive(Default)]
pub struct OrchestratorRegistry {
    handles: RwLock<HashMap<Uuid, OrchestratorHandle>>,
}

impl OrchestratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conversation_id: Uuid, handle: OrchestratorHandle) {
        self.handles.write().insert(conversation_id, handle);
    }

    pub fn get(&self, conversation_id: Uuid) -> Option<OrchestratorHandle> {
        self.handles.read().get(&conversation_id).cloned()
    }

    pub fn remove(&self, conversation_id: Uuid) {
        self.handles.write().remove(&conversation_id);
    }

    pub fn is_running(&self, conversation_id: Uuid) -> bool {
        self.handles.read().contains_key(&conversation_id)
    }
}

/// Spawn the orchestrator task for `conversation` and return a handle to
/// control it. The caller is responsible for having already persisted the
/// conversation in `Created` status.
pub fn start_orchestrator(state: AppState, conversation: Conversation) -> OrchestratorHandle {
    let (control_tx, control_rx) = mpsc::channel(8);
    let cancel = state.cancel_map.register(conversation.id);
    let event_bus = state.event_buses.get_or_create(conversation.id);
    let handle = OrchestratorHandle {
        control_tx,
        cancel: cancel.clone(),
    };
    state.orchestrators.insert(conversation.id, handle.clone());

    let conversation_id = conversation.id;
    let span = tracing::info_span!("orchestrator", conversation_id = %conversation_id);
    let state_for_task = state.clone();

    tokio::spawn(
        async move {
            if let Err(e) = run(&state_for_task, conversation, control_rx, cancel, event_bus).await {
                tracing::error!(error = %e, "orchestrator ended in error");
            }
            state_for_task.orchestrators.remove(conversation_id);
            state_for_task.cancel_map.remove(conversation_id);
        }
        .instrument(span),
    );

    handle
}

enum ControlOutcome {
    Resumed,
    Stopped,
    Cancelled,
}

enum TurnOutcome {
    Completed,
    Cancelled,
}

enum StreamOutcome {
    Completed(StreamResult),
    Cancelled,
}

struct StreamResult {
    content: String,
    usage: Option<Usage>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Main loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run(
    state: &AppState,
    mut conversation: Conversation,
    mut control_rx: mpsc::Receiver<OrchestratorCommand>,
    cancel: CancelToken,
    event_bus: Arc<EventBus>,
) -> Result<()> {
    conversation.status = ConversationStatus::Running;
    state.store.update_conversation(&conversation).await?;
    event_bus.publish(EventKind::LifecycleReady);
    event_bus.publish(EventKind::LifecycleRunning);

    let mut override_critical_cost = false;
    let mut stop_requested = false;
    let mut run_error: Option<Error> = None;

    'rounds: while conversation.current_round < conversation.max_rounds {
        while conversation.current_turn_index < conversation.participant_count() as u32 {
            drain_commands(
                &mut conversation,
                &mut control_rx,
                &event_bus,
                &mut override_critical_cost,
                &mut stop_requested,
            );

            if stop_requested || cancel.is_cancelled() {
                break 'rounds;
            }

            if conversation.status == ConversationStatus::Paused {
                match wait_for_resume(&mut control_rx, &cancel, &mut override_critical_cost).await {
                    ControlOutcome::Resumed => {
                        conversation.status = ConversationStatus::Running;
                        state.store.update_conversation(&conversation).await?;
                        event_bus.publish(EventKind::LifecycleRunning);
                    }
                    ControlOutcome::Stopped => {
                        stop_requested = true;
                        break 'rounds;
                    }
                    ControlOutcome::Cancelled => break 'rounds,
                }
                continue;
            }

            match dispatch_turn(state, &mut conversation, &event_bus, &cancel).await {
                Ok(TurnOutcome::Completed) => {}
                Ok(TurnOutcome::Cancelled) => break 'rounds,
                Err(e) => {
                    run_error = Some(e);
                    break 'rounds;
                }
            }

            conversation.current_turn_index += 1;
            state.store.update_conversation(&conversation).await?;

            let critical = CostLevel::classify(
                conversation.total_cost_usd,
                conversation.cost_warning_threshold,
            ) == CostLevel::Critical;
            if critical && !override_critical_cost {
                conversation.status = ConversationStatus::Paused;
                state.store.update_conversation(&conversation).await?;
                event_bus.publish(EventKind::LifecyclePaused);
            }
        }

        if stop_requested || cancel.is_cancelled() || run_error.is_some() {
            break;
        }

        event_bus.publish(EventKind::RoundCompleted {
            round: conversation.current_round,
        });
        maybe_run_judge(state, &mut conversation, &event_bus).await;

        conversation.current_round += 1;
        conversation.current_turn_index = 0;
        state.store.update_conversation(&conversation).await?;
    }

    if let Some(e) = run_error {
        conversation.status = ConversationStatus::Errored;
        state.store.update_conversation(&conversation).await?;
        event_bus.publish(EventKind::LifecycleError {
            kind: e
                .failure_kind()
                .map(|k| format!("{k:?}"))
                .unwrap_or_else(|| "unknown".into()),
            message: e.to_string(),
        });
        return Err(e);
    }

    conversation.status = ConversationStatus::Completed;
    state.store.update_conversation(&conversation).await?;
    event_bus.publish(EventKind::LifecycleCompleted);
    Ok(())
}

/// Drain any queued control commands without blocking. Called between
/// turns, never mid-stream.
fn drain_commands(
    conversation: &mut Conversation,
    control_rx: &mut mpsc::Receiver<OrchestratorCommand>,
    event_bus: &EventBus,
    override_critical_cost: &mut bool,
    stop_requested: &mut bool,
) {
    while let Ok(command) = control_rx.try_recv() {
        match command {
            OrchestratorCommand::Pause => {
                if conversation.status == ConversationStatus::Running {
                    conversation.status = ConversationStatus::Paused;
                    event_bus.publish(EventKind::LifecyclePaused);
                }
            }
            OrchestratorCommand::Resume { override_critical_cost: ov } => {
                *override_critical_cost = ov;
                if conversation.status == ConversationStatus::Paused {
                    conversation.status = ConversationStatus::Running;
                    event_bus.publish(EventKind::LifecycleRunning);
                }
            }
            OrchestratorCommand::Stop => {
                *stop_requested = true;
            }
        }
    }
}

/// Block (periodically re-checking cancellation) until the pause is lifted,
/// cancelled, or stopped.
async fn wait_for_resume(
    control_rx: &mut mpsc::Receiver<OrchestratorCommand>,
    cancel: &CancelToken,
    override_critical_cost: &mut bool,
) -> ControlOutcome {
    loop {
        if cancel.is_cancelled() {
            return ControlOutcome::Cancelled;
        }
        match tokio::time::timeout(Duration::from_millis(250), control_rx.recv()).await {
            Ok(Some(OrchestratorCommand::Resume { override_critical_cost: ov })) => {
                *override_critical_cost = ov;
                return ControlOutcome::Resumed;
            }
            Ok(Some(OrchestratorCommand::Stop)) => return ControlOutcome::Stopped,
            Ok(Some(OrchestratorCommand::Pause)) => continue,
            Ok(None) => return ControlOutcome::Stopped,
            Err(_) => continue,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn dispatch (§4.7 dispatch_turn)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn dispatch_turn(
    state: &AppState,
    conversation: &mut Conversation,
    event_bus: &EventBus,
    cancel: &CancelToken,
) -> Result<TurnOutcome> {
    let turn_index = conversation.current_turn_index;
    let round = conversation.current_round;
    let participant = conversation.participants[turn_index as usize].clone();

    let (provider, model) = state.providers.resolve(&participant.model)?;
    let caps = provider.capabilities().clone();

    let history = state.store.list_messages(conversation.id).await?;
    let builder = ContextBuilder::new(caps.context_window_tokens.unwrap_or(100_000));
    let model_for_count = model.clone();
    let provider_for_count = provider.clone();
    let prompt = builder.build(
        conversation,
        &participant,
        &history,
        participant.max_output_tokens,
        |text| provider_for_count.count_tokens(&model_for_count, text),
    );

    event_bus.publish(EventKind::TurnStarted {
        round,
        turn_index,
        participant_index: participant.index,
        participant_name: participant.name.clone(),
    });

    let request = CompletionRequest {
        messages: to_provider_messages(prompt),
        temperature: Some(participant.temperature),
        max_tokens: Some(participant.max_output_tokens),
        model: Some(model.clone()),
    };

    let deadline = Duration::from_secs(state.config.orchestrator.turn_deadline_secs);
    let backoffs = state.config.orchestrator.retry_backoffs_ms;

    let mut attempt = 0usize;
    let (result, response_time_ms) = loop {
        if cancel.is_cancelled() {
            return Ok(TurnOutcome::Cancelled);
        }
        let start = Instant::now();
        match run_stream(
            provider.as_ref(),
            request.clone(),
            event_bus,
            participant.index,
            cancel,
            deadline,
        )
        .await
        {
            Ok(StreamOutcome::Completed(result)) => break (result, start.elapsed().as_millis() as u64),
            Ok(StreamOutcome::Cancelled) => return Ok(TurnOutcome::Cancelled),
            Err(e) if e.is_retriable() && attempt < backoffs.len() => {
                let backoff_ms = backoffs[attempt];
                let jitter_ms = rand::random::<u64>() % 250;
                tracing::warn!(error = %e, attempt, "provider stream failed, retrying");
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
                if cancel.is_cancelled() {
                    return Ok(TurnOutcome::Cancelled);
                }
            }
            Err(e) => return Err(e),
        }
    };

    let usage = result.usage.unwrap_or_default();
    let cost_usd = provider_pricing(state, &model)
        .map(|p| p.estimate_cost(usage.prompt_tokens, usage.completion_tokens))
        .unwrap_or(0.0);

    let message = Message {
        id: Uuid::new_v4(),
        conversation_id: conversation.id,
        participant_index: participant.index,
        participant_name: participant.name.clone(),
        model: model.clone(),
        role: MessageRole::Assistant,
        content: result.content,
        sequence_number: 0,
        round_number: round,
        turn_index,
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        response_time_ms,
        created_at: Utc::now(),
    };

    let sequence_number = state.store.insert_message(&message).await?;
    let mut persisted = message;
    persisted.sequence_number = sequence_number;

    conversation.total_cost_usd += cost_usd;
    conversation.total_input_tokens += usage.prompt_tokens as u64;
    conversation.total_output_tokens += usage.completion_tokens as u64;

    event_bus.publish(EventKind::TurnCompleted {
        message_id: persisted.id,
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cost_usd,
        response_time_ms,
    });

    let previous_level = conversation.last_cost_level;
    let new_level = CostLevel::classify(conversation.total_cost_usd, conversation.cost_warning_threshold);
    if new_level != previous_level {
        conversation.last_cost_level = new_level;
        event_bus.publish(EventKind::CostWarning {
            level: format!("{new_level:?}").to_lowercase(),
            total_cost: conversation.total_cost_usd,
            threshold: conversation.cost_warning_threshold,
        });
    }

    spawn_quality_pipeline(state.clone(), conversation.clone(), persisted);

    Ok(TurnOutcome::Completed)
}

fn to_provider_messages(prompt: Vec<parley_context::builder::PromptMessage>) -> Vec<ProviderMessage> {
    prompt
        .into_iter()
        .map(|m| ProviderMessage {
            role: match m.role {
                PromptRole::System => ProviderRole::System,
                PromptRole::User => ProviderRole::User,
                PromptRole::Assistant => ProviderRole::Assistant,
            },
            content: m.content,
        })
        .collect()
}

/// Stream one completion to its terminal event, publishing a
/// `turn.token_delta` per chunk. Checked for cancellation before every read
/// and wrapped in the per-turn wall-clock deadline, which surfaces as a
/// retriable `ProviderTimeout` on expiry.
async fn run_stream(
    provider: &dyn CompletionProvider,
    request: CompletionRequest,
    event_bus: &EventBus,
    participant_index: u32,
    cancel: &CancelToken,
    deadline: Duration,
) -> Result<StreamOutcome> {
    let mut stream = provider.stream_complete(request).await?;
    let mut content = String::new();
    let mut usage = None;

    loop {
        if cancel.is_cancelled() {
            return Ok(StreamOutcome::Cancelled);
        }

        let next = tokio::time::timeout(deadline, stream.next())
            .await
            .map_err(|_| {
                Error::provider(
                    provider.provider_id(),
                    FailureKind::ProviderTimeout,
                    "turn deadline exceeded",
                )
            })?;

        let Some(event) = next else {
            break;
        };

        match event? {
            StreamEvent::Token { text } => {
                content.push_str(&text);
                event_bus.publish(EventKind::TurnTokenDelta {
                    participant_index,
                    delta: text,
                });
            }
            StreamEvent::Done { usage: u, .. } => {
                usage = u;
                break;
            }
            StreamEvent::Error { message } => {
                return Err(Error::provider(
                    provider.provider_id(),
                    FailureKind::ProviderTransport,
                    message,
                ));
            }
        }
    }

    Ok(StreamOutcome::Completed(StreamResult { content, usage }))
}

fn provider_pricing<'a>(
    state: &'a AppState,
    model: &str,
) -> Option<&'a parley_domain::config::ModelPricing> {
    parley_context::tokens::price(model, &state.config.llm.pricing)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Judge (§4.7 judge cadence)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn maybe_run_judge(state: &AppState, conversation: &mut Conversation, event_bus: &EventBus) {
    let should_run = match conversation.judge_cadence {
        JudgeCadence::Never => false,
        JudgeCadence::PerRound => {
            conversation.current_round >= state.config.orchestrator.min_rounds_before_judge
        }
        JudgeCadence::FinalRoundOnly => conversation.current_round + 1 >= conversation.max_rounds,
    };
    if !should_run {
        return;
    }

    let Some(judge_model) = conversation.judge_model.clone() else {
        return;
    };

    let (provider, model) = match state.providers.resolve(&judge_model) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "judge provider unavailable, skipping assessment");
            return;
        }
    };

    let history = match state.store.list_messages(conversation.id).await {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load transcript for judge");
            return;
        }
    };

    let transcript = history
        .iter()
        .map(|m| format!("{} (round {}): {}", m.participant_name, m.round_number, m.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let schema = json!({
        "type": "object",
        "properties": {
            "winner": {"type": "string"},
            "reasoning": {"type": "string"},
            "scores": {
                "type": "object",
                "additionalProperties": {"type": "number"}
            }
        },
        "required": ["winner", "reasoning", "scores"]
    });

    let request = CompletionRequest {
        messages: vec![
            ProviderMessage::system(
                "You are judging a multi-participant debate. Respond only with a JSON \
                 object matching the given schema.",
            ),
            ProviderMessage::user(format!(
                "Topic: {}\n\nTranscript:\n{}",
                conversation.topic, transcript
            )),
        ],
        temperature: Some(0.0),
        max_tokens: Some(1024),
        model: Some(model),
    };

    match provider.complete_structured(request, &schema).await {
        Ok(payload) => {
            event_bus.publish(EventKind::JudgeAssessment {
                round: conversation.current_round,
                payload,
            });
        }
        Err(e) => {
            tracing::warn!(error = %e, "judge assessment failed schema validation, skipping");
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Quality pipeline (§4.5) — fire-and-forget after every completed turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn spawn_quality_pipeline(state: AppState, conversation: Conversation, message: Message) {
    tokio::spawn(async move {
        if let Err(e) = run_quality_pipeline(&state, &conversation, &message).await {
            tracing::warn!(
                error = %e,
                conversation_id = %conversation.id,
                "quality pipeline failed"
            );
        }
    });
}

async fn run_quality_pipeline(
    state: &AppState,
    conversation: &Conversation,
    message: &Message,
) -> Result<()> {
    if message.role != MessageRole::Assistant {
        return Ok(());
    }

    let history = state.store.list_messages(conversation.id).await?;
    let event_bus = state.event_buses.get_or_create(conversation.id);

    if let Some(detector) = &state.contradiction_detector {
        let existing = state
            .store
            .list_contradictions(conversation.id, &Default::default())
            .await?;
        let found = {
            let mut store = state.vector_store.write();
            detector.detect(message, &history, &mut store, &existing).await?
        };
        for contradiction in found {
            let inserted = state.store.insert_contradiction(&contradiction).await?;
            if inserted {
                event_bus.publish(EventKind::QualityContradictionDetected {
                    contradiction_id: contradiction.id,
                    severity: contradiction.severity,
                    message_a_id: contradiction.message_a_id,
                    message_b_id: contradiction.message_b_id,
                    similarity: contradiction.similarity,
                    confidence: contradiction.confidence,
                });
            }
        }
    }

    let existing_loops = state
        .store
        .list_loops(conversation.id, &Default::default())
        .await?;
    let vector_store = state.vector_store.clone();
    let conversation_id = conversation.id;
    let outcome = state.loop_detector.detect(
        &history,
        |message_id| vector_store.read().get(conversation_id, message_id),
        &existing_loops,
    );
    if let Some(outcome) = outcome {
        let mut loop_record = materialize_loop_outcome(outcome, &existing_loops);
        if loop_record.repetition_count >= state.config.quality.loop_detection.intervention_threshold
            && loop_record.intervention_status == InterventionStatus::Detected
        {
            loop_record.suggested_intervention = Some(format!(
                "pattern of length {} repeated {} times; consider steering the debate \
                 or invoking the judge",
                loop_record.loop_size, loop_record.repetition_count
            ));
        }
        state.store.upsert_loop(&loop_record).await?;
        event_bus.publish(EventKind::QualityLoopDetected {
            loop_id: loop_record.id,
            repetition_count: loop_record.repetition_count,
            loop_size: loop_record.loop_size,
            intervention_status: loop_record.intervention_status,
        });
    }

    let assistant_messages: Vec<&Message> = history
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .collect();
    let assistant_embeddings: Vec<Option<Vec<f32>>> = {
        let store = state.vector_store.read();
        assistant_messages
            .iter()
            .map(|m| store.get(conversation.id, m.id))
            .collect()
    };
    let contradictions = state
        .store
        .list_contradictions(conversation.id, &Default::default())
        .await?;
    let loops = state
        .store
        .list_loops(conversation.id, &Default::default())
        .await?;
    let sample = state.health_scorer.score(
        conversation.id,
        &assistant_embeddings,
        &contradictions,
        &loops,
        history.len() as u32,
    );
    state.store.insert_health_sample(&sample).await?;
    event_bus.publish(EventKind::QualityHealthUpdate {
        score: sample.overall_score,
        components: sample.components,
    });

    if let Some(mut updated) = state.store.get_conversation(conversation.id).await? {
        updated.current_health_score = Some(sample.overall_score);
        state.store.update_conversation(&updated).await?;
    }

    Ok(())
}

fn materialize_loop_outcome(outcome: LoopOutcome, existing: &[ConversationLoop]) -> ConversationLoop {
    match outcome {
        LoopOutcome::New(loop_record) => loop_record,
        LoopOutcome::Update {
            loop_id,
            repetition_count,
            last_occurrence_message_id,
            intervention_status,
        } => {
            let mut record = existing
                .iter()
                .find(|l| l.id == loop_id)
                .cloned()
                .expect("loop update outcome references a known loop id");
            record.repetition_count = repetition_count;
            record.last_occurrence_message_id = last_occurrence_message_id;
            record.intervention_status = intervention_status;
            record
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_context::builder::PromptMessage;

    #[test]
    fn to_provider_messages_maps_roles() {
        let prompt = vec![
            PromptMessage { role: PromptRole::System, content: "sys".into() },
            PromptMessage { role: PromptRole::User, content: "usr".into() },
            PromptMessage { role: PromptRole::Assistant, content: "asst".into() },
        ];
        let mapped = to_provider_messages(prompt);
        assert_eq!(mapped.len(), 3);
        assert_eq!(mapped[0].role, ProviderRole::System);
        assert_eq!(mapped[1].role, ProviderRole::User);
        assert_eq!(mapped[2].role, ProviderRole::Assistant);
    }

    #[test]
    fn materialize_new_outcome_is_passthrough() {
        let record = ConversationLoop {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            pattern_hash: "abc".into(),
            description: "A, B, A, B".into(),
            loop_size: 2,
            repetition_count: 2,
            first_occurrence_message_id: Uuid::new_v4(),
            last_occurrence_message_id: Uuid::new_v4(),
            intervention_status: InterventionStatus::Detected,
            suggested_intervention: None,
            detected_at: Utc::now(),
        };
        let outcome = LoopOutcome::New(record.clone());
        let materialized = materialize_loop_outcome(outcome, &[]);
        assert_eq!(materialized.id, record.id);
    }

    #[test]
    fn materialize_update_outcome_mutates_existing() {
        let existing = ConversationLoop {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            pattern_hash: "abc".into(),
            description: "A, B, A, B".into(),
            loop_size: 2,
            repetition_count: 2,
            first_occurrence_message_id: Uuid::new_v4(),
            last_occurrence_message_id: Uuid::new_v4(),
            intervention_status: InterventionStatus::Detected,
            suggested_intervention: None,
            detected_at: Utc::now(),
        };
        let new_last = Uuid::new_v4();
        let outcome = LoopOutcome::Update {
            loop_id: existing.id,
            repetition_count: 3,
            last_occurrence_message_id: new_last,
            intervention_status: InterventionStatus::Intervened,
        };
        let materialized = materialize_loop_outcome(outcome, std::slice::from_ref(&existing));
        assert_eq!(materialized.repetition_count, 3);
        assert_eq!(materialized.last_occurrence_message_id, new_last);
        assert_eq!(materialized.intervention_status, InterventionStatus::Intervened);
    }

    #[test]
    #[should_panic(expected = "known loop id")]
    fn materialize_update_outcome_panics_on_unknown_id() {
        let outcome = LoopOutcome::Update {
            loop_id: Uuid::new_v4(),
            repetition_count: 1,
            last_occurrence_message_id: Uuid::new_v4(),
            intervention_status: InterventionStatus::Detected,
        };
        materialize_loop_outcome(outcome, &[]);
    }

    #[test]
    fn orchestrator_registry_lifecycle() {
        let registry = OrchestratorRegistry::new();
        let id = Uuid::new_v4();
        assert!(!registry.is_running(id));

        let (tx, _rx) = mpsc::channel(1);
        let handle = OrchestratorHandle {
            control_tx: tx,
            cancel: CancelToken::new(),
        };
        registry.insert(id, handle);
        assert!(registry.is_running(id));

        registry.remove(id);
        assert!(!registry.is_running(id));
    }
}

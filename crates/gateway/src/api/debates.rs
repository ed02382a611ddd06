//! Debate lifecycle endpoints: create, start, pause, resume, stop.
//!
//! Grounded on the Orchestrator FSM in `runtime::orchestrator` — this module
//! is deliberately thin. It validates requests, reads/writes the
//! `ConversationStore`, and hands control off to the orchestrator registry;
//! it never touches debate semantics directly.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parley_domain::model::{Conversation, ConversationStatus, JudgeCadence, Participant};

use crate::runtime::{start_orchestrator, OrchestratorCommand};
use crate::state::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /debates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ParticipantInput {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Deserialize)]
pub struct JudgeInput {
    pub model: Option<String>,
    #[serde(default)]
    pub cadence: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDebateRequest {
    pub topic: String,
    pub participants: Vec<ParticipantInput>,
    pub max_rounds: u32,
    #[serde(default = "default_context_window_rounds")]
    pub context_window_rounds: u32,
    pub cost_warning_threshold: f64,
    #[serde(default)]
    pub judge: Option<JudgeInput>,
}

fn default_context_window_rounds() -> u32 {
    10
}

#[derive(Debug, Serialize)]
pub struct CreateDebateResponse {
    pub id: Uuid,
    pub status: &'static str,
}

fn parse_cadence(raw: &str) -> Result<JudgeCadence, ApiError> {
    match raw {
        "per_round" => Ok(JudgeCadence::PerRound),
        "final_round_only" => Ok(JudgeCadence::FinalRoundOnly),
        "never" => Ok(JudgeCadence::Never),
        other => Err(error(
            StatusCode::BAD_REQUEST,
            format!("unknown judge cadence: {other}"),
        )),
    }
}

fn validate_create(req: &CreateDebateRequest) -> Result<(), ApiError> {
    if req.topic.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "topic must not be empty"));
    }
    if req.participants.len() < 2 || req.participants.len() > 4 {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "participants must number between 2 and 4",
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for p in &req.participants {
        if p.name.trim().is_empty() {
            return Err(error(StatusCode::BAD_REQUEST, "participant name must not be empty"));
        }
        if !seen.insert(p.name.clone()) {
            return Err(error(
                StatusCode::BAD_REQUEST,
                format!("duplicate participant name: {}", p.name),
            ));
        }
    }
    if req.max_rounds < 1 {
        return Err(error(StatusCode::BAD_REQUEST, "max_rounds must be at least 1"));
    }
    if req.cost_warning_threshold <= 0.0 {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "cost_warning_threshold must be positive",
        ));
    }
    Ok(())
}

pub async fn create_debate(
    State(state): State<AppState>,
    Json(req): Json<CreateDebateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_create(&req)?;

    let judge_cadence = match &req.judge {
        Some(j) => match &j.cadence {
            Some(raw) => parse_cadence(raw)?,
            None => JudgeCadence::default(),
        },
        None => JudgeCadence::default(),
    };
    let judge_model = req.judge.as_ref().and_then(|j| j.model.clone());

    let participants = req
        .participants
        .into_iter()
        .enumerate()
        .map(|(index, p)| Participant {
            index: index as u32,
            name: p.name,
            model: p.model,
            system_prompt: p.system_prompt,
            temperature: p.temperature,
            max_output_tokens: p.max_tokens,
        })
        .collect();

    let conversation = Conversation::new(
        req.topic,
        participants,
        req.max_rounds,
        req.context_window_rounds,
        req.cost_warning_threshold,
        judge_model,
        judge_cadence,
    );

    state
        .store
        .create_conversation(&conversation)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(CreateDebateResponse {
            id: conversation.id,
            status: "configured",
        }),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /debates/{id}/start
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn load_conversation(state: &AppState, id: Uuid) -> Result<Conversation, ApiError> {
    state
        .store
        .get_conversation(id)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "debate not found"))
}

pub async fn start_debate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = load_conversation(&state, id).await?;

    if conversation.status != ConversationStatus::Created {
        return Err(error(
            StatusCode::CONFLICT,
            format!("debate is {:?}, not ready to start", conversation.status),
        ));
    }
    if state.orchestrators.is_running(id) {
        return Err(error(StatusCode::CONFLICT, "debate is already running"));
    }

    start_orchestrator(state, conversation);

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": id, "status": "running" })),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /debates/{id}/pause | /resume | /stop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize, Default)]
pub struct ResumeRequest {
    #[serde(default)]
    pub override_critical_cost: bool,
}

async fn send_command(
    state: &AppState,
    id: Uuid,
    command: OrchestratorCommand,
) -> Result<(), ApiError> {
    let handle = state
        .orchestrators
        .get(id)
        .ok_or_else(|| error(StatusCode::CONFLICT, "debate is not running"))?;

    if !handle.send(command).await {
        return Err(error(
            StatusCode::CONFLICT,
            "debate's orchestrator task is no longer accepting commands",
        ));
    }
    Ok(())
}

pub async fn pause_debate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    send_command(&state, id, OrchestratorCommand::Pause).await?;
    Ok(Json(serde_json::json!({ "id": id, "status": "pause_requested" })))
}

pub async fn resume_debate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResumeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    send_command(
        &state,
        id,
        OrchestratorCommand::Resume {
            override_critical_cost: req.override_critical_cost,
        },
    )
    .await?;
    Ok(Json(serde_json::json!({ "id": id, "status": "resume_requested" })))
}

pub async fn stop_debate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    send_command(&state, id, OrchestratorCommand::Stop).await?;
    // Stop is immediate, not just "at the next boundary" — cancel the
    // in-flight turn too, or a mid-stream completion would still persist.
    state.cancel_map.cancel(id);
    Ok(Json(serde_json::json!({ "id": id, "status": "stop_requested" })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /debates/{id}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_debate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = load_conversation(&state, id).await?;
    Ok(Json(conversation))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> CreateDebateRequest {
        CreateDebateRequest {
            topic: "Is a hot dog a sandwich?".into(),
            participants: vec![
                ParticipantInput {
                    name: "Pro".into(),
                    model: "local-stub/a".into(),
                    system_prompt: String::new(),
                    temperature: 0.7,
                    max_tokens: 512,
                },
                ParticipantInput {
                    name: "Con".into(),
                    model: "local-stub/b".into(),
                    system_prompt: String::new(),
                    temperature: 0.7,
                    max_tokens: 512,
                },
            ],
            max_rounds: 3,
            context_window_rounds: 10,
            cost_warning_threshold: 1.0,
            judge: None,
        }
    }

    #[test]
    fn validate_accepts_well_formed_request() {
        assert!(validate_create(&base_request()).is_ok());
    }

    #[test]
    fn validate_rejects_single_participant() {
        let mut req = base_request();
        req.participants.truncate(1);
        assert!(validate_create(&req).is_err());
    }

    #[test]
    fn validate_rejects_five_participants() {
        let mut req = base_request();
        let extra = ParticipantInput {
            name: "Extra".into(),
            model: "local-stub/c".into(),
            system_prompt: String::new(),
            temperature: 0.7,
            max_tokens: 512,
        };
        req.participants.extend([extra.clone(), extra.clone(), extra]);
        assert!(validate_create(&req).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let mut req = base_request();
        req.participants[1].name = req.participants[0].name.clone();
        assert!(validate_create(&req).is_err());
    }

    #[test]
    fn validate_rejects_zero_max_rounds() {
        let mut req = base_request();
        req.max_rounds = 0;
        assert!(validate_create(&req).is_err());
    }

    #[test]
    fn validate_rejects_non_positive_threshold() {
        let mut req = base_request();
        req.cost_warning_threshold = 0.0;
        assert!(validate_create(&req).is_err());
    }

    #[test]
    fn parse_cadence_accepts_known_values() {
        assert_eq!(parse_cadence("per_round").unwrap(), JudgeCadence::PerRound);
        assert_eq!(parse_cadence("final_round_only").unwrap(), JudgeCadence::FinalRoundOnly);
        assert_eq!(parse_cadence("never").unwrap(), JudgeCadence::Never);
        assert!(parse_cadence("whenever").is_err());
    }
}

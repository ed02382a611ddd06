//! Query API (§4.10): read-only access to the quality analyzers' persisted
//! findings — contradictions, loops, and health history.
//!
//! These handlers never consult live orchestrator state; they only read
//! from the `ConversationStore`, same as the teacher's deliveries inbox
//! reads only from its delivery store.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use parley_domain::model::{HealthStatus, InterventionStatus, Severity};
use parley_persistence::{ContradictionFilter, LoopFilter};

use crate::state::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

fn default_limit() -> i64 {
    50
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    25
}

fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> (Vec<T>, usize) {
    let total = items.len();
    let page = page.max(1);
    let page_size = page_size.max(1);
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);
    (items.into_iter().skip(start).take(end - start).collect(), total)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /conversations/{id}/quality
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_quality(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = state
        .store
        .get_conversation(id)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "conversation not found"))?;

    let samples = state
        .store
        .list_health_samples(id, 1)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let latest = samples.into_iter().next();

    let contradictions = state
        .store
        .list_contradictions(id, &ContradictionFilter::default())
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let loops = state
        .store
        .list_loops(id, &LoopFilter::default())
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let overall = conversation.current_health_score.unwrap_or(100.0);

    Ok(Json(serde_json::json!({
        "overall": overall,
        "status": HealthStatus::from_score(overall),
        "components": latest.as_ref().map(|s| s.components),
        "counts": {
            "contradictions": contradictions.len(),
            "unresolved_contradictions": contradictions.iter().filter(|c| !c.resolved).count(),
            "loops": loops.len(),
            "active_loops": loops
                .iter()
                .filter(|l| l.intervention_status != InterventionStatus::Broken)
                .count(),
        },
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /conversations/{id}/contradictions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ListContradictionsQuery {
    pub status: Option<String>,
    pub severity: Option<Severity>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

pub async fn list_contradictions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListContradictionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let resolved = match query.status.as_deref() {
        Some("resolved") => Some(true),
        Some("unresolved") => Some(false),
        Some(other) => {
            return Err(error(
                StatusCode::BAD_REQUEST,
                format!("unknown status filter: {other}"),
            ))
        }
        None => None,
    };

    let filter = ContradictionFilter {
        resolved,
        acknowledged: None,
        severity: query.severity,
    };

    let items = state
        .store
        .list_contradictions(id, &filter)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let (page_items, total) = paginate(items, query.page, query.page_size);

    Ok(Json(serde_json::json!({
        "items": page_items,
        "page": query.page.max(1),
        "page_size": query.page_size.max(1),
        "total": total,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /contradictions/{id}/resolve
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize, Default)]
pub struct ResolveContradictionRequest {
    pub note: Option<String>,
}

pub async fn resolve_contradiction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveContradictionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .resolve_contradiction(id, req.note.clone())
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(serde_json::json!({
        "id": id,
        "status": "resolved",
        "note": req.note,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /conversations/{id}/loops
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ListLoopsQuery {
    pub status: Option<InterventionStatus>,
    pub min_repetitions: Option<u32>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

pub async fn list_loops(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListLoopsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = LoopFilter {
        intervention_status: query.status,
        min_repetitions: query.min_repetitions,
    };

    let items = state
        .store
        .list_loops(id, &filter)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let (page_items, total) = paginate(items, query.page, query.page_size);

    Ok(Json(serde_json::json!({
        "items": page_items,
        "page": query.page.max(1),
        "page_size": query.page_size.max(1),
        "total": total,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /conversations/{id}/health-history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct HealthHistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

pub async fn health_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<HealthHistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let samples = state
        .store
        .list_health_samples(id, query.limit)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(serde_json::json!({ "samples": samples })))
}

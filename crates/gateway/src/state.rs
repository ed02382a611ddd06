use std::sync::Arc;

use parking_lot::RwLock;
use parley_domain::config::Config;
use parley_persistence::ConversationStore;
use parley_providers::registry::ProviderRegistry;
use parley_quality::{ContradictionDetector, Embedder, HealthScorer, LoopDetector, VectorStore};

use crate::runtime::{CancelMap, EventBusRegistry, OrchestratorRegistry};

/// Shared application state passed to all API handlers and into every
/// spawned orchestrator task.
///
/// Fields are grouped by concern:
/// - **Core services** — config, providers, persistence
/// - **Quality** — embedder, contradiction/loop detectors, health scorer,
///   the in-memory vector index they share
/// - **Runtime** — event buses, orchestrators, cancellation
/// - **Security** — the API bearer token hash computed once at startup
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub providers: Arc<ProviderRegistry>,
    pub store: Arc<dyn ConversationStore>,

    // ── Quality (§4.4, §4.5) ────────────────────────────────────────────
    /// `None` when `config.embedder.provider` is unset: the debate then
    /// runs in text-only mode with contradiction detection disabled and
    /// loop detection falling back to its text-shingle fingerprint.
    pub embedder: Option<Arc<dyn Embedder>>,
    pub contradiction_detector: Option<Arc<ContradictionDetector>>,
    pub loop_detector: Arc<LoopDetector>,
    pub health_scorer: Arc<HealthScorer>,
    pub vector_store: Arc<RwLock<VectorStore>>,

    // ── Runtime (§4.6, §4.7) ────────────────────────────────────────────
    pub event_buses: Arc<EventBusRegistry>,
    pub orchestrators: Arc<OrchestratorRegistry>,
    pub cancel_map: Arc<CancelMap>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}

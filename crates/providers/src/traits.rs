use parley_domain::capability::ProviderCapabilities;
use parley_domain::error::Result;
use parley_domain::stream::{BoxStream, StreamEvent, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire-agnostic message shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single prompt message (provider-agnostic). Debate turns are plain text;
/// there is no tool-calling surface here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0). `None` lets the provider choose.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsRequest {
    pub input: Vec<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsResponse {
    pub embeddings: Vec<Vec<f32>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait (§4.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every completion-provider adapter implements: uniform streaming
/// and structured completion over heterogeneous model backends.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Open a streaming completion. Deltas arrive in production order; the
    /// final event is always `StreamEvent::Done` carrying usage. The stream
    /// is finite and single-pass (not restartable).
    async fn stream_complete(
        &self,
        req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A structured (JSON-schema-constrained) completion, used only by the
    /// Judge. Implementations either enforce the schema natively or prompt
    /// for JSON and validate, rejecting with a `FailureKind::ProviderInvalid`
    /// error if parsing fails.
    async fn complete_structured(
        &self,
        req: CompletionRequest,
        json_schema: &serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Approximate token count under this provider's tokenizer family
    /// (§4.1). Unknown models fall back to the chars/4 estimator.
    fn count_tokens(&self, model: &str, text: &str) -> u32;

    /// Generate text embeddings, for providers that double as an embedder.
    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse>;

    fn capabilities(&self) -> &ProviderCapabilities;

    /// A unique identifier for this provider instance, e.g. `"openai"`.
    fn provider_id(&self) -> &str;
}

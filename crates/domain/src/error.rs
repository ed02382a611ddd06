use serde::Serialize;

/// Coarse failure classification, carried alongside provider/persistence
/// errors so callers can branch on taxonomy without matching on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ProviderRateLimit,
    ProviderTransport,
    ProviderContextLength,
    ProviderAuth,
    ProviderInvalid,
    ProviderTimeout,
    PersistenceConflict,
    PersistenceFatal,
    Validation,
    BudgetCritical,
}

/// Shared error type used across all crates in this workspace.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider} ({kind:?}): {message}")]
    Provider {
        provider: String,
        kind: FailureKind,
        message: String,
    },

    #[error("persistence ({0:?}): {1}")]
    Persistence(FailureKind, String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn provider(provider: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn persistence(kind: FailureKind, message: impl Into<String>) -> Self {
        Error::Persistence(kind, message.into())
    }

    /// Failure kind, when this error carries one (provider/persistence errors).
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Error::Provider { kind, .. } => Some(*kind),
            Error::Persistence(kind, _) => Some(*kind),
            Error::Validation(_) => Some(FailureKind::Validation),
            _ => None,
        }
    }

    /// Whether the orchestrator should retry the same turn after this error.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.failure_kind(),
            Some(FailureKind::ProviderTimeout)
                | Some(FailureKind::ProviderTransport)
                | Some(FailureKind::ProviderRateLimit)
        ) || matches!(self, Error::Timeout(_) | Error::Http(_))
    }
}

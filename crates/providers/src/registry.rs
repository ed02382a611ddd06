//! Completion provider registry.
//!
//! Constructs and holds all configured provider instances. At startup the
//! registry reads the [`LlmConfig`], resolves authentication (env vars or
//! direct keys), and instantiates the appropriate adapter for each
//! configured provider. Providers that fail to initialize are logged and
//! skipped rather than aborting the entire startup, per `LlmStartupPolicy`.

use crate::anthropic::AnthropicProvider;
use crate::local_stub::LocalStubProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::CompletionProvider;
use parley_domain::config::{LlmConfig, LlmStartupPolicy, ProviderKind};
use parley_domain::error::{Error, FailureKind, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn CompletionProvider>>,
    init_errors: Vec<ProviderInitError>,
}

#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub kind: String,
    pub error: String,
}

/// Mask substrings that look like API keys or bearer tokens before they
/// reach logs or readiness responses.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = if trimmed.len() > 8 {
                format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..])
            } else {
                "***masked***".to_string()
            };
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

impl ProviderRegistry {
    /// Build the registry from the application's `LlmConfig`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn CompletionProvider>> = HashMap::new();
        let mut init_errors: Vec<ProviderInitError> = Vec::new();

        for pc in &config.providers {
            let result: Result<Arc<dyn CompletionProvider>> = match pc.kind {
                ProviderKind::OpenaiCompat | ProviderKind::Mistral => {
                    OpenAiCompatProvider::from_config(pc, &config.pricing)
                        .map(|p| Arc::new(p) as Arc<dyn CompletionProvider>)
                }
                ProviderKind::Anthropic => AnthropicProvider::from_config(pc, &config.pricing)
                    .map(|p| Arc::new(p) as Arc<dyn CompletionProvider>),
                ProviderKind::Google => {
                    // Google speaks an OpenAI-compatible endpoint for chat
                    // completions; reuse the same adapter pointed at its
                    // base URL.
                    OpenAiCompatProvider::from_config(pc, &config.pricing)
                        .map(|p| Arc::new(p) as Arc<dyn CompletionProvider>)
                }
                ProviderKind::LocalStub => {
                    Ok(Arc::new(LocalStubProvider::new(pc.id.clone())) as Arc<dyn CompletionProvider>)
                }
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider_id = %pc.id, kind = ?pc.kind, "registered completion provider");
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %safe_error,
                        "failed to initialize completion provider, skipping"
                    );
                    init_errors.push(ProviderInitError {
                        provider_id: pc.id.clone(),
                        kind: format!("{:?}", pc.kind),
                        error: safe_error,
                    });
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            match config.startup_policy {
                LlmStartupPolicy::RequireOne => {
                    return Err(Error::Config(
                        "all configured completion providers failed to initialize \
                         (startup_policy = require_one)"
                            .into(),
                    ));
                }
                LlmStartupPolicy::AllowNone => {
                    tracing::warn!(
                        failed_providers = init_errors.len(),
                        "no completion providers initialized (startup_policy = allow_none); \
                         gateway will boot but debates cannot be started until one is configured"
                    );
                }
            }
        }

        Ok(Self {
            providers,
            init_errors,
        })
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn CompletionProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve a `"provider_id/model_name"` string to its provider.
    pub fn resolve(&self, model_spec: &str) -> Result<(Arc<dyn CompletionProvider>, String)> {
        let (provider_id, model) = match model_spec.split_once('/') {
            Some((p, m)) => (p, m),
            None => (model_spec, ""),
        };
        let provider = self.get(provider_id).ok_or_else(|| {
            Error::provider(
                provider_id,
                FailureKind::ProviderInvalid,
                format!("no provider registered with id '{provider_id}'"),
            )
        })?;
        Ok((provider, model.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn CompletionProvider>)> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_secrets_redacts_long_tokens() {
        let msg = "auth failed for key sk-abcdefghijklmnopqrstuvwxyz123456";
        let masked = mask_secrets(msg);
        assert!(!masked.contains("abcdefghijklmnopqrstuvwxyz"));
    }

    #[test]
    fn empty_registry_from_empty_config() {
        let cfg = LlmConfig::default();
        let reg = ProviderRegistry::from_config(&cfg).unwrap();
        assert!(reg.is_empty());
        assert!(reg.init_errors().is_empty());
    }

    #[test]
    fn resolve_splits_provider_and_model() {
        let mut cfg = LlmConfig::default();
        cfg.providers.push(parley_domain::config::ProviderConfig {
            id: "stub".into(),
            kind: ProviderKind::LocalStub,
            base_url: String::new(),
            auth: Default::default(),
            default_model: None,
        });
        let reg = ProviderRegistry::from_config(&cfg).unwrap();
        let (provider, model) = reg.resolve("stub/debate-a").unwrap();
        assert_eq!(provider.provider_id(), "stub");
        assert_eq!(model, "debate-a");
    }

    #[test]
    fn resolve_unknown_provider_errors() {
        let cfg = LlmConfig::default();
        let reg = ProviderRegistry::from_config(&cfg).unwrap();
        assert!(reg.resolve("missing/model").is_err());
    }
}

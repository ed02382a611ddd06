//! Embedder (§4.4): wraps a [`CompletionProvider`]'s `embeddings()` method
//! behind a narrower, text-only surface so analyzers don't need the full
//! completion capability just to embed a message.

use parley_domain::error::Result;
use parley_providers::{CompletionProvider, EmbeddingsRequest};
use std::sync::Arc;

/// Embeds text into fixed-dimension vectors. Deterministic for a given
/// model/version pair (the underlying provider owns that guarantee).
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub struct ProviderEmbedder {
    provider: Arc<dyn CompletionProvider>,
    model: Option<String>,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: Option<String>) -> Self {
        Self { provider, model }
    }
}

#[async_trait::async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        Ok(result.pop().unwrap_or_default())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let resp = self
            .provider
            .embeddings(EmbeddingsRequest {
                input: texts.to_vec(),
                model: self.model.clone(),
            })
            .await?;
        Ok(resp.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_domain::config::{AuthConfig, ProviderConfig, ProviderKind};
    use parley_providers::ProviderRegistry;

    fn stub_registry() -> ProviderRegistry {
        let mut cfg = parley_domain::config::LlmConfig::default();
        cfg.providers.push(ProviderConfig {
            id: "stub".into(),
            kind: ProviderKind::LocalStub,
            base_url: String::new(),
            auth: AuthConfig::default(),
            default_model: None,
        });
        ProviderRegistry::from_config(&cfg).unwrap()
    }

    #[tokio::test]
    async fn embed_returns_single_vector() {
        let registry = stub_registry();
        let provider = registry.get("stub").unwrap();
        let embedder = ProviderEmbedder::new(provider, None);
        let vector = embedder.embed("hello world").await.unwrap();
        assert!(!vector.is_empty());
    }

    #[tokio::test]
    async fn embed_batch_returns_one_vector_per_input() {
        let registry = stub_registry();
        let provider = registry.get("stub").unwrap();
        let embedder = ProviderEmbedder::new(provider, None);
        let vectors = embedder
            .embed_batch(&["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 3);
    }
}

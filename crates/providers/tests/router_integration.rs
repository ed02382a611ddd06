//! Integration tests for provider registration and model-string resolution.
//!
//! These validate the registry build-up and `"provider_id/model_name"`
//! resolution flow end to end, without requiring any external services.

use parley_domain::config::{AuthConfig, LlmConfig, ProviderConfig, ProviderKind};
use parley_providers::ProviderRegistry;

fn stub_config(id: &str) -> ProviderConfig {
    ProviderConfig {
        id: id.into(),
        kind: ProviderKind::LocalStub,
        base_url: String::new(),
        auth: AuthConfig::default(),
        default_model: None,
    }
}

#[test]
fn registry_registers_multiple_local_stub_providers() {
    let mut cfg = LlmConfig::default();
    cfg.providers.push(stub_config("pro"));
    cfg.providers.push(stub_config("con"));

    let registry = ProviderRegistry::from_config(&cfg).unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.list_providers(), vec!["con", "pro"]);
}

#[test]
fn resolve_model_spec_routes_to_correct_provider() {
    let mut cfg = LlmConfig::default();
    cfg.providers.push(stub_config("pro"));
    cfg.providers.push(stub_config("con"));

    let registry = ProviderRegistry::from_config(&cfg).unwrap();

    let (provider, model) = registry.resolve("pro/debate-model-a").unwrap();
    assert_eq!(provider.provider_id(), "pro");
    assert_eq!(model, "debate-model-a");

    let (provider, model) = registry.resolve("con/debate-model-b").unwrap();
    assert_eq!(provider.provider_id(), "con");
    assert_eq!(model, "debate-model-b");
}

#[test]
fn resolve_unregistered_provider_is_an_error() {
    let cfg = LlmConfig::default();
    let registry = ProviderRegistry::from_config(&cfg).unwrap();
    assert!(registry.resolve("ghost/some-model").is_err());
}

#[tokio::test]
async fn local_stub_provider_completes_structured_and_streaming() {
    use futures_util::StreamExt;
    use parley_domain::stream::StreamEvent;
    use parley_providers::{CompletionRequest, Message};

    let mut cfg = LlmConfig::default();
    cfg.providers.push(stub_config("judge"));
    let registry = ProviderRegistry::from_config(&cfg).unwrap();
    let (provider, _) = registry.resolve("judge/anything").unwrap();

    let req = CompletionRequest {
        messages: vec![Message::user("opening statement")],
        ..Default::default()
    };
    let mut stream = provider.stream_complete(req).await.unwrap();
    let mut got_done = false;
    while let Some(evt) = stream.next().await {
        if matches!(evt, Ok(StreamEvent::Done { .. })) {
            got_done = true;
        }
    }
    assert!(got_done);
}

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use parley_domain::config::{Config, ConfigSeverity};
use parley_gateway::cli::{Cli, Command, ConfigCommand};
use parley_gateway::runtime::{CancelMap, EventBusRegistry, OrchestratorRegistry};
use parley_gateway::state::AppState;
use parley_gateway::api;
use parley_persistence::{ConversationStore, PgStore};
use parley_providers::registry::ProviderRegistry;
use parley_quality::{ContradictionDetector, Embedder, HealthScorer, LoopDetector, ProviderEmbedder, VectorStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = parley_gateway::cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = parley_gateway::cli::load_config()?;
            let valid = parley_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = parley_gateway::cli::load_config()?;
            parley_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("parley starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Persistence ───────────────────────────────────────────────────
    let pg_store = PgStore::connect(
        &config.persistence.database_url,
        config.persistence.pool_size,
    )
    .await
    .context("connecting to Postgres")?;
    if config.persistence.migrate_on_startup {
        pg_store.migrate().await.context("running migrations")?;
        tracing::info!("database migrations applied");
    }
    let store: Arc<dyn ConversationStore> = Arc::new(pg_store);
    tracing::info!("persistence ready");

    // ── LLM providers ────────────────────────────────────────────────
    let providers = Arc::new(
        ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?,
    );
    if providers.is_empty() {
        tracing::warn!(
            "no LLM providers initialized — the gateway will run but every \
             debate turn will fail to resolve a provider"
        );
    } else {
        tracing::info!(providers = providers.len(), "LLM provider registry ready");
    }
    for err in providers.init_errors() {
        tracing::warn!(provider = %err.provider_id, error = %err.message, "provider init failed");
    }

    // ── Embedder + quality analyzers (§4.4, §4.5) ───────────────────
    // `embedder.provider` unset means text-only mode: no embeddings, no
    // contradiction detection; loop detection falls back to its
    // text-shingle fingerprint.
    let embedder: Option<Arc<dyn Embedder>> = match &config.embedder.provider {
        Some(provider_id) => match providers.get(provider_id) {
            Some(provider) => {
                tracing::info!(provider = %provider_id, "embedder ready");
                Some(Arc::new(ProviderEmbedder::new(
                    provider,
                    Some(config.embedder.model.clone()),
                )))
            }
            None => {
                tracing::warn!(
                    provider = %provider_id,
                    "embedder.provider is configured but not a known provider id; \
                     falling back to text-only mode"
                );
                None
            }
        },
        None => {
            tracing::info!("no embedder.provider configured — running in text-only mode");
            None
        }
    };

    let contradiction_detector = match (&embedder, &config.embedder.provider) {
        (Some(embedder), Some(provider_id)) => providers.get(provider_id).map(|judge| {
            Arc::new(ContradictionDetector::new(
                embedder.clone(),
                judge,
                config.quality.contradiction,
            ))
        }),
        _ => None,
    };
    tracing::info!(
        contradiction_detection = contradiction_detector.is_some(),
        "contradiction detector configured"
    );

    let loop_detector = Arc::new(LoopDetector::new(config.quality.loop_detection));
    let health_scorer = Arc::new(HealthScorer::new(config.quality.health));
    let vector_store = Arc::new(parking_lot::RwLock::new(VectorStore::new()));
    tracing::info!("quality analyzers ready");

    // ── Runtime: event buses, orchestrators, cancellation ───────────
    let event_buses = Arc::new(EventBusRegistry::new(
        config.event_bus.queue_capacity,
        config.event_bus.ring_buffer_size,
    ));
    let orchestrators = Arc::new(OrchestratorRegistry::new());
    let cancel_map = Arc::new(CancelMap::new());
    tracing::info!("runtime registries ready");

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = match std::env::var("PARLEY_API_TOKEN") {
        Ok(token) if !token.is_empty() => {
            tracing::info!("API bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!("API bearer-token auth DISABLED — set PARLEY_API_TOKEN to enable");
            None
        }
    };

    let state = AppState {
        config: config.clone(),
        providers,
        store,
        embedder,
        contradiction_detector,
        loop_detector,
        health_scorer,
        vector_store,
        event_buses,
        orchestrators,
        cancel_map,
        api_token_hash,
    };

    // ── CORS layer (config-aware) ────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Concurrency limit (backpressure protection) ────────────────
    let max_concurrent = config.server.max_concurrent_provider_streams;
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Router ───────────────────────────────────────────────────────
    let app = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "parley listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`). These are expanded into a predicate that
/// matches any port on that host. A literal `"*"` allows all origins (not
/// recommended for production).
fn build_cors_layer(cors: &parley_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            let prefix = origin.trim_end_matches('*').to_owned();
            wildcard_prefixes.push(prefix);
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

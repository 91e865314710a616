//! IntelliSecure Pipeline - Main Entry Point

use isec_threat_intel::analyst::ChatCompletionsBackend;
use isec_threat_intel::api::IntelApi;
use isec_threat_intel::collector::FeedCollector;
use isec_threat_intel::config::IntelConfig;
use isec_threat_intel::extraction::ExtractionStage;
use isec_threat_intel::matching::{spawn_match_worker, MatchingEngine};
use isec_threat_intel::orchestrator::Orchestrator;
use isec_threat_intel::rules::RuleSynthesizer;
use isec_threat_intel::sources::SourceRegistry;
use isec_threat_intel::store::IntelStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("IntelliSecure Pipeline v{}", env!("CARGO_PKG_VERSION"));

    // Load config
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "/etc/intellisecure/pipeline.json".into());

    let config = IntelConfig::load(&config_path).unwrap_or_else(|_| {
        tracing::warn!("Config not found, using defaults");
        let mut config = IntelConfig::default();
        config.apply_env_overrides();
        config
    });

    let client = config.http_client()?;
    let store = Arc::new(IntelStore::new());
    let registry = Arc::new(SourceRegistry::new(config.sources.clone()));

    let collector = Arc::new(
        FeedCollector::new(registry.clone(), store.clone(), client.clone())
            .with_per_source_limit(config.per_source_limit),
    );

    let backend = Arc::new(ChatCompletionsBackend::new(
        client,
        config.reasoning.base_url.clone(),
        config.reasoning.api_key.clone(),
        config.reasoning.model.clone(),
    ));

    let synthesizer = Arc::new(RuleSynthesizer::new(store.clone()));
    let matcher = Arc::new(MatchingEngine::new(store.clone(), synthesizer.clone()));
    let extraction = Arc::new(
        ExtractionStage::new(store.clone(), backend, matcher.clone())
            .with_batch_size(config.extraction_batch),
    );

    // Out-of-band matching for subscriber creation; the facade is what the
    // external web tier holds on to.
    let (match_tx, _worker) = spawn_match_worker(matcher, store.clone());
    let _api = IntelApi::new(store, registry, synthesizer, match_tx);

    let orchestrator = Orchestrator::new(collector, extraction, config.pacing.clone());
    orchestrator.run().await;

    Ok(())
}

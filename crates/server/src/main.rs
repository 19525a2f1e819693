//! `askd` server entry point.
//!
//! Grounded on the teacher's `main.rs` startup sequence — load config,
//! init tracing, construct singletons, bind, serve with graceful shutdown
//! — generalized from the voice-agent's ScyllaDB/VAD/TTS/STT startup to
//! this pipeline's dependencies (vector index, lexical index, embedding
//! provider, generation providers, memory store).

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use askd_config::settings::{load_settings, Settings};
use askd_core::circuit_breaker::{BreakerConfig, CircuitBreaker};
use askd_core::rate_limiter::{RateLimitConfig, RateLimiter};
use askd_core::traits::SystemClock;
use askd_llm::{ClaudeGenerator, ClaudeGeneratorConfig, OllamaGenerator, OllamaGeneratorConfig, ProviderRegistry, TaskRouter};
use askd_memory::{MemoryInjector, MemoryInjectorConfig, SqliteMemoryStore};
use askd_rag::{
    ContextBuilder, EmbeddingCache, EmbeddingCacheConfig, EmbeddingClient, HybridSearch,
    HybridSearchConfig, OllamaEmbedder, OllamaEmbeddingConfig, QueryExpander, Reranker,
    RerankerConfig, SparseConfig, SparseIndex, VectorStore, VectorStoreConfig,
};
use askd_server::orchestrator::{AskOrchestrator, AskOrchestratorConfig};
use askd_server::response_cache::{ResponseCache, ResponseCacheConfig};
use askd_server::state::AppState;
use askd_server::{create_router, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("ASKD_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => {
            eprintln!("loaded configuration (env: {})", env.as_deref().unwrap_or("default"));
            settings
        },
        Err(e) => {
            eprintln!("warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        },
    };

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting askd");
    tracing::info!(environment = ?settings.environment, "configuration loaded");

    let vector_store = Arc::new(VectorStore::new(VectorStoreConfig {
        endpoint: settings.search.vector_endpoint.clone(),
        collection: settings.search.collection.clone(),
        api_key: None,
    })?);

    if let Some(collection_dim) = vector_store.collection_dim().await? {
        if collection_dim as usize != settings.embedding.dim {
            return Err(format!(
                "embedding dimension mismatch: configured {}, collection reports {collection_dim}",
                settings.embedding.dim
            )
            .into());
        }
    }

    let sparse_index = Arc::new(SparseIndex::new(SparseConfig { index_path: None })?);

    let embedding_provider = Arc::new(OllamaEmbedder::new(OllamaEmbeddingConfig {
        endpoint: settings.embedding.endpoint.clone(),
        model: settings.embedding.model.clone(),
        dim: settings.embedding.dim,
        request_timeout_ms: askd_config::constants::timeouts::EMBEDDING_REQUEST_MS,
    })?);
    let embedding_cache = Arc::new(EmbeddingCache::new(EmbeddingCacheConfig {
        max_size: settings.embedding.cache.max_size,
        ttl_seconds: settings.embedding.cache.ttl_seconds,
    }));
    let embedding_breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_threshold: settings.breaker.failure_threshold,
        cooldown: std::time::Duration::from_secs(settings.breaker.cooldown_seconds),
    }));
    let embedding_client = Arc::new(EmbeddingClient::new(embedding_provider, embedding_cache, embedding_breaker));

    let hybrid_search = Arc::new(HybridSearch::new(
        vector_store.clone(),
        sparse_index.clone(),
        HybridSearchConfig {
            dense_weight: settings.search.dense_weight,
            lexical_weight: settings.search.lexical_weight,
            rrf_k: settings.search.rrf_k,
            k_pool_multiplier: settings.search.k_pool_multiplier,
        },
    ));

    let reranker = Arc::new(Reranker::new(RerankerConfig {
        max_per_document: settings.rerank.max_per_document,
        course_boost: settings.rerank.course_boost,
        filename_boost: settings.rerank.filename_boost,
        mmr_lambda: settings.rerank.mmr_lambda,
        mmr_enabled: settings.rerank.mmr_enabled,
        course_markers: settings.rerank.course_markers.clone(),
    }));

    let context_builder = Arc::new(ContextBuilder::default());
    let query_expander = Arc::new(QueryExpander::new(&settings.routing.intents));

    let mut registry = ProviderRegistry::new();
    let fast_breaker = CircuitBreaker::new(BreakerConfig {
        failure_threshold: settings.breaker.failure_threshold,
        cooldown: std::time::Duration::from_secs(settings.breaker.cooldown_seconds),
    });
    registry.register(Arc::new(OllamaGenerator::new(OllamaGeneratorConfig::default(), fast_breaker)?));

    if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
        let claude_breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: settings.breaker.failure_threshold,
            cooldown: std::time::Duration::from_secs(settings.breaker.cooldown_seconds),
        });
        registry.register(Arc::new(ClaudeGenerator::new(
            ClaudeGeneratorConfig {
                api_key,
                ..ClaudeGeneratorConfig::default()
            },
            claude_breaker,
        )?));
    } else {
        tracing::warn!("ANTHROPIC_API_KEY not set; the standard-tier provider is unavailable");
    }

    let task_router = Arc::new(TaskRouter::new(&settings.routing));
    let providers = Arc::new(registry);

    let memory_store = match SqliteMemoryStore::connect(&settings.memory.database_path).await {
        Ok(store) => {
            let store: Arc<dyn askd_core::traits::MemoryStore> = Arc::new(store);
            Some(store)
        },
        Err(e) => {
            tracing::warn!(error = %e, "memory store unavailable; injection will be skipped");
            None
        },
    };
    let memory_injector = memory_store.clone().map(|store| {
        Arc::new(MemoryInjector::new(
            store,
            Arc::new(SystemClock),
            MemoryInjectorConfig {
                decay_lambda_per_day: settings.memory.decay_lambda_per_day,
                trigger_threshold: settings.memory.trigger_threshold,
                top_k: settings.memory.top_k,
            },
        ))
    });

    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        max_requests: settings.rate_limit.max_requests,
        window: std::time::Duration::from_secs(settings.rate_limit.window_seconds),
    }));
    let response_cache = Arc::new(ResponseCache::new(ResponseCacheConfig {
        max_size: settings.response_cache.max_size,
        ttl_seconds: settings.response_cache.ttl_seconds,
    }));

    let orchestrator = Arc::new(AskOrchestrator::new(
        rate_limiter,
        response_cache,
        query_expander,
        embedding_client,
        hybrid_search,
        reranker,
        context_builder,
        memory_store,
        memory_injector,
        task_router,
        providers,
        AskOrchestratorConfig {
            top_k_default: settings.search.top_k_default,
            confidence_threshold_default: settings.confidence.threshold,
        },
    ));

    let settings = Arc::new(settings);
    let state = AppState::new(orchestrator, settings.clone());
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received sigterm, shutting down"),
    }
}

//! Main settings module.
//!
//! Structure (layered `config::Config` builder, `RuntimeEnvironment`,
//! per-section validation) is carried over from the teacher's
//! `config/src/settings.rs`; every field below is new-domain (ask pipeline),
//! not the teacher's voice-agent/pipeline/persistence fields.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{endpoints, rag, timeouts};
use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings, mirroring `SPEC_FULL.md` §6's configuration
/// table one section per component.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub response_cache: ResponseCacheSettings,

    #[serde(default)]
    pub breaker: BreakerSettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub rerank: RerankSettings,

    #[serde(default)]
    pub confidence: ConfidenceSettings,

    #[serde(default)]
    pub routing: RoutingSettings,

    #[serde(default)]
    pub memory: MemorySettings,

    #[serde(default)]
    pub observability: ObservabilitySettings,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_embedding()?;
        self.validate_search()?;
        self.validate_rerank()?;
        self.validate_confidence()?;
        self.validate_server()?;
        Ok(())
    }

    fn validate_embedding(&self) -> Result<(), ConfigError> {
        if self.embedding.dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.dim".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_search(&self) -> Result<(), ConfigError> {
        let s = &self.search;
        if !(0.0..=1.0).contains(&s.dense_weight) {
            return Err(ConfigError::InvalidValue {
                field: "search.dense_weight".to_string(),
                message: format!("must be between 0.0 and 1.0, got {}", s.dense_weight),
            });
        }
        if s.top_k_default == 0 {
            return Err(ConfigError::InvalidValue {
                field: "search.top_k_default".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if s.k_pool_multiplier == 0 {
            return Err(ConfigError::InvalidValue {
                field: "search.k_pool_multiplier".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if s.rrf_k <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "search.rrf_k".to_string(),
                message: format!("must be positive, got {}", s.rrf_k),
            });
        }
        Ok(())
    }

    fn validate_rerank(&self) -> Result<(), ConfigError> {
        let r = &self.rerank;
        if r.max_per_document == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rerank.max_per_document".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&r.mmr_lambda) {
            return Err(ConfigError::InvalidValue {
                field: "rerank.mmr_lambda".to_string(),
                message: format!("must be between 0.0 and 1.0, got {}", r.mmr_lambda),
            });
        }
        Ok(())
    }

    fn validate_confidence(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence.threshold) {
            return Err(ConfigError::InvalidValue {
                field: "confidence.threshold".to_string(),
                message: format!("must be between 0.0 and 1.0, got {}", self.confidence.threshold),
            });
        }
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }
        if self.environment.is_production()
            && self.server.cors_enabled
            && self.server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate callers."
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            request_timeout_seconds: default_timeout(),
        }
    }
}

/// §6 `embedding.*` — required vector dimension plus the embedding
/// provider's endpoint and its cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_dim")]
    pub dim: usize,
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub cache: EmbeddingCacheSettings,
}

fn default_embedding_dim() -> usize {
    1536
}
fn default_embedding_endpoint() -> String {
    endpoints::EMBEDDING_DEFAULT.clone()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            dim: default_embedding_dim(),
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            cache: EmbeddingCacheSettings::default(),
        }
    }
}

/// §4.1 EmbeddingCache — `embedding.cache.max_size`/`.ttl_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingCacheSettings {
    #[serde(default = "default_embedding_cache_size")]
    pub max_size: usize,
    #[serde(default = "default_embedding_cache_ttl")]
    pub ttl_seconds: u64,
}

fn default_embedding_cache_size() -> usize {
    10_000
}
fn default_embedding_cache_ttl() -> u64 {
    3600
}

impl Default for EmbeddingCacheSettings {
    fn default() -> Self {
        Self {
            max_size: default_embedding_cache_size(),
            ttl_seconds: default_embedding_cache_ttl(),
        }
    }
}

/// §4.4 ResponseCache — `response.cache.max_size`/`.ttl_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCacheSettings {
    #[serde(default = "default_response_cache_size")]
    pub max_size: usize,
    #[serde(default = "default_response_cache_ttl")]
    pub ttl_seconds: u64,
}

fn default_response_cache_size() -> usize {
    5_000
}
fn default_response_cache_ttl() -> u64 {
    600
}

impl Default for ResponseCacheSettings {
    fn default() -> Self {
        Self {
            max_size: default_response_cache_size(),
            ttl_seconds: default_response_cache_ttl(),
        }
    }
}

/// §4.2 CircuitBreaker — one instance per dependency, all sharing this
/// default config unless a dependency overrides it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

fn default_failure_threshold() -> u32 {
    rag::BREAKER_FAILURE_THRESHOLD
}
fn default_cooldown_seconds() -> u64 {
    rag::BREAKER_COOLDOWN_SECONDS
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

/// §4.3 RateLimiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

fn default_max_requests() -> usize {
    rag::RATE_LIMIT_MAX_REQUESTS
}
fn default_window_seconds() -> u64 {
    rag::RATE_LIMIT_WINDOW_SECONDS
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

/// §4.7 HybridSearch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_vector_endpoint")]
    pub vector_endpoint: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,
    #[serde(default = "default_k_pool_multiplier")]
    pub k_pool_multiplier: usize,
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f32,
    #[serde(default = "default_lex_weight")]
    pub lexical_weight: f32,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    #[serde(default = "default_vector_timeout_ms")]
    pub vector_timeout_ms: u64,
    #[serde(default = "default_lexical_timeout_ms")]
    pub lexical_timeout_ms: u64,
}

fn default_vector_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.clone()
}
fn default_collection() -> String {
    "music_production_chunks".to_string()
}
fn default_top_k() -> usize {
    rag::DEFAULT_TOP_K
}
fn default_k_pool_multiplier() -> usize {
    rag::K_POOL_MULTIPLIER
}
fn default_dense_weight() -> f32 {
    rag::RRF_DENSE_WEIGHT
}
fn default_lex_weight() -> f32 {
    rag::RRF_LEXICAL_WEIGHT
}
fn default_rrf_k() -> f32 {
    rag::RRF_K
}
fn default_vector_timeout_ms() -> u64 {
    timeouts::VECTOR_SEARCH_MS
}
fn default_lexical_timeout_ms() -> u64 {
    timeouts::LEXICAL_SEARCH_MS
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            vector_endpoint: default_vector_endpoint(),
            collection: default_collection(),
            top_k_default: default_top_k(),
            k_pool_multiplier: default_k_pool_multiplier(),
            dense_weight: default_dense_weight(),
            lexical_weight: default_lex_weight(),
            rrf_k: default_rrf_k(),
            vector_timeout_ms: default_vector_timeout_ms(),
            lexical_timeout_ms: default_lexical_timeout_ms(),
        }
    }
}

/// §4.8 Reranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankSettings {
    #[serde(default = "default_max_per_document")]
    pub max_per_document: usize,
    #[serde(default = "default_course_boost")]
    pub course_boost: f32,
    #[serde(default = "default_filename_boost")]
    pub filename_boost: f32,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
    #[serde(default = "default_mmr_enabled")]
    pub mmr_enabled: bool,
    /// Substrings of `source_path` classified "course" for the authority
    /// boost; everything else ("youtube" or unclassified) gets ×1.0.
    #[serde(default = "default_course_markers")]
    pub course_markers: Vec<String>,
}

fn default_max_per_document() -> usize {
    rag::MAX_PER_DOCUMENT
}
fn default_course_boost() -> f32 {
    rag::COURSE_BOOST
}
fn default_filename_boost() -> f32 {
    rag::FILENAME_BOOST
}
fn default_mmr_lambda() -> f32 {
    rag::MMR_LAMBDA
}
fn default_mmr_enabled() -> bool {
    true
}
fn default_course_markers() -> Vec<String> {
    vec!["/courses/".to_string(), "masterclass".to_string()]
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            max_per_document: default_max_per_document(),
            course_boost: default_course_boost(),
            filename_boost: default_filename_boost(),
            mmr_lambda: default_mmr_lambda(),
            mmr_enabled: default_mmr_enabled(),
            course_markers: default_course_markers(),
        }
    }
}

/// §4.9 ConfidenceGate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceSettings {
    #[serde(default = "default_confidence_threshold")]
    pub threshold: f32,
}

fn default_confidence_threshold() -> f32 {
    rag::CONFIDENCE_THRESHOLD
}

impl Default for ConfidenceSettings {
    fn default() -> Self {
        Self {
            threshold: default_confidence_threshold(),
        }
    }
}

/// A single ordered `(patterns, tag)` intent-detection group (§4.5) or tier
/// classification group (§4.12) — both are "ordered keyword groups, first
/// non-empty match wins" per spec, so one shape serves both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentGroup {
    pub tag: String,
    /// Whole-word patterns; compiled to `\b{keyword}\b` regex at construction.
    pub keywords: Vec<String>,
    /// Extra terms appended (deduplicated) to the query text on expansion.
    #[serde(default)]
    pub expansion_terms: Vec<String>,
    /// Filename substrings that earn the §4.8 filename boost when this
    /// intent is active.
    #[serde(default)]
    pub filename_keywords: Vec<String>,
}

/// §4.12 TaskRouter — one ordered chain of provider identifiers per tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierChain {
    pub tier: String,
    pub providers: Vec<String>,
}

/// §4.12/§6 `routing.*` — tier classification signals and fallback chains,
/// per spec §9 Open Question 2 kept as configuration, not code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Single model used for every tier when `enabled = false`.
    #[serde(default = "default_single_model")]
    pub single_model: String,
    #[serde(default = "default_intent_groups")]
    pub intents: Vec<IntentGroup>,
    #[serde(default = "default_tier_groups")]
    pub tiers: Vec<IntentGroup>,
    #[serde(default = "default_tier_chains")]
    pub chains: Vec<TierChain>,
}

fn default_single_model() -> String {
    "fast".to_string()
}

fn default_intent_groups() -> Vec<IntentGroup> {
    vec![
        IntentGroup {
            tag: "mastering".to_string(),
            keywords: vec![
                "master".to_string(),
                "mastering".to_string(),
                "loudness".to_string(),
                "limiter".to_string(),
            ],
            expansion_terms: vec![
                "true peak".to_string(),
                "LUFS".to_string(),
                "stereo width".to_string(),
            ],
            filename_keywords: vec![
                "mastering".to_string(),
                "masterclass".to_string(),
            ],
        },
        IntentGroup {
            tag: "mixing".to_string(),
            keywords: vec![
                "mix".to_string(),
                "mixing".to_string(),
                "eq".to_string(),
                "compress".to_string(),
                "compression".to_string(),
                "sidechain".to_string(),
            ],
            expansion_terms: vec![
                "gain staging".to_string(),
                "frequency masking".to_string(),
            ],
            filename_keywords: vec!["mixing".to_string(), "masterclass".to_string()],
        },
        IntentGroup {
            tag: "factual".to_string(),
            keywords: vec![
                "what is".to_string(),
                "define".to_string(),
                "what key".to_string(),
                "what bpm".to_string(),
            ],
            expansion_terms: vec![],
            filename_keywords: vec![],
        },
        IntentGroup {
            tag: "creative".to_string(),
            keywords: vec![
                "suggest".to_string(),
                "creative".to_string(),
                "inspiration".to_string(),
                "arrangement idea".to_string(),
            ],
            expansion_terms: vec!["genre conventions".to_string()],
            filename_keywords: vec![],
        },
        IntentGroup {
            tag: "realtime".to_string(),
            keywords: vec![
                "right now".to_string(),
                "currently".to_string(),
                "while i'm playing".to_string(),
                "live".to_string(),
            ],
            expansion_terms: vec![],
            filename_keywords: vec![],
        },
    ]
}

fn default_tier_groups() -> Vec<IntentGroup> {
    vec![
        IntentGroup {
            tag: "factual".to_string(),
            keywords: vec![
                "what is".to_string(),
                "define".to_string(),
                "what key".to_string(),
                "what bpm".to_string(),
                "lookup".to_string(),
            ],
            expansion_terms: vec![],
            filename_keywords: vec![],
        },
        IntentGroup {
            tag: "creative".to_string(),
            keywords: vec![
                "suggest".to_string(),
                "analyze".to_string(),
                "improve".to_string(),
                "based on my sessions".to_string(),
                "how should i".to_string(),
            ],
            expansion_terms: vec![],
            filename_keywords: vec![],
        },
        IntentGroup {
            tag: "realtime".to_string(),
            keywords: vec![
                "right now".to_string(),
                "currently".to_string(),
                "while i'm playing".to_string(),
            ],
            expansion_terms: vec![],
            filename_keywords: vec![],
        },
    ]
}

fn default_tier_chains() -> Vec<TierChain> {
    vec![
        TierChain {
            tier: "factual".to_string(),
            providers: vec!["fast".to_string(), "local".to_string(), "standard".to_string()],
        },
        TierChain {
            tier: "creative".to_string(),
            providers: vec!["standard".to_string(), "fast".to_string(), "local".to_string()],
        },
        TierChain {
            tier: "realtime".to_string(),
            providers: vec!["local".to_string(), "fast".to_string(), "standard".to_string()],
        },
    ]
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            single_model: default_single_model(),
            intents: default_intent_groups(),
            tiers: default_tier_groups(),
            chains: default_tier_chains(),
        }
    }
}

/// §4.15 MemoryStore/MemoryInjector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    #[serde(default = "default_decay_lambda")]
    pub decay_lambda_per_day: f32,
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: f32,
    #[serde(default = "default_memory_top_k")]
    pub top_k: usize,
    #[serde(default = "default_memory_db_path")]
    pub database_path: String,
}

fn default_decay_lambda() -> f32 {
    rag::MEMORY_DECAY_LAMBDA_PER_DAY
}
fn default_trigger_threshold() -> f32 {
    rag::MEMORY_TRIGGER_THRESHOLD
}
fn default_memory_top_k() -> usize {
    rag::MEMORY_TOP_K
}
fn default_memory_db_path() -> String {
    "data/memory.sqlite".to_string()
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            decay_lambda_per_day: default_decay_lambda(),
            trigger_threshold: default_trigger_threshold(),
            top_k: default_memory_top_k(),
            database_path: default_memory_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            otlp_endpoint: None,
        }
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest): `ASKD__` env vars, `config/{env}.toml`,
/// `config/default.toml`.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("ASKD")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.embedding.dim, 1536);
        assert_eq!(settings.confidence.threshold, 0.58);
    }

    #[test]
    fn test_search_validation_dense_weight() {
        let mut settings = Settings::default();
        settings.search.dense_weight = 0.5;
        assert!(settings.validate_search().is_ok());
        settings.search.dense_weight = 1.5;
        assert!(settings.validate_search().is_err());
        settings.search.dense_weight = -0.1;
        assert!(settings.validate_search().is_err());
    }

    #[test]
    fn test_rerank_validation() {
        let mut settings = Settings::default();
        settings.rerank.max_per_document = 0;
        assert!(settings.validate_rerank().is_err());
        settings.rerank.max_per_document = 1;
        settings.rerank.mmr_lambda = 1.5;
        assert!(settings.validate_rerank().is_err());
    }

    #[test]
    fn test_confidence_validation() {
        let mut settings = Settings::default();
        settings.confidence.threshold = 1.5;
        assert!(settings.validate_confidence().is_err());
        settings.confidence.threshold = 0.58;
        assert!(settings.validate_confidence().is_ok());
    }

    #[test]
    fn test_server_validation() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
    }

    #[test]
    fn test_routing_defaults_have_three_tiers() {
        let settings = Settings::default();
        assert_eq!(settings.routing.tiers.len(), 3);
        assert_eq!(settings.routing.chains.len(), 3);
        assert!(settings.routing.chains.iter().all(|c| !c.providers.is_empty()));
    }
}

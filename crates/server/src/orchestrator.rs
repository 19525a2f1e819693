//! `AskOrchestrator` — the nine-stage ask pipeline (§4.16).
//!
//! No teacher file composes this shape directly; the closest analog is the
//! teacher's `agent::Agent::process` turn loop (admit → retrieve → respond,
//! wrapped in `tracing::info_span!` per stage) which this generalizes into
//! the spec's nine explicit stages with per-stage timing and a state
//! machine for stage 9's provider fallback walk. Every external dependency
//! (`EmbeddingClient`, `HybridSearch`, `Reranker`, `MemoryStore`,
//! `Generator`) is received as an already-constructed `Arc` at
//! construction, per spec §9's "ambient singletons become explicit
//! dependencies" redesign note.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::Sender;

use askd_core::confidence::{self, ConfidenceDecision};
use askd_core::domain::{AskResponse, ResponseMode, SourceMap, SourceRef, Usage, Warning};
use askd_core::error::{Error, Result};
use askd_core::rate_limiter::{Admission, RateLimiter};
use askd_core::traits::{GenerationRequest, MemoryStore};
use askd_llm::{CitationValidator, PromptBuilder, ProviderRegistry, TaskRouter};
use askd_memory::MemoryInjector;
use askd_rag::{ContextBuilder, EmbeddingClient, HybridSearch, Reranker};

use crate::response_cache::{CacheKeyParams, ResponseCache};

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub query: String,
    pub session_id: Option<String>,
    pub top_k: Option<usize>,
    pub confidence_threshold: Option<f32>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub genre_filter: Option<String>,
    pub sub_domain_filter: Option<String>,
}

/// Streaming surface events, emitted in the order the SSE transport
/// requires (§4.13): `step* -> sources -> chunk* -> done|error`.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Step(String),
    Sources(Vec<SourceRef>),
    Chunk(String),
    Done(Box<AskResponse>),
    Error(String),
}

pub struct AskOrchestratorConfig {
    pub top_k_default: usize,
    pub confidence_threshold_default: f32,
}

pub struct AskOrchestrator {
    rate_limiter: Arc<RateLimiter>,
    response_cache: Arc<ResponseCache>,
    query_expander: Arc<askd_rag::QueryExpander>,
    embedding_client: Arc<EmbeddingClient>,
    hybrid_search: Arc<HybridSearch>,
    reranker: Arc<Reranker>,
    context_builder: Arc<ContextBuilder>,
    memory_store: Option<Arc<dyn MemoryStore>>,
    memory_injector: Option<Arc<MemoryInjector>>,
    task_router: Arc<TaskRouter>,
    providers: Arc<ProviderRegistry>,
    config: AskOrchestratorConfig,
}

impl AskOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        response_cache: Arc<ResponseCache>,
        query_expander: Arc<askd_rag::QueryExpander>,
        embedding_client: Arc<EmbeddingClient>,
        hybrid_search: Arc<HybridSearch>,
        reranker: Arc<Reranker>,
        context_builder: Arc<ContextBuilder>,
        memory_store: Option<Arc<dyn MemoryStore>>,
        memory_injector: Option<Arc<MemoryInjector>>,
        task_router: Arc<TaskRouter>,
        providers: Arc<ProviderRegistry>,
        config: AskOrchestratorConfig,
    ) -> Self {
        Self {
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
            config,
        }
    }

    pub fn memory_store(&self) -> Option<Arc<dyn MemoryStore>> {
        self.memory_store.clone()
    }

    pub fn embedding_client(&self) -> Arc<EmbeddingClient> {
        self.embedding_client.clone()
    }

    pub fn response_cache(&self) -> Arc<ResponseCache> {
        self.response_cache.clone()
    }

    /// Stage 1: RateLimiter admission. Hard-fails the whole pipeline on
    /// deny — nothing downstream runs, not even the response-cache lookup.
    fn admit(&self, session_key: &str) -> Result<()> {
        match self.rate_limiter.admit(session_key) {
            Admission::Ok => Ok(()),
            Admission::Denied { retry_after_ms } => Err(Error::RateLimited { retry_after_ms }),
        }
    }

    /// Stages 3-7: expansion through the confidence gate, shared by `/ask`,
    /// `/ask/stream`, and `/search`. Callers are responsible for stage 1
    /// (`admit`) before calling this — it is not re-checked here so a
    /// single request is never charged against the rate limiter twice.
    async fn retrieve_and_gate(&self, request: &AskRequest) -> Result<RetrievalOutcome> {
        let top_k = request.top_k.unwrap_or(self.config.top_k_default);
        let threshold = request
            .confidence_threshold
            .unwrap_or(self.config.confidence_threshold_default);

        let expanded = self.query_expander.expand(&request.query);

        let embed_start = Instant::now();
        let embedded = self.embedding_client.embed_one(&expanded.expanded_text).await?;
        let embedding_ms = embed_start.elapsed().as_millis() as u64;

        let search_start = Instant::now();
        let candidates = self
            .hybrid_search
            .search(
                &embedded.vector,
                &expanded.expanded_text,
                top_k,
                request.sub_domain_filter.as_deref(),
            )
            .await?;
        let search_ms = search_start.elapsed().as_millis() as u64;

        if candidates.is_empty() {
            return Ok(RetrievalOutcome::Refused {
                embedding_ms,
                search_ms,
                cache_hit: embedded.cache_hit,
            });
        }

        let rerank_start = Instant::now();
        let filename_keywords = self.query_expander.filename_keywords(&expanded.intent_tag);
        let reranked = self.reranker.rerank(candidates, filename_keywords, top_k);
        let rerank_ms = rerank_start.elapsed().as_millis() as u64;

        let top_score = reranked.first().map(|c| c.score).unwrap_or(0.0);
        if confidence::decide(top_score, threshold) == ConfidenceDecision::Refuse {
            return Ok(RetrievalOutcome::Refused {
                embedding_ms,
                search_ms,
                cache_hit: embedded.cache_hit,
            });
        }

        Ok(RetrievalOutcome::Allowed(Box::new(AllowedRetrieval {
            reranked,
            query_vector: embedded.vector,
            embedding_ms,
            search_ms,
            rerank_ms,
            cache_hit: embedded.cache_hit,
        })))
    }

    /// The full nine-stage pipeline, unary form.
    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse> {
        let total_start = Instant::now();
        let session_key = request.session_id.clone().unwrap_or_else(|| "anonymous".to_string());

        self.admit(&session_key)?;

        let tier = self.task_router.classify(&request.query).tier;
        let top_k = request.top_k.unwrap_or(self.config.top_k_default);
        let threshold = request
            .confidence_threshold
            .unwrap_or(self.config.confidence_threshold_default);
        let cache_key = ResponseCache::key(&CacheKeyParams {
            query: &request.query,
            top_k,
            confidence_threshold: threshold,
            genre_filter: request.genre_filter.as_deref(),
            sub_domain_filter: request.sub_domain_filter.as_deref(),
            model_tier: &tier,
        });

        if let Some(mut cached) = self.response_cache.get(&cache_key) {
            cached.usage.total_ms = total_start.elapsed().as_millis() as u64;
            cached.usage.cache_hit = true;
            return Ok(cached);
        }

        let outcome = self.retrieve_and_gate(&request).await?;

        let response = match outcome {
            RetrievalOutcome::Refused { embedding_ms, search_ms, cache_hit } => {
                self.refused_response(&tier, embedding_ms, search_ms, cache_hit, total_start)
            },
            RetrievalOutcome::Allowed(allowed) => {
                self.generate_response(&request, &tier, *allowed, total_start).await?
            },
        };

        response.check_invariants().map_err(Error::Internal)?;
        self.response_cache.put(cache_key, response.clone());
        Ok(response)
    }

    /// Streaming form. Emits `Sources` once, then `Chunk*`, then exactly one
    /// `Done` or `Error`. Stages 1-8 are identical to `ask`; only stage 9's
    /// generation call differs (uses `generate_stream`).
    pub async fn ask_stream(
        &self,
        request: AskRequest,
        cancel: tokio_util::sync::CancellationToken,
        tx: Sender<StreamEvent>,
    ) {
        let total_start = Instant::now();
        let session_key = request.session_id.clone().unwrap_or_else(|| "anonymous".to_string());

        if let Err(e) = self.admit(&session_key) {
            let _ = tx.send(StreamEvent::Error(e.to_string())).await;
            return;
        }

        let _ = tx.send(StreamEvent::Step("retrieving".to_string())).await;

        let outcome = match self.retrieve_and_gate(&request).await {
            Ok(o) => o,
            Err(e) => {
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                return;
            },
        };

        let tier = self.task_router.classify(&request.query).tier;

        let allowed = match outcome {
            RetrievalOutcome::Refused { embedding_ms, search_ms, cache_hit } => {
                let response = self.refused_response(&tier, embedding_ms, search_ms, cache_hit, total_start);
                let _ = tx.send(StreamEvent::Sources(vec![])).await;
                let _ = tx.send(StreamEvent::Done(Box::new(response))).await;
                return;
            },
            RetrievalOutcome::Allowed(allowed) => *allowed,
        };

        let (context_text, source_map) = self.context_builder.build(&allowed.reranked);
        let sources = sources_from_map(&source_map);
        let _ = tx.send(StreamEvent::Sources(sources.clone())).await;

        let memory_block = self.inject_memory(&request, &allowed.query_vector).await;
        let (system, user) = PromptBuilder::build(memory_block.block.as_deref(), &context_text, &request.query);

        let gen_request = GenerationRequest {
            system,
            user,
            temperature: request.temperature.unwrap_or(0.3),
            max_tokens: request.max_tokens.unwrap_or(1024),
        };

        let chain = self.task_router.chain_for(&tier);
        let providers = self.providers.chain_providers(&chain);

        let gen_start = Instant::now();
        let (gen_tx, mut gen_rx) = tokio::sync::mpsc::channel(64);
        let mut dispatched = false;
        let mut answer = String::new();
        let mut input_tokens = 0u32;
        let mut output_tokens = 0u32;
        let mut used_model = String::new();

        for provider in &providers {
            if cancel.is_cancelled() {
                break;
            }
            used_model = provider.identifier().to_string();
            if provider.generate_stream(&gen_request, gen_tx.clone()).await.is_err() {
                continue;
            }
            dispatched = true;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        break;
                    }
                    event = gen_rx.recv() => {
                        match event {
                            Some(askd_core::traits::GenerationEvent::Chunk(text)) => {
                                answer.push_str(&text);
                                let _ = tx.send(StreamEvent::Chunk(text)).await;
                            }
                            Some(askd_core::traits::GenerationEvent::Done { input_tokens: i, output_tokens: o }) => {
                                input_tokens = i;
                                output_tokens = o;
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            if !answer.is_empty() {
                break;
            }
        }

        let generation_ms = gen_start.elapsed().as_millis() as u64;

        let response = if dispatched && !answer.is_empty() {
            self.finalize_generated(
                &tier,
                &used_model,
                answer,
                input_tokens,
                output_tokens,
                sources,
                &allowed,
                memory_block.warning,
                generation_ms,
                total_start,
            )
        } else {
            self.degraded_response(&tier, sources, &allowed, memory_block.warning, total_start)
        };

        let _ = tx.send(StreamEvent::Done(Box::new(response))).await;
    }

    /// `/search` — stages 1-6 only, no generation.
    pub async fn search(
        &self,
        request: &AskRequest,
    ) -> Result<(Vec<askd_core::domain::RetrievedChunk>, String)> {
        let session_key = request.session_id.clone().unwrap_or_else(|| "anonymous".to_string());
        self.admit(&session_key)?;
        match self.retrieve_and_gate(request).await? {
            RetrievalOutcome::Refused { .. } => Ok((Vec::new(), "general".to_string())),
            RetrievalOutcome::Allowed(allowed) => {
                let tag = self.query_expander.expand(&request.query).intent_tag;
                Ok((allowed.reranked, tag))
            },
        }
    }

    fn refused_response(
        &self,
        tier: &str,
        embedding_ms: u64,
        search_ms: u64,
        cache_hit: bool,
        total_start: Instant,
    ) -> AskResponse {
        let mut warnings = BTreeSet::new();
        warnings.insert(Warning::InsufficientKnowledge);
        AskResponse {
            answer: "The knowledge base does not contain enough information to answer this confidently.".to_string(),
            mode: ResponseMode::Refused,
            citations: vec![],
            sources: vec![],
            usage: Usage {
                tier: tier.to_string(),
                model: String::new(),
                input_tokens: 0,
                output_tokens: 0,
                embedding_ms,
                search_ms,
                rerank_ms: 0,
                generation_ms: 0,
                total_ms: total_start.elapsed().as_millis() as u64,
                cache_hit,
            },
            warnings,
        }
    }

    async fn inject_memory(&self, request: &AskRequest, query_vector: &[f32]) -> MemoryBlock {
        let Some(session_id) = request.session_id.as_deref() else {
            return MemoryBlock { block: None, warning: None };
        };
        let Some(injector) = &self.memory_injector else {
            return MemoryBlock { block: None, warning: None };
        };
        match injector.inject(session_id, query_vector).await {
            Ok(block) => MemoryBlock { block, warning: None },
            Err(_) => MemoryBlock { block: None, warning: Some(Warning::MemoryUnavailable) },
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate_response(
        &self,
        request: &AskRequest,
        tier: &str,
        allowed: AllowedRetrieval,
        total_start: Instant,
    ) -> Result<AskResponse> {
        let (context_text, source_map) = self.context_builder.build(&allowed.reranked);
        let sources = sources_from_map(&source_map);

        let memory_block = self.inject_memory(request, &allowed.query_vector).await;
        let (system, user) = PromptBuilder::build(memory_block.block.as_deref(), &context_text, &request.query);

        let gen_request = GenerationRequest {
            system,
            user,
            temperature: request.temperature.unwrap_or(0.3),
            max_tokens: request.max_tokens.unwrap_or(1024),
        };

        let chain = self.task_router.chain_for(tier);
        let providers = self.providers.chain_providers(&chain);

        let gen_start = Instant::now();
        let mut result = None;
        for provider in &providers {
            match provider.generate(&gen_request).await {
                Ok(resp) => {
                    result = Some((provider.identifier().to_string(), resp));
                    break;
                },
                Err(_) => continue,
            }
        }
        let generation_ms = gen_start.elapsed().as_millis() as u64;

        Ok(match result {
            Some((model, resp)) => self.finalize_generated(
                tier,
                &model,
                resp.text,
                resp.input_tokens,
                resp.output_tokens,
                sources,
                &allowed,
                memory_block.warning,
                generation_ms,
                total_start,
            ),
            None => self.degraded_response(tier, sources, &allowed, memory_block.warning, total_start),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize_generated(
        &self,
        tier: &str,
        model: &str,
        answer_text: String,
        input_tokens: u32,
        output_tokens: u32,
        sources: Vec<SourceRef>,
        allowed: &AllowedRetrieval,
        memory_warning: Option<Warning>,
        generation_ms: u64,
        total_start: Instant,
    ) -> AskResponse {
        let validation = CitationValidator::validate(&answer_text, sources.len() as u32);
        let mut warnings = BTreeSet::new();
        if validation.has_invalid {
            warnings.insert(Warning::InvalidCitations);
        }
        if let Some(w) = memory_warning {
            warnings.insert(w);
        }

        AskResponse {
            answer: answer_text,
            mode: ResponseMode::Rag,
            citations: validation.citations,
            sources,
            usage: Usage {
                tier: tier.to_string(),
                model: model.to_string(),
                input_tokens,
                output_tokens,
                embedding_ms: allowed.embedding_ms,
                search_ms: allowed.search_ms,
                rerank_ms: allowed.rerank_ms,
                generation_ms,
                total_ms: total_start.elapsed().as_millis() as u64,
                cache_hit: allowed.cache_hit,
            },
            warnings,
        }
    }

    /// §8 scenario 3: the degraded answer must *start with the text of the
    /// top-ranked chunk*, i.e. a raw excerpt, not `ContextBuilder`'s
    /// numbered `"[i] (source, p.N, score)"` header blocks.
    fn degraded_response(
        &self,
        tier: &str,
        sources: Vec<SourceRef>,
        allowed: &AllowedRetrieval,
        memory_warning: Option<Warning>,
        total_start: Instant,
    ) -> AskResponse {
        let mut warnings = BTreeSet::new();
        warnings.insert(Warning::LlmUnavailable);
        if let Some(w) = memory_warning {
            warnings.insert(w);
        }

        let raw_excerpts = allowed
            .reranked
            .iter()
            .map(|c| c.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        AskResponse {
            answer: raw_excerpts,
            mode: ResponseMode::Degraded,
            citations: vec![],
            sources,
            usage: Usage {
                tier: tier.to_string(),
                model: String::new(),
                input_tokens: 0,
                output_tokens: 0,
                embedding_ms: allowed.embedding_ms,
                search_ms: allowed.search_ms,
                rerank_ms: allowed.rerank_ms,
                generation_ms: 0,
                total_ms: total_start.elapsed().as_millis() as u64,
                cache_hit: allowed.cache_hit,
            },
            warnings,
        }
    }
}

fn sources_from_map(source_map: &SourceMap) -> Vec<SourceRef> {
    source_map
        .iter()
        .map(|(index, chunk)| SourceRef {
            index: *index,
            source_name: chunk.chunk.source_name.clone(),
            source_path: chunk.chunk.source_path.clone(),
            page_number: chunk.chunk.page_number,
            score: chunk.score,
        })
        .collect()
}

struct MemoryBlock {
    block: Option<String>,
    warning: Option<Warning>,
}

struct AllowedRetrieval {
    reranked: Vec<askd_core::domain::RetrievedChunk>,
    query_vector: Vec<f32>,
    embedding_ms: u64,
    search_ms: u64,
    rerank_ms: u64,
    cache_hit: bool,
}

enum RetrievalOutcome {
    Refused { embedding_ms: u64, search_ms: u64, cache_hit: bool },
    Allowed(Box<AllowedRetrieval>),
}

//! Tier classification and provider fallback chains (§4.12).
//!
//! Grounded on `factory.rs::LlmFactory` (provider enum + `create_backend`
//! dispatch) generalized per spec §9's redesign note ("dynamic provider
//! registration becomes a small interface... registry keyed by identifier")
//! from a single-provider factory into a registry keyed by a stable string
//! id, walked in per-tier order until one `Generator` succeeds.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use askd_config::settings::{IntentGroup, RoutingSettings, TierChain};
use askd_core::error::{Error, Result};
use askd_core::traits::Generator;

struct CompiledTier {
    tag: String,
    patterns: Vec<Regex>,
}

fn compile_tiers(groups: &[IntentGroup]) -> Vec<CompiledTier> {
    groups
        .iter()
        .map(|g| CompiledTier {
            tag: g.tag.clone(),
            patterns: g
                .keywords
                .iter()
                .filter_map(|kw| {
                    let escaped = regex::escape(kw.trim());
                    if escaped.is_empty() {
                        None
                    } else {
                        Regex::new(&format!(r"(?i)\b{escaped}\b")).ok()
                    }
                })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierClassification {
    pub tier: String,
    pub confidence: f32,
}

pub struct TaskRouter {
    enabled: bool,
    single_model: String,
    tiers: Vec<CompiledTier>,
    chains: HashMap<String, Vec<String>>,
}

impl TaskRouter {
    pub fn new(settings: &RoutingSettings) -> Self {
        let chains = settings
            .chains
            .iter()
            .map(|c: &TierChain| (c.tier.clone(), c.providers.clone()))
            .collect();
        Self {
            enabled: settings.enabled,
            single_model: settings.single_model.clone(),
            tiers: compile_tiers(&settings.tiers),
            chains,
        }
    }

    /// Confidence = `n_matches / (n_matches + 1)`. Zero matches defaults to
    /// `factual`, the safest and cheapest tier.
    pub fn classify(&self, query: &str) -> TierClassification {
        if !self.enabled {
            return TierClassification { tier: "single".to_string(), confidence: 1.0 };
        }
        for tier in &self.tiers {
            let n_matches = tier.patterns.iter().filter(|re| re.is_match(query)).count();
            if n_matches > 0 {
                return TierClassification {
                    tier: tier.tag.clone(),
                    confidence: n_matches as f32 / (n_matches as f32 + 1.0),
                };
            }
        }
        TierClassification { tier: "factual".to_string(), confidence: 0.0 }
    }

    /// The ordered provider-identifier chain for a tier. When routing is
    /// disabled this is the single configured model.
    pub fn chain_for(&self, tier: &str) -> Vec<String> {
        if !self.enabled {
            return vec![self.single_model.clone()];
        }
        self.chains.get(tier).cloned().unwrap_or_default()
    }
}

/// Providers keyed by their stable identifier, as referenced in a tier's
/// fallback chain.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Generator>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    pub fn register(&mut self, provider: Arc<dyn Generator>) {
        self.providers.insert(provider.identifier().to_string(), provider);
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn Generator>> {
        self.providers.get(identifier).cloned()
    }

    /// Walks `chain` in order, skipping identifiers this registry doesn't
    /// have. Returns the first provider found, deferring the actual
    /// dispatch/breaker/retry decision to the caller (the orchestrator's
    /// stage-9 state machine).
    pub fn chain_providers(&self, chain: &[String]) -> Vec<Arc<dyn Generator>> {
        chain.iter().filter_map(|id| self.get(id)).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thin error wrapper for "chain exhausted" distinct from a single
/// provider's error, used by the orchestrator to decide on degraded mode.
pub fn chain_exhausted(tier: &str) -> Error {
    Error::LlmUnavailable(format!("all providers exhausted for tier {tier}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use askd_config::settings::RoutingSettings;

    fn settings() -> RoutingSettings {
        RoutingSettings {
            enabled: true,
            single_model: "local".to_string(),
            intents: vec![],
            tiers: vec![
                IntentGroup {
                    tag: "creative".to_string(),
                    keywords: vec!["suggest".to_string(), "improve".to_string()],
                    expansion_terms: vec![],
                    filename_keywords: vec![],
                },
                IntentGroup {
                    tag: "realtime".to_string(),
                    keywords: vec!["right now".to_string()],
                    expansion_terms: vec![],
                    filename_keywords: vec![],
                },
            ],
            chains: vec![
                TierChain { tier: "factual".to_string(), providers: vec!["fast".into(), "local".into(), "standard".into()] },
                TierChain { tier: "creative".to_string(), providers: vec!["standard".into(), "fast".into(), "local".into()] },
                TierChain { tier: "realtime".to_string(), providers: vec!["local".into(), "fast".into(), "standard".into()] },
            ],
        }
    }

    #[test]
    fn zero_matches_defaults_to_factual() {
        let router = TaskRouter::new(&settings());
        let result = router.classify("what key is this track in");
        assert_eq!(result.tier, "factual");
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn keyword_match_selects_tier_with_nonzero_confidence() {
        let router = TaskRouter::new(&settings());
        let result = router.classify("can you suggest a way to improve this mix");
        assert_eq!(result.tier, "creative");
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn disabled_routing_uses_single_model_chain() {
        let mut s = settings();
        s.enabled = false;
        let router = TaskRouter::new(&s);
        assert_eq!(router.chain_for("anything"), vec!["local".to_string()]);
    }
}

//! Generation: provider implementations, tier routing, prompt assembly,
//! and citation validation for the ask pipeline.

pub mod citation;
pub mod generator;
pub mod prompt;
pub mod router;

pub use citation::{CitationValidation, CitationValidator};
pub use generator::{ClaudeGenerator, ClaudeGeneratorConfig, OllamaGenerator, OllamaGeneratorConfig};
pub use prompt::PromptBuilder;
pub use router::{ProviderRegistry, TaskRouter, TierClassification};

//! Builds the final `(system, user)` prompt pair (§4.11).
//!
//! No teacher file builds this shape directly — the teacher's `PromptBuilder`
//! assembles a persona-driven gold-loan sales script from `PersonaConfig`.
//! Kept from it: the builder-struct idiom and the convention of keeping
//! prompt text assembly in its own module, separate from the `Generator`
//! that consumes it.

const GROUNDING_CONSTRAINT: &str = "Answer only from the provided context. If the context does not contain sufficient information, say so explicitly. Cite sources inline using [i] matching the numbered blocks.";

pub struct PromptBuilder;

impl PromptBuilder {
    /// `memory_block` is the formatted, already-decayed memory injection
    /// (§4.15) or `None` when injection was skipped or empty. `context_text`
    /// is `ContextBuilder::build`'s numbered block text. `original_query` is
    /// the user's unexpanded query — the expanded form is retrieval-only and
    /// never reaches the model.
    pub fn build(memory_block: Option<&str>, context_text: &str, original_query: &str) -> (String, String) {
        let system = GROUNDING_CONSTRAINT.to_string();

        let mut user = String::new();
        if let Some(memory) = memory_block {
            if !memory.is_empty() {
                user.push_str(memory);
                user.push_str("\n\n");
            }
        }
        user.push_str(context_text);
        user.push_str("\n\nQuestion: ");
        user.push_str(original_query);

        (system, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_carries_grounding_constraint_and_citation_instruction() {
        let (system, _) = PromptBuilder::build(None, "[1] ...", "how do I eq a kick");
        assert!(system.contains("Answer only from the provided context"));
        assert!(system.contains("[i]"));
    }

    #[test]
    fn user_prompt_uses_original_query_not_memory_when_absent() {
        let (_, user) = PromptBuilder::build(None, "[1] block one\n", "what is sidechain compression");
        assert!(user.contains("what is sidechain compression"));
        assert!(user.starts_with("[1]"));
    }

    #[test]
    fn memory_block_precedes_context_when_present() {
        let (_, user) = PromptBuilder::build(Some("Practice: likes punchy kicks\n"), "[1] block\n", "q");
        let memory_pos = user.find("Practice").unwrap();
        let context_pos = user.find("[1]").unwrap();
        assert!(memory_pos < context_pos);
    }
}

//! Refusal gate on the reranked top score (§4.9).
//!
//! No teacher file implements this — a single pure function, following the
//! crate's preference for small free functions at trait-adjacent seams (cf.
//! `rate_limiter.rs`'s `Admission` decision type).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceDecision {
    Allow,
    Refuse,
}

/// Refuses when `top_score < threshold`. Runs before generation; a refusal
/// short-circuits stages 8-9 and the boundary returns `mode = refused` with
/// `warnings = {insufficient_knowledge}`.
pub fn decide(top_score: f32, threshold: f32) -> ConfidenceDecision {
    if top_score < threshold {
        ConfidenceDecision::Refuse
    } else {
        ConfidenceDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_refuses() {
        assert_eq!(decide(0.4, 0.58), ConfidenceDecision::Refuse);
    }

    #[test]
    fn at_or_above_threshold_allows() {
        assert_eq!(decide(0.58, 0.58), ConfidenceDecision::Allow);
        assert_eq!(decide(0.9, 0.58), ConfidenceDecision::Allow);
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

/// A pluggable novelty check: decides whether a candidate answer is
/// different enough from the existing pool to accept. `threshold` is a
/// knob, not a hard-coded function, so alternative metrics can be swapped
/// in without touching the Orchestrator.
pub trait NoveltyMetric: Send + Sync {
    /// True if `candidate` is novel enough relative to `existing` answers'
    /// token sets, given `threshold`.
    fn is_novel(&self, candidate: &HashSet<String>, existing: &[HashSet<String>], threshold: f32) -> bool;
}

/// Normalized-token Jaccard similarity against the union of all existing
/// answers' tokens.
pub struct TokenOverlapMetric;

impl NoveltyMetric for TokenOverlapMetric {
    fn is_novel(
        &self,
        candidate: &HashSet<String>,
        existing: &[HashSet<String>],
        threshold: f32,
    ) -> bool {
        if threshold.is_infinite() || existing.is_empty() {
            return true;
        }
        let union: HashSet<&String> = existing.iter().flatten().collect();
        if union.is_empty() {
            return true;
        }
        let intersection = candidate.iter().filter(|t| union.contains(t)).count();
        let union_size = union.len() + candidate.iter().filter(|t| !union.contains(t)).count();
        if union_size == 0 {
            return true;
        }
        let similarity = intersection as f32 / union_size as f32;
        similarity <= threshold
    }
}

/// Lowercase whitespace tokenization used to build a `token_overlap_fingerprint`.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_threshold_always_accepts() {
        let metric = TokenOverlapMetric;
        let candidate = tokenize("the answer is forty two");
        let existing = vec![tokenize("the answer is forty two")];
        assert!(metric.is_novel(&candidate, &existing, f32::INFINITY));
    }

    #[test]
    fn identical_answer_is_rejected_under_strict_threshold() {
        let metric = TokenOverlapMetric;
        let candidate = tokenize("the answer is forty two");
        let existing = vec![tokenize("the answer is forty two")];
        assert!(!metric.is_novel(&candidate, &existing, 0.50));
    }

    #[test]
    fn very_different_answer_is_accepted() {
        let metric = TokenOverlapMetric;
        let candidate = tokenize("completely unrelated text about cats");
        let existing = vec![tokenize("the answer is forty two")];
        assert!(metric.is_novel(&candidate, &existing, 0.50));
    }

    #[test]
    fn no_existing_answers_is_always_novel() {
        let metric = TokenOverlapMetric;
        let candidate = tokenize("first answer");
        assert!(metric.is_novel(&candidate, &[], 0.50));
    }

    #[test]
    fn tokenize_strips_punctuation_and_lowercases() {
        let tokens = tokenize("Hello, World!");
        assert!(tokens.contains("hello"));
        assert!(tokens.contains("world"));
    }
}

//! Near-duplicate rejection for generated stems.
//!
//! Candidates are compared against the owning set's full stem history and
//! against stems already accepted earlier in the same generation batch, so
//! admission is sequential within one round.

use std::collections::HashSet;

pub const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Normalized token set: lowercase, punctuation stripped, tokens longer
/// than two characters.
pub fn token_set(stem: &str) -> HashSet<String> {
    stem.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|token| token.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

pub struct NoveltyFilter {
    seen: Vec<(String, HashSet<String>)>,
}

impl NoveltyFilter {
    pub fn new() -> Self {
        Self { seen: Vec::new() }
    }

    pub fn with_history<'a, I>(stems: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut filter = Self::new();
        for stem in stems {
            filter.remember(stem);
        }
        filter
    }

    /// Accepts a stem into the batch, or rejects it as a near-duplicate.
    /// Accepted stems join the comparison pool for later candidates.
    pub fn admit(&mut self, stem: &str) -> bool {
        let normalized = stem.trim().to_lowercase();
        // Exact full-string match is a cheap pre-check before Jaccard.
        if self.seen.iter().any(|(existing, _)| *existing == normalized) {
            return false;
        }
        let tokens = token_set(stem);
        if self
            .seen
            .iter()
            .any(|(_, existing)| jaccard(&tokens, existing) >= SIMILARITY_THRESHOLD)
        {
            return false;
        }
        self.seen.push((normalized, tokens));
        true
    }

    fn remember(&mut self, stem: &str) {
        let normalized = stem.trim().to_lowercase();
        let tokens = token_set(stem);
        self.seen.push((normalized, tokens));
    }
}

impl Default for NoveltyFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_lowercases_strips_punctuation_and_short_tokens() {
        let tokens = token_set("The quick, brown FOX? It is!");
        assert!(tokens.contains("the"));
        assert!(tokens.contains("quick"));
        assert!(tokens.contains("brown"));
        assert!(tokens.contains("fox"));
        assert!(!tokens.contains("it"));
        assert!(!tokens.contains("is"));
    }

    #[test]
    fn overlapping_stems_are_rejected() {
        // {the,quick,brown,fox} vs {the,quick,brown,dog}: 3/5 = 0.6 >= 0.5.
        let mut filter = NoveltyFilter::new();
        assert!(filter.admit("the quick brown fox"));
        assert!(!filter.admit("the quick brown dog"));
    }

    #[test]
    fn dissimilar_stems_are_both_accepted() {
        // {the,cat} vs {the,quick,brown,fox}: 1/5 = 0.2 < 0.5.
        let mut filter = NoveltyFilter::new();
        assert!(filter.admit("the quick brown fox"));
        assert!(filter.admit("the cat"));
    }

    #[test]
    fn exact_duplicates_are_rejected_case_insensitively() {
        let mut filter = NoveltyFilter::new();
        assert!(filter.admit("What is ATP?"));
        assert!(!filter.admit("what is atp?"));
    }

    #[test]
    fn history_counts_against_new_candidates() {
        let history = ["the quick brown fox"];
        let mut filter = NoveltyFilter::with_history(history.iter().copied());
        assert!(!filter.admit("the quick brown dog"));
        assert!(filter.admit("completely unrelated physics question"));
    }

    #[test]
    fn jaccard_of_disjoint_empty_sets_is_zero() {
        let a = token_set("a b");
        let b = token_set("c d");
        assert_eq!(jaccard(&a, &b), 0.0);
    }
}

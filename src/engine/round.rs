//! Due-set assembly helpers: bounded backfill retry policy, generation
//! request construction, and topic assignment for accepted candidates.

use crate::engine::mastery::DEFAULT_TOPIC_DIFFICULTY;
use crate::engine::types::AssessmentSet;
use crate::services::generator::GenerationRequest;

/// Escalation added to each topic target so generation keeps nudging the
/// learner toward slightly harder content.
const TOPIC_TARGET_STEP: f64 = 0.10;

/// Cap on the avoid-list sample embedded in a generation prompt.
const MAX_AVOID_STEMS: usize = 20;

/// Bounded retry for backfill generation. The initial attempt plus
/// `max_extra_attempts` retries, each with a larger over-ask multiplier,
/// guarantees the duplicate-rejection loop terminates.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_extra_attempts: usize,
    pub base_multiplier: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_extra_attempts: 2, base_multiplier: 2 }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_extra_attempts: env_usize("BACKFILL_MAX_RETRIES").unwrap_or(defaults.max_extra_attempts),
            base_multiplier: env_usize("BACKFILL_OVER_ASK_MULTIPLIER").unwrap_or(defaults.base_multiplier),
        }
    }

    pub fn multiplier_for(&self, attempt: usize) -> usize {
        self.base_multiplier + attempt
    }
}

/// Over-ask to absorb duplicate rejection: `max(m * need, need + 2)`.
pub fn over_ask(need: usize, multiplier: usize) -> usize {
    (multiplier * need).max(need + 2)
}

/// Builds the backfill request from the set's retained source content, its
/// known topics with escalated difficulty targets, and a bounded sample of
/// prior stems to avoid.
pub fn build_generation_request(
    set: &AssessmentSet,
    count: usize,
    history_stems: &[String],
    strict: bool,
) -> GenerationRequest {
    let mut topic_hints: Vec<String> = set.topic_difficulty.keys().cloned().collect();
    topic_hints.sort();

    let difficulty_targets: Vec<(String, f64)> = topic_hints
        .iter()
        .filter_map(|topic| {
            let current = *set
                .topic_difficulty
                .get(topic)
                .unwrap_or(&DEFAULT_TOPIC_DIFFICULTY);
            // Stored difficulty can dip below zero on repeated misses;
            // prompts always see a non-negative target.
            (current != 0.0).then(|| (topic.clone(), current.max(0.0) + TOPIC_TARGET_STEP))
        })
        .collect();

    let avoid_stems: Vec<String> = history_stems.iter().take(MAX_AVOID_STEMS).cloned().collect();

    GenerationRequest {
        content: set.source_content.clone(),
        count,
        topic_hints,
        difficulty_targets,
        avoid_stems,
        strict,
    }
}

/// Topic for a newly accepted stem: first requested topic appearing as a
/// substring of the stem (case-insensitive), else round-robin over the
/// requested list.
pub fn assign_topic(stem: &str, topics: &[String], round_robin: &mut usize) -> Option<String> {
    if topics.is_empty() {
        return None;
    }
    let stem_lower = stem.to_lowercase();
    if let Some(matched) = topics
        .iter()
        .find(|topic| stem_lower.contains(&topic.to_lowercase()))
    {
        return Some(matched.clone());
    }
    let assigned = topics[*round_robin % topics.len()].clone();
    *round_robin += 1;
    Some(assigned)
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.trim().parse().ok()
}

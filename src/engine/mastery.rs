//! Per-item mastery, running confidence average, and per-topic difficulty.
//!
//! Mastery is reinforced by streak consistency, self-reported confidence
//! and the contextual difficulty of the topic; it never decreases on this
//! path. Decay, if wanted, is a caller policy.

use crate::engine::types::{AssessmentItem, MAX_SCALE};

pub const DEFAULT_TOPIC_DIFFICULTY: f64 = 1.0;

const STREAK_WEIGHT: f64 = 0.5;
const CONFIDENCE_WEIGHT: f64 = 0.3;
const DIFFICULTY_WEIGHT: f64 = 0.2;
const DIFFICULTY_RAISE_FACTOR: f64 = 0.3;
const DIFFICULTY_DROP: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceUpdate {
    /// Rounded-to-integer value persisted on the item.
    pub stored: f64,
    /// Unrounded value consumed by the same cycle's mastery computation.
    pub unrounded: f64,
}

/// Running average over learner self-reports. `times_seen` already counts
/// the submission carrying `sample`. A previous sentinel (-1) restarts the
/// average at the new sample.
pub fn update_confidence(previous: f64, times_seen: i64, sample: f64) -> ConfidenceUpdate {
    let sample = sample.clamp(0.0, MAX_SCALE);
    let unrounded = if times_seen <= 1 || previous < 0.0 {
        sample
    } else {
        let average = ((times_seen - 1) as f64 * previous + sample) / times_seen as f64;
        average.max(0.0)
    }
    .clamp(0.0, MAX_SCALE);

    ConfidenceUpdate {
        stored: unrounded.round(),
        unrounded,
    }
}

pub fn mastery_delta(correct_streak: i64, max_streak: i64, confidence: f64, topic_difficulty: f64) -> f64 {
    let streak_ratio = correct_streak as f64 / max_streak.max(1) as f64;
    let confidence_norm = confidence / MAX_SCALE;
    let difficulty_norm = topic_difficulty.clamp(0.0, MAX_SCALE);
    STREAK_WEIGHT * streak_ratio + CONFIDENCE_WEIGHT * confidence_norm + DIFFICULTY_WEIGHT * difficulty_norm
}

/// Applies the mastery reinforcement for one confidence-carrying answer.
/// No-op until the item has completed at least one correct streak.
pub fn apply_mastery(item: &mut AssessmentItem, confidence: f64, topic_difficulty: f64) {
    if item.max_streak == 0 {
        return;
    }
    let delta = mastery_delta(item.correct_streak, item.max_streak, confidence, topic_difficulty);
    item.mastery = (item.mastery + delta).min(MAX_SCALE);
}

/// Correct + confidence: nudge the topic harder, capped at the scale top.
pub fn raise_topic_difficulty(current: f64, confidence: f64) -> f64 {
    (current + DIFFICULTY_RAISE_FACTOR * (confidence / MAX_SCALE)).min(MAX_SCALE)
}

/// Incorrect: ease the topic. No floor here; readers clamp to >= 0 when
/// deriving generation targets.
pub fn lower_topic_difficulty(current: f64) -> f64 {
    current - DIFFICULTY_DROP
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::normalize::NormalizedQuestion;
    use chrono::{TimeZone, Utc};

    fn item_with_streak(correct_streak: i64, max_streak: i64) -> AssessmentItem {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut item = AssessmentItem::from_question(
            "set-1",
            1,
            NormalizedQuestion {
                stem: "stem".to_string(),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_index: 0,
                topic: None,
            },
            None,
            created,
        );
        item.correct_streak = correct_streak;
        item.max_streak = max_streak;
        item
    }

    #[test]
    fn first_sample_becomes_the_average() {
        let update = update_confidence(-1.0, 1, 4.0);
        assert!((update.unrounded - 4.0).abs() < f64::EPSILON);
        assert_eq!(update.stored, 4.0);
    }

    #[test]
    fn running_average_weights_history_by_times_seen() {
        // Two prior samples averaging 3.0, third sample 5.0 -> 11/3.
        let update = update_confidence(3.0, 3, 5.0);
        assert!((update.unrounded - 11.0 / 3.0).abs() < 1e-9);
        assert_eq!(update.stored, 4.0);
    }

    #[test]
    fn out_of_range_samples_are_clamped_not_rejected() {
        assert_eq!(update_confidence(-1.0, 1, 9.0).stored, 5.0);
        assert_eq!(update_confidence(-1.0, 1, -2.0).stored, 0.0);
    }

    #[test]
    fn sentinel_history_restarts_the_average() {
        let update = update_confidence(-1.0, 4, 2.0);
        assert!((update.unrounded - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mastery_needs_a_completed_streak() {
        let mut item = item_with_streak(0, 0);
        apply_mastery(&mut item, 5.0, DEFAULT_TOPIC_DIFFICULTY);
        assert_eq!(item.mastery, 0.0);
    }

    #[test]
    fn mastery_accrues_the_weighted_delta() {
        let mut item = item_with_streak(2, 4);
        apply_mastery(&mut item, 5.0, DEFAULT_TOPIC_DIFFICULTY);
        // 0.5*0.5 + 0.3*1.0 + 0.2*1.0 = 0.75
        assert!((item.mastery - 0.75).abs() < 1e-9);
    }

    #[test]
    fn mastery_never_exceeds_the_scale_top() {
        let mut item = item_with_streak(5, 5);
        for _ in 0..100 {
            apply_mastery(&mut item, 5.0, MAX_SCALE);
        }
        assert!(item.mastery <= MAX_SCALE);
    }

    #[test]
    fn topic_difficulty_rises_with_confidence_and_caps() {
        let raised = raise_topic_difficulty(1.0, 5.0);
        assert!((raised - 1.3).abs() < 1e-9);
        assert_eq!(raise_topic_difficulty(4.95, 5.0), MAX_SCALE);
    }

    #[test]
    fn topic_difficulty_drops_without_a_floor() {
        assert!((lower_topic_difficulty(0.1) + 0.1).abs() < 1e-9);
    }
}

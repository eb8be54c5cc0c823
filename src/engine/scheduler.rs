//! Streak-based review scheduling.
//!
//! Intervals scale linearly with the correct streak (10 minutes per streak
//! step) rather than exponentially, keeping schedules predictable and
//! overflow-safe at the counts involved.

use chrono::{DateTime, Duration, Utc};

use crate::engine::types::AssessmentItem;

pub const REVIEW_STEP_MINUTES: i64 = 10;

/// Correct answer: advance the streak and push the next review out by
/// `10 minutes * streak`.
pub fn apply_correct(item: &mut AssessmentItem, now: DateTime<Utc>) {
    let streak = item.correct_streak + 1;
    item.correct_streak = streak;
    item.max_streak = item.max_streak.max(streak);
    item.interval_minutes = REVIEW_STEP_MINUTES * streak;
    item.last_reviewed = Some(now);
    item.next_review = Some(now + Duration::minutes(item.interval_minutes));
}

/// Incorrect answer: reset the streak. A never-scheduled item becomes due
/// immediately; an already-scheduled item keeps its existing slot so a
/// repeat miss is not penalized twice.
pub fn apply_incorrect(item: &mut AssessmentItem, now: DateTime<Utc>) {
    item.correct_streak = 0;
    item.last_reviewed = Some(now);
    if item.next_review.is_none() {
        item.next_review = Some(now);
    }
}

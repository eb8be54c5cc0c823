use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::normalize::NormalizedQuestion;

/// Stored confidence value meaning "answered incorrectly, no self-report yet".
pub const CONFIDENCE_SENTINEL: f64 = -1.0;

/// Upper bound shared by mastery, confidence and topic difficulty.
pub const MAX_SCALE: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentItem {
    pub id: String,
    pub set_id: String,
    /// Lifetime 1-based creation order within the owning set.
    pub question_number: i64,
    pub stem: String,
    /// Exactly 4 entries once normalized.
    pub options: Vec<String>,
    pub correct_index: usize,
    pub topic: Option<String>,
    /// Last submitted answer text; a non-empty value marks the item answered.
    pub user_answer: Option<String>,
    /// True once the item has ever been answered correctly.
    pub is_correct: bool,
    pub times_seen: i64,
    pub times_correct: i64,
    pub correct_streak: i64,
    pub max_streak: i64,
    /// Running self-report average in [0,5], or the -1 sentinel.
    pub confidence: f64,
    /// Monotone non-decreasing competence score in [0,5].
    pub mastery: f64,
    /// One counter per option, same order as `options`.
    pub option_selection_counts: Vec<i64>,
    pub interval_minutes: i64,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_review: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AssessmentItem {
    /// `fallback_topic` applies only when the question carries no label of
    /// its own.
    pub fn from_question(
        set_id: &str,
        question_number: i64,
        question: NormalizedQuestion,
        fallback_topic: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            set_id: set_id.to_string(),
            question_number,
            stem: question.stem,
            options: question.options,
            correct_index: question.correct_index,
            topic: question.topic.or(fallback_topic),
            user_answer: None,
            is_correct: false,
            times_seen: 0,
            times_correct: 0,
            correct_streak: 0,
            max_streak: 0,
            confidence: CONFIDENCE_SENTINEL,
            mastery: 0.0,
            option_selection_counts: vec![0; 4],
            interval_minutes: crate::engine::scheduler::REVIEW_STEP_MINUTES,
            last_reviewed: None,
            next_review: None,
            created_at,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.user_answer
            .as_deref()
            .is_some_and(|answer| !answer.trim().is_empty())
    }

    pub fn correct_option(&self) -> Option<&str> {
        self.options.get(self.correct_index).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSet {
    pub id: String,
    pub title: String,
    /// Canonical round size; fixed at creation, never exceeded by any round.
    pub original_count: i64,
    /// Retained so backfill generation keeps its source context.
    pub source_content: String,
    /// Per-set adaptive difficulty per topic label, default 1.0 on first use.
    pub topic_difficulty: HashMap<String, f64>,
    /// Count of items answered correctly at least once.
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

impl AssessmentSet {
    pub fn new(title: &str, original_count: i64, source_content: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            original_count,
            source_content: source_content.to_string(),
            topic_difficulty: HashMap::new(),
            score: 0,
            created_at,
        }
    }
}

/// Cross-set rollup, matched by case-insensitive title.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub average_difficulty: f64,
    pub difficulty_sum: f64,
    pub difficulty_count: i64,
}

impl Topic {
    pub fn new(title: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            average_difficulty: 0.0,
            difficulty_sum: 0.0,
            difficulty_count: 0,
        }
    }

    pub fn record_difficulty(&mut self, difficulty: f64) {
        self.difficulty_sum += difficulty;
        self.difficulty_count += 1;
        self.average_difficulty = self.difficulty_sum / self.difficulty_count as f64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizSize {
    Small,
    Medium,
    Large,
    Comprehensive,
}

impl Default for QuizSize {
    fn default() -> Self {
        Self::Small
    }
}

impl QuizSize {
    pub fn question_count(self) -> usize {
        match self {
            Self::Small => 8,
            Self::Medium => 12,
            Self::Large => 25,
            Self::Comprehensive => 50,
        }
    }

    /// Minimum summary size (estimated tokens) required to generate this quiz.
    pub fn min_summary_tokens(self) -> usize {
        match self {
            Self::Small => 200,
            Self::Medium => 600,
            Self::Large => 3000,
            Self::Comprehensive => 8000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Comprehensive => "comprehensive",
        }
    }
}

/// Rough heuristic used by the summary gate: ~4 characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub correct: bool,
    pub score_incremented: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundEntry {
    /// 1-based sequence local to this round, not the lifetime question number.
    pub sequence: i64,
    pub item: AssessmentItem,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub entries: Vec<RoundEntry>,
    /// Items answered correctly so far, as accumulated on the owning set.
    pub score: i64,
    /// Always the set's fixed `original_count`.
    pub total: i64,
    /// 1-based index of the first unanswered original item, 0 once complete.
    pub next_unanswered_index: i64,
}

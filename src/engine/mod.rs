//! Adaptive assessment and spaced-repetition mastery engine.
//!
//! The engine owns the full answer pipeline (record, model, schedule) and
//! round assembly, against injected store and generator collaborators.
//! Mutations are serialized per assessment set; generator calls never run
//! while the set lock is held.

pub mod mastery;
pub mod normalize;
pub mod novelty;
pub mod round;
pub mod scheduler;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{AssessmentStore, StoreError};
use crate::services::generator::{GeneratorError, ItemGenerator};

use mastery::DEFAULT_TOPIC_DIFFICULTY;
use normalize::{normalize_candidate, NormalizedQuestion};
use novelty::NoveltyFilter;
use round::{assign_topic, build_generation_request, over_ask, RetryPolicy};
use types::{
    AnswerOutcome, AssessmentItem, AssessmentSet, QuizSize, Round, RoundEntry, Topic,
    estimate_tokens, CONFIDENCE_SENTINEL,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("assessment set not found")]
    SetNotFound,
    #[error("assessment item not found")]
    ItemNotFound,
    #[error("{0}")]
    Validation(String),
    #[error("question generation failed: {0}")]
    Generation(#[from] GeneratorError),
    #[error("question generation returned no valid questions")]
    EmptyGeneration,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub struct AssessmentEngine {
    store: Arc<dyn AssessmentStore>,
    generator: Arc<dyn ItemGenerator>,
    retry: RetryPolicy,
    set_locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AssessmentEngine {
    pub fn new(
        store: Arc<dyn AssessmentStore>,
        generator: Arc<dyn ItemGenerator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            generator,
            retry,
            set_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Per-set serialization point: set-level score and topic difficulty
    /// must not race across concurrent submissions for the same set.
    /// Entries no task holds anymore are evicted on the way in, keeping the
    /// map bounded by the number of sets currently in flight.
    fn set_lock(&self, set_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.set_locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry(set_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    #[cfg(test)]
    fn set_lock_count(&self) -> usize {
        self.set_locks.lock().len()
    }

    /// Creates a set from a content summary: generate, normalize, dedup
    /// within the batch, and fix `original_count` at the accepted count.
    pub async fn create_set(
        &self,
        title: &str,
        summary: &str,
        size: QuizSize,
    ) -> Result<(AssessmentSet, Vec<AssessmentItem>), EngineError> {
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(EngineError::Validation("missing summary".to_string()));
        }
        let tokens = estimate_tokens(summary);
        let floor = size.min_summary_tokens();
        if tokens < floor {
            return Err(EngineError::Validation(format!(
                "summary too short for '{}' quiz (need >= {floor} tokens, have ~{tokens})",
                size.as_str()
            )));
        }

        let count = size.question_count();
        let now = Utc::now();
        let set = AssessmentSet::new(title, 0, summary, now);

        let mut accepted = self.generate_batch(&set, count, &[], false).await?;
        if accepted.is_empty() {
            // One stricter retry before giving up, the model sometimes
            // wraps its first response in prose.
            accepted = self.generate_batch(&set, count, &[], true).await?;
        }
        if accepted.is_empty() {
            return Err(EngineError::EmptyGeneration);
        }

        let mut set = set;
        set.original_count = accepted.len() as i64;

        let items: Vec<AssessmentItem> = accepted
            .into_iter()
            .enumerate()
            .map(|(index, question)| {
                AssessmentItem::from_question(&set.id, index as i64 + 1, question, None, now)
            })
            .collect();

        self.store.insert_set(&set).await?;
        self.store.insert_items(&items).await?;
        debug!(set_id = %set.id, count = items.len(), "assessment set created");
        Ok((set, items))
    }

    /// Records a submitted answer and runs the downstream model updates.
    /// The recorded answer itself is never rolled back by a later modeling
    /// or rollup failure.
    pub async fn submit_answer(
        &self,
        item_id: &str,
        answer_text: &str,
        confidence: Option<f64>,
    ) -> Result<AnswerOutcome, EngineError> {
        let preview = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(EngineError::ItemNotFound)?;

        let lock = self.set_lock(&preview.set_id);
        let _guard = lock.lock().await;

        let mut item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(EngineError::ItemNotFound)?;
        let mut set = self
            .store
            .get_set(&item.set_id)
            .await?
            .ok_or(EngineError::SetNotFound)?;

        let now = Utc::now();
        let correct = item.correct_option().is_some_and(|option| option == answer_text);

        item.times_seen += 1;
        if correct {
            item.times_correct += 1;
        }
        if let Some(index) = item.options.iter().position(|option| option == answer_text) {
            if let Some(count) = item.option_selection_counts.get_mut(index) {
                *count += 1;
            }
        }
        item.user_answer = Some(answer_text.to_string());

        let mut score_incremented = false;
        if correct && !item.is_correct {
            item.is_correct = true;
            set.score += 1;
            score_incremented = true;
        }

        if correct {
            scheduler::apply_correct(&mut item, now);
        } else {
            scheduler::apply_incorrect(&mut item, now);
        }

        // The unrounded running average feeds this cycle's mastery and
        // difficulty updates; the rounded value is what gets stored.
        let confidence_unrounded = match confidence {
            Some(sample) => {
                let update = mastery::update_confidence(item.confidence, item.times_seen, sample);
                item.confidence = update.stored;
                Some(update.unrounded)
            }
            None => {
                if !correct {
                    item.confidence = CONFIDENCE_SENTINEL;
                }
                None
            }
        };

        if let Some(unrounded) = confidence_unrounded {
            let topic_difficulty = item
                .topic
                .as_deref()
                .map(|topic| {
                    *set.topic_difficulty
                        .get(topic)
                        .unwrap_or(&DEFAULT_TOPIC_DIFFICULTY)
                })
                .unwrap_or(DEFAULT_TOPIC_DIFFICULTY);
            mastery::apply_mastery(&mut item, unrounded, topic_difficulty);
        }

        let mut rollup_difficulty: Option<(String, f64)> = None;
        if let Some(topic) = item.topic.clone() {
            let current = *set
                .topic_difficulty
                .get(&topic)
                .unwrap_or(&DEFAULT_TOPIC_DIFFICULTY);
            if correct {
                if let Some(unrounded) = confidence_unrounded {
                    let next = mastery::raise_topic_difficulty(current, unrounded);
                    set.topic_difficulty.insert(topic.clone(), next);
                    rollup_difficulty = Some((topic, next));
                } else {
                    set.topic_difficulty.entry(topic).or_insert(DEFAULT_TOPIC_DIFFICULTY);
                }
            } else {
                set.topic_difficulty
                    .insert(topic, mastery::lower_topic_difficulty(current));
            }
        }

        self.store.update_item(&item).await?;
        self.store.update_set(&set).await?;

        // Opportunistic cross-set rollup: failures are logged, never
        // surfaced, the answer is already durably recorded.
        if let Some((topic, difficulty)) = rollup_difficulty {
            if let Err(err) = self.update_topic_rollup(&topic, difficulty).await {
                warn!(error = %err, topic, "topic rollup update failed");
            }
        }

        Ok(AnswerOutcome { correct, score_incremented })
    }

    /// Serves a practice round. While the set's original block is still
    /// unanswered, rounds are the block in creation order; afterwards the
    /// due set is assembled and backfilled from the generator when short.
    pub async fn get_round(&self, set_id: &str) -> Result<Round, EngineError> {
        let lock = self.set_lock(set_id);
        let guard = lock.lock().await;

        let set = self
            .store
            .get_set(set_id)
            .await?
            .ok_or(EngineError::SetNotFound)?;
        let items = self.store.items_for_set(set_id).await?;

        let original: Vec<&AssessmentItem> = items
            .iter()
            .filter(|item| item.question_number <= set.original_count)
            .collect();
        let next_unanswered = original
            .iter()
            .find(|item| !item.is_answered())
            .map(|item| item.question_number)
            .unwrap_or(0);

        if next_unanswered != 0 {
            let entries = to_entries(original.into_iter().cloned().collect());
            return Ok(Round {
                entries,
                score: set.score,
                total: set.original_count,
                next_unanswered_index: next_unanswered,
            });
        }

        // Practice mode: everything original has been answered at least once.
        let now = Utc::now();
        let due = self.store.due_items(set_id, now, set.original_count).await?;
        let need = (set.original_count as usize).saturating_sub(due.len());

        if need == 0 {
            return Ok(Round {
                entries: to_entries(due),
                score: set.score,
                total: set.original_count,
                next_unanswered_index: 0,
            });
        }

        let history: Vec<String> = items.iter().map(|item| item.stem.clone()).collect();
        // The generator round-trip must not run under the set lock.
        drop(guard);
        let generated = self.backfill_candidates(&set, need, &history).await;

        let _guard = lock.lock().await;
        let set = self
            .store
            .get_set(set_id)
            .await?
            .ok_or(EngineError::SetNotFound)?;
        if !generated.is_empty() {
            self.insert_backfill(&set, generated).await?;
        }

        let due = self
            .store
            .due_items(set_id, Utc::now(), set.original_count)
            .await?;
        Ok(Round {
            entries: to_entries(due),
            score: set.score,
            total: set.original_count,
            next_unanswered_index: 0,
        })
    }

    /// Clears the set's score accumulator only; scheduling state is kept.
    pub async fn reset_round(&self, set_id: &str) -> Result<(), EngineError> {
        let lock = self.set_lock(set_id);
        let _guard = lock.lock().await;

        let mut set = self
            .store
            .get_set(set_id)
            .await?
            .ok_or(EngineError::SetNotFound)?;
        set.score = 0;
        self.store.update_set(&set).await?;
        Ok(())
    }

    /// One generation round: ask, normalize, novelty-filter, cap at `count`.
    async fn generate_batch(
        &self,
        set: &AssessmentSet,
        count: usize,
        history_stems: &[String],
        strict: bool,
    ) -> Result<Vec<NormalizedQuestion>, EngineError> {
        let request = build_generation_request(set, count, history_stems, strict);
        let candidates = self.generator.generate(&request).await?;

        let mut filter = NoveltyFilter::with_history(history_stems.iter().map(String::as_str));
        let mut accepted = Vec::new();
        for raw in &candidates {
            let Some(question) = normalize_candidate(raw) else { continue };
            if !filter.admit(&question.stem) {
                continue;
            }
            accepted.push(question);
            if accepted.len() >= count {
                break;
            }
        }
        Ok(accepted)
    }

    /// Bounded backfill loop. Generator failures inside an attempt are
    /// logged and degrade to a shorter due set; nothing is surfaced.
    async fn backfill_candidates(
        &self,
        set: &AssessmentSet,
        need: usize,
        history: &[String],
    ) -> Vec<NormalizedQuestion> {
        let mut filter = NoveltyFilter::with_history(history.iter().map(String::as_str));
        let mut accepted: Vec<NormalizedQuestion> = Vec::new();

        for attempt in 0..=self.retry.max_extra_attempts {
            let remaining = need - accepted.len();
            let ask = over_ask(remaining, self.retry.multiplier_for(attempt));
            let request = build_generation_request(set, ask, history, attempt > 0);

            match self.generator.generate(&request).await {
                Ok(candidates) => {
                    for raw in &candidates {
                        let Some(question) = normalize_candidate(raw) else { continue };
                        if !filter.admit(&question.stem) {
                            continue;
                        }
                        accepted.push(question);
                        if accepted.len() >= need {
                            break;
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, attempt, set_id = %set.id, "generator unavailable during backfill");
                }
            }
            if accepted.len() >= need {
                break;
            }
        }

        if accepted.len() < need {
            debug!(
                set_id = %set.id,
                accepted = accepted.len(),
                need,
                "backfill shortfall, serving a shorter round"
            );
        }
        accepted
    }

    /// Final validation + insert, back under the set lock: candidates are
    /// re-checked against the current history, topics assigned, and new
    /// items scheduled at the set's creation time so they lead the next
    /// due query.
    async fn insert_backfill(
        &self,
        set: &AssessmentSet,
        generated: Vec<NormalizedQuestion>,
    ) -> Result<(), EngineError> {
        let existing = self.store.items_for_set(&set.id).await?;
        let mut filter =
            NoveltyFilter::with_history(existing.iter().map(|item| item.stem.as_str()));
        let mut next_number = existing
            .iter()
            .map(|item| item.question_number)
            .max()
            .unwrap_or(0);

        let mut topics: Vec<String> = set.topic_difficulty.keys().cloned().collect();
        topics.sort();
        let mut round_robin = 0;

        let now = Utc::now();
        let mut new_items = Vec::new();
        for question in generated {
            if !filter.admit(&question.stem) {
                continue;
            }
            next_number += 1;
            let topic = assign_topic(&question.stem, &topics, &mut round_robin);
            let mut item =
                AssessmentItem::from_question(&set.id, next_number, question, topic, now);
            item.next_review = Some(set.created_at);
            new_items.push(item);
        }

        if !new_items.is_empty() {
            self.store.insert_items(&new_items).await?;
            debug!(set_id = %set.id, count = new_items.len(), "backfill items inserted");
        }
        Ok(())
    }

    async fn update_topic_rollup(&self, title: &str, difficulty: f64) -> Result<(), StoreError> {
        let mut topic = self
            .store
            .get_topic_by_title(title)
            .await?
            .unwrap_or_else(|| Topic::new(title));
        topic.record_difficulty(difficulty);
        self.store.upsert_topic(&topic).await
    }
}

fn to_entries(items: Vec<AssessmentItem>) -> Vec<RoundEntry> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| RoundEntry { sequence: index as i64 + 1, item })
        .collect()
}

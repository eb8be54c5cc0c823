//! End-to-end engine tests over the in-memory store and a scripted generator.

mod common;

use std::sync::Arc;

use learnnova_backend_rust::db::AssessmentStore;
use learnnova_backend_rust::engine::types::QuizSize;
use learnnova_backend_rust::engine::EngineError;

use common::{
    candidate_with_topic, candidates, long_summary, test_engine, test_engine_with_store,
    MockGenerator,
};

#[tokio::test]
async fn create_set_accepts_normalized_candidates_and_fixes_round_size() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&[
        "What is the powerhouse of the cell?",
        "Which organelle stores genetic material?",
        "What process converts light into chemical energy?",
    ]));
    let engine = test_engine(Arc::clone(&generator));

    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();

    assert_eq!(set.original_count, 3);
    assert_eq!(set.score, 0);
    assert_eq!(items.len(), 3);
    for (index, item) in items.iter().enumerate() {
        assert_eq!(item.question_number, index as i64 + 1);
        assert_eq!(item.options.len(), 4);
        assert!(item.next_review.is_none());
        assert!((item.confidence - -1.0).abs() < f64::EPSILON);
    }
}

#[tokio::test]
async fn create_set_drops_near_duplicate_stems() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&[
        "What is the quick brown fox doing today",
        "What is the quick brown dog doing today",
        "Which organelle stores genetic material?",
    ]));
    let engine = test_engine(Arc::clone(&generator));

    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();

    assert_eq!(set.original_count, 2);
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn create_set_rejects_short_summary() {
    let generator = Arc::new(MockGenerator::new());
    let engine = test_engine(Arc::clone(&generator));

    let result = engine.create_set("Biology", "too short", QuizSize::Small).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn create_set_retries_in_strict_mode_when_first_batch_unusable() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(Vec::new());
    generator.push_batch(candidates(&["What is a ribosome responsible for?"]));
    let engine = test_engine(Arc::clone(&generator));

    let (set, _items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();

    assert_eq!(set.original_count, 1);
    let calls = generator.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls[0].strict);
    assert!(calls[1].strict);
}

#[tokio::test]
async fn create_set_fails_when_both_batches_yield_nothing() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(Vec::new());
    generator.push_batch(Vec::new());
    let engine = test_engine(Arc::clone(&generator));

    let result = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await;
    assert!(matches!(result, Err(EngineError::EmptyGeneration)));
}

#[tokio::test]
async fn correct_answer_increments_score_exactly_once_per_item() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&["What is the powerhouse of the cell?"]));
    let engine = test_engine(Arc::clone(&generator));
    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();
    let item = &items[0];

    let first = engine.submit_answer(&item.id, "Answer 0", None).await.unwrap();
    assert!(first.correct);
    assert!(first.score_incremented);

    let second = engine.submit_answer(&item.id, "Answer 0", None).await.unwrap();
    assert!(second.correct);
    assert!(!second.score_incremented);

    let round = engine.get_round(&set.id).await.unwrap();
    assert_eq!(round.score, 1);
}

#[tokio::test]
async fn incorrect_answer_resets_streak_and_schedules_immediately() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&["What is the powerhouse of the cell?"]));
    let engine = test_engine(Arc::clone(&generator));
    let (_set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();
    let item = &items[0];

    let outcome = engine.submit_answer(&item.id, "Answer 2", None).await.unwrap();
    assert!(!outcome.correct);
    assert!(!outcome.score_incremented);
}

#[tokio::test]
async fn unknown_item_is_reported_as_not_found() {
    let generator = Arc::new(MockGenerator::new());
    let engine = test_engine(Arc::clone(&generator));

    let result = engine.submit_answer("missing-id", "Answer 0", None).await;
    assert!(matches!(result, Err(EngineError::ItemNotFound)));
}

#[tokio::test]
async fn round_serves_original_block_until_every_item_is_answered() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&[
        "What is the powerhouse of the cell?",
        "Which organelle stores genetic material?",
    ]));
    let engine = test_engine(Arc::clone(&generator));
    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();

    let round = engine.get_round(&set.id).await.unwrap();
    assert_eq!(round.entries.len(), 2);
    assert_eq!(round.total, 2);
    assert_eq!(round.next_unanswered_index, 1);
    assert_eq!(round.entries[0].sequence, 1);

    engine.submit_answer(&items[0].id, "Answer 0", None).await.unwrap();
    let round = engine.get_round(&set.id).await.unwrap();
    assert_eq!(round.entries.len(), 2);
    assert_eq!(round.next_unanswered_index, 2);
    // No generation happens while the original block is in play.
    assert_eq!(generator.calls().len(), 1);
}

#[tokio::test]
async fn completed_set_backfills_due_shortfall_from_the_generator() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&[
        "What is the powerhouse of the cell?",
        "Which organelle stores genetic material?",
        "What process converts light into chemical energy?",
    ]));
    let engine = test_engine(Arc::clone(&generator));
    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();

    // Correct answers push every original item 10 minutes into the future.
    for item in &items {
        engine.submit_answer(&item.id, "Answer 0", None).await.unwrap();
    }

    generator.push_batch(candidates(&[
        "What is the powerhouse of the cell?",
        "How do enzymes lower activation energy?",
        "What distinguishes mitosis from meiosis?",
    ]));

    let round = engine.get_round(&set.id).await.unwrap();
    // The duplicate stem is rejected; two novel items are inserted, due at
    // the set's creation time.
    assert_eq!(round.entries.len(), 2);
    assert_eq!(round.total, 3);
    assert_eq!(round.next_unanswered_index, 0);
    for entry in &round.entries {
        assert_eq!(entry.item.next_review, Some(set.created_at));
        assert!(entry.item.question_number > 3);
    }

    let backfill_call = &generator.calls()[1];
    // Over-asking absorbs duplicate rejection: max(2 * need, need + 2).
    assert_eq!(backfill_call.count, 6);
}

#[tokio::test]
async fn backfill_tops_a_partial_due_set_up_to_the_full_round_size() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&[
        "What is the powerhouse of the cell?",
        "Which organelle stores genetic material?",
        "What process converts light into chemical energy?",
        "How do enzymes lower activation energy?",
        "What distinguishes mitosis from meiosis?",
    ]));
    let engine = test_engine(Arc::clone(&generator));
    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();
    assert_eq!(set.original_count, 5);

    // Three misses come due immediately; two correct answers are pushed out.
    for item in &items[..3] {
        engine.submit_answer(&item.id, "Answer 3", None).await.unwrap();
    }
    for item in &items[3..] {
        engine.submit_answer(&item.id, "Answer 0", None).await.unwrap();
    }

    generator.push_batch(candidates(&[
        "Why do plant cells have rigid walls?",
        "Where does protein folding occur?",
    ]));

    let round = engine.get_round(&set.id).await.unwrap();
    assert_eq!(round.entries.len(), 5);
    assert_eq!(round.total, 5);
    let sequences: Vec<i64> = round.entries.iter().map(|entry| entry.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn backfill_degrades_gracefully_when_the_generator_fails() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&["What is the powerhouse of the cell?"]));
    let engine = test_engine(Arc::clone(&generator));
    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();
    engine.submit_answer(&items[0].id, "Answer 0", None).await.unwrap();

    generator.push_error();
    generator.push_error();
    generator.push_error();

    let round = engine.get_round(&set.id).await.unwrap();
    assert!(round.entries.is_empty());
    assert_eq!(round.total, 1);
    assert_eq!(round.score, 1);
}

#[tokio::test]
async fn incorrect_items_come_due_immediately_and_lead_the_round() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&[
        "What is the powerhouse of the cell?",
        "Which organelle stores genetic material?",
    ]));
    let engine = test_engine(Arc::clone(&generator));
    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();

    engine.submit_answer(&items[0].id, "Answer 3", None).await.unwrap();
    engine.submit_answer(&items[1].id, "Answer 0", None).await.unwrap();

    // One item due now, one scheduled out; backfill tops up the difference.
    generator.push_batch(candidates(&["How do enzymes lower activation energy?"]));
    let round = engine.get_round(&set.id).await.unwrap();
    assert_eq!(round.entries.len(), 2);
    // The generated item is due at the set's creation time, so it sorts
    // ahead of the item missed just now.
    assert_eq!(round.entries[0].item.question_number, 3);
    assert_eq!(round.entries[1].item.id, items[0].id);
}

#[tokio::test]
async fn reset_round_clears_score_but_keeps_scheduling_state() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&["What is the powerhouse of the cell?"]));
    let engine = test_engine(Arc::clone(&generator));
    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();
    engine.submit_answer(&items[0].id, "Answer 0", None).await.unwrap();

    engine.reset_round(&set.id).await.unwrap();

    let round = engine.get_round(&set.id).await.unwrap();
    assert_eq!(round.score, 0);
    // The item keeps its review schedule, so it is still not due.
    assert!(round.entries.is_empty());
}

#[tokio::test]
async fn confidence_runs_as_a_clamped_average_and_mastery_stays_bounded() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&["What is the powerhouse of the cell?"]));
    let (engine, store) = test_engine_with_store(Arc::clone(&generator));
    let (_set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();
    let item_id = items[0].id.clone();

    // Out-of-range samples clamp to 5 before averaging.
    engine.submit_answer(&item_id, "Answer 0", Some(9.0)).await.unwrap();
    let stored = store.get_item(&item_id).await.unwrap().unwrap();
    assert!((stored.confidence - 5.0).abs() < f64::EPSILON);
    assert!(stored.mastery > 0.0);

    for _ in 0..5 {
        engine.submit_answer(&item_id, "Answer 0", Some(5.0)).await.unwrap();
    }
    let stored = store.get_item(&item_id).await.unwrap().unwrap();
    assert!((stored.confidence - 5.0).abs() < f64::EPSILON);
    assert!(stored.mastery <= 5.0);
    assert_eq!(stored.correct_streak, 6);
    assert_eq!(stored.max_streak, 6);
}

#[tokio::test]
async fn incorrect_answer_without_confidence_stores_the_sentinel() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&["What is the powerhouse of the cell?"]));
    let (engine, store) = test_engine_with_store(Arc::clone(&generator));
    let (_set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();
    let item_id = items[0].id.clone();

    engine.submit_answer(&item_id, "Answer 0", Some(4.0)).await.unwrap();
    engine.submit_answer(&item_id, "Answer 2", None).await.unwrap();

    let stored = store.get_item(&item_id).await.unwrap().unwrap();
    assert!((stored.confidence - -1.0).abs() < f64::EPSILON);
    assert_eq!(stored.correct_streak, 0);
    assert_eq!(stored.max_streak, 1);

    // The sentinel restarts the running average on the next sample.
    engine.submit_answer(&item_id, "Answer 0", Some(2.0)).await.unwrap();
    let stored = store.get_item(&item_id).await.unwrap().unwrap();
    assert!((stored.confidence - 2.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn generator_topic_labels_drive_difficulty_and_the_cross_set_rollup() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(vec![
        candidate_with_topic("What is the powerhouse of the cell?", 0, "Cell Biology"),
        candidate_with_topic("Which base pairs with adenine in DNA?", 0, "Genetics"),
    ]);
    let (engine, store) = test_engine_with_store(Arc::clone(&generator));
    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();

    let stored = store.get_item(&items[0].id).await.unwrap().unwrap();
    assert_eq!(stored.topic.as_deref(), Some("Cell Biology"));

    // A confident correct answer raises the set-level difficulty for the
    // item's topic from the 1.0 default by 0.3 * (confidence / 5).
    engine
        .submit_answer(&items[0].id, "Answer 0", Some(5.0))
        .await
        .unwrap();
    let set = store.get_set(&set.id).await.unwrap().unwrap();
    let difficulty = *set.topic_difficulty.get("Cell Biology").unwrap();
    assert!((difficulty - 1.3).abs() < 1e-9);
    assert!(set.topic_difficulty.get("Genetics").is_none());

    let rollup = store
        .get_topic_by_title("Cell Biology")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rollup.difficulty_count, 1);
    assert!((rollup.difficulty_sum - 1.3).abs() < 1e-9);
}

#[tokio::test]
async fn backfill_requests_carry_learned_topic_hints_and_targets() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(vec![candidate_with_topic(
        "What is the powerhouse of the cell?",
        0,
        "Cell Biology",
    )]);
    let engine = test_engine(Arc::clone(&generator));
    let (set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();
    engine
        .submit_answer(&items[0].id, "Answer 0", Some(5.0))
        .await
        .unwrap();

    generator.push_batch(vec![candidate_with_topic(
        "Where does protein folding occur?",
        0,
        "Cell Biology",
    )]);
    engine.get_round(&set.id).await.unwrap();

    let backfill_call = &generator.calls()[1];
    assert_eq!(backfill_call.topic_hints, vec!["Cell Biology".to_string()]);
    // Target nudges 0.10 past the current difficulty of 1.3.
    assert_eq!(backfill_call.difficulty_targets.len(), 1);
    assert!((backfill_call.difficulty_targets[0].1 - 1.4).abs() < 1e-9);
}

#[tokio::test]
async fn first_confident_correct_answer_reinforces_mastery_with_the_fresh_streak() {
    let generator = Arc::new(MockGenerator::new());
    generator.push_batch(candidates(&["What is the powerhouse of the cell?"]));
    let (engine, store) = test_engine_with_store(Arc::clone(&generator));
    let (_set, items) = engine
        .create_set("Biology", &long_summary(), QuizSize::Small)
        .await
        .unwrap();

    engine
        .submit_answer(&items[0].id, "Answer 0", Some(5.0))
        .await
        .unwrap();

    // Scheduling runs before mastery, so the streak ratio already counts
    // this answer: 0.5 * 1.0 + 0.3 * 1.0 + 0.2 * 1.0 with the default
    // topic difficulty of 1.0.
    let stored = store.get_item(&items[0].id).await.unwrap().unwrap();
    assert_eq!(stored.correct_streak, 1);
    assert_eq!(stored.max_streak, 1);
    assert!((stored.mastery - 1.0).abs() < 1e-9);
}

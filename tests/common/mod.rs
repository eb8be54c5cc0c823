#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use learnnova_backend_rust::db::{AssessmentStore, MemoryStore};
use learnnova_backend_rust::engine::normalize::RawCandidate;
use learnnova_backend_rust::engine::round::RetryPolicy;
use learnnova_backend_rust::engine::AssessmentEngine;
use learnnova_backend_rust::routes;
use learnnova_backend_rust::services::generator::{
    GenerationRequest, GeneratorError, ItemGenerator,
};
use learnnova_backend_rust::state::AppState;

/// Scripted generator: each call pops the next queued response. An empty
/// queue yields an empty batch.
pub struct MockGenerator {
    responses: Mutex<VecDeque<Result<Vec<RawCandidate>, GeneratorError>>>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_batch(&self, candidates: Vec<RawCandidate>) {
        self.responses.lock().push_back(Ok(candidates));
    }

    pub fn push_error(&self) {
        self.responses
            .lock()
            .push_back(Err(GeneratorError::EmptyChoices));
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ItemGenerator for MockGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<RawCandidate>, GeneratorError> {
        self.calls.lock().push(request.clone());
        self.responses.lock().pop_front().unwrap_or(Ok(Vec::new()))
    }
}

/// Well-formed candidate with a distinct stem and "Answer N" as the correct
/// option text.
pub fn candidate(stem: &str, correct_index: usize) -> RawCandidate {
    RawCandidate {
        question: Some(stem.to_string()),
        options: Some(vec![
            json!("Answer 0"),
            json!("Answer 1"),
            json!("Answer 2"),
            json!("Answer 3"),
        ]),
        correct_index: Some(json!(correct_index)),
        ..RawCandidate::default()
    }
}

pub fn candidates(stems: &[&str]) -> Vec<RawCandidate> {
    stems.iter().map(|stem| candidate(stem, 0)).collect()
}

pub fn candidate_with_topic(stem: &str, correct_index: usize, topic: &str) -> RawCandidate {
    RawCandidate {
        topic: Some(topic.to_string()),
        ..candidate(stem, correct_index)
    }
}

/// Summary long enough to pass the small-quiz token gate (>= 200 tokens).
pub fn long_summary() -> String {
    "The cell is the basic structural and functional unit of life. ".repeat(20)
}

pub fn test_engine(generator: Arc<MockGenerator>) -> AssessmentEngine {
    test_engine_with_store(generator).0
}

pub fn test_engine_with_store(
    generator: Arc<MockGenerator>,
) -> (AssessmentEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = AssessmentEngine::new(
        Arc::clone(&store) as Arc<dyn AssessmentStore>,
        generator,
        RetryPolicy::default(),
    );
    (engine, store)
}

pub fn test_app(generator: Arc<MockGenerator>) -> axum::Router {
    let store: Arc<dyn AssessmentStore> = Arc::new(MemoryStore::new());
    routes::router(AppState::new(store, generator))
}

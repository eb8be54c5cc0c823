use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::db::AssessmentStore;
use crate::engine::round::RetryPolicy;
use crate::engine::AssessmentEngine;
use crate::services::generator::ItemGenerator;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    engine: Arc<AssessmentEngine>,
}

impl AppState {
    pub fn new(store: Arc<dyn AssessmentStore>, generator: Arc<dyn ItemGenerator>) -> Self {
        let engine = Arc::new(AssessmentEngine::new(store, generator, RetryPolicy::from_env()));
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            engine,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn engine(&self) -> Arc<AssessmentEngine> {
        Arc::clone(&self.engine)
    }
}

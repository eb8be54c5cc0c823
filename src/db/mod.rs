//! Durable storage seam for the assessment engine.
//!
//! The engine is constructed against `AssessmentStore`, never a concrete
//! backend. `SqliteStore` is the durable implementation; `MemoryStore` is
//! the in-process fallback used when no database is configured and by the
//! test suite.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::engine::types::{AssessmentItem, AssessmentSet, Topic};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn insert_set(&self, set: &AssessmentSet) -> Result<(), StoreError>;
    async fn get_set(&self, set_id: &str) -> Result<Option<AssessmentSet>, StoreError>;
    /// Persists the set's mutable state: score and topic difficulty map.
    async fn update_set(&self, set: &AssessmentSet) -> Result<(), StoreError>;

    async fn insert_items(&self, items: &[AssessmentItem]) -> Result<(), StoreError>;
    async fn get_item(&self, item_id: &str) -> Result<Option<AssessmentItem>, StoreError>;
    async fn update_item(&self, item: &AssessmentItem) -> Result<(), StoreError>;
    /// All items of a set, ordered by lifetime question number.
    async fn items_for_set(&self, set_id: &str) -> Result<Vec<AssessmentItem>, StoreError>;
    /// Items due at `now`, ordered soonest-due then least-confident first.
    async fn due_items(
        &self,
        set_id: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AssessmentItem>, StoreError>;

    async fn get_topic_by_title(&self, title: &str) -> Result<Option<Topic>, StoreError>;
    async fn upsert_topic(&self, topic: &Topic) -> Result<(), StoreError>;
}

/// Builds the store from `DATABASE_URL`, degrading to the in-memory store
/// with a warning when the variable is missing or the connection fails.
pub async fn store_from_env() -> Arc<dyn AssessmentStore> {
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => match SqliteStore::connect(&url).await {
            Ok(store) => Arc::new(store),
            Err(err) => {
                tracing::warn!(error = %err, "sqlite store unavailable, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        },
        _ => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    }
}

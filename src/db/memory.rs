//! In-process store: fallback when no database is configured, and the
//! backend the engine tests run against.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{AssessmentStore, StoreError};
use crate::engine::types::{AssessmentItem, AssessmentSet, Topic};

#[derive(Default)]
struct Inner {
    sets: HashMap<String, AssessmentSet>,
    items: HashMap<String, AssessmentItem>,
    /// Keyed by lowercased title for the case-insensitive match.
    topics: HashMap<String, Topic>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn insert_set(&self, set: &AssessmentSet) -> Result<(), StoreError> {
        self.inner.write().sets.insert(set.id.clone(), set.clone());
        Ok(())
    }

    async fn get_set(&self, set_id: &str) -> Result<Option<AssessmentSet>, StoreError> {
        Ok(self.inner.read().sets.get(set_id).cloned())
    }

    async fn update_set(&self, set: &AssessmentSet) -> Result<(), StoreError> {
        self.inner.write().sets.insert(set.id.clone(), set.clone());
        Ok(())
    }

    async fn insert_items(&self, items: &[AssessmentItem]) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        for item in items {
            inner.items.insert(item.id.clone(), item.clone());
        }
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<AssessmentItem>, StoreError> {
        Ok(self.inner.read().items.get(item_id).cloned())
    }

    async fn update_item(&self, item: &AssessmentItem) -> Result<(), StoreError> {
        self.inner.write().items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn items_for_set(&self, set_id: &str) -> Result<Vec<AssessmentItem>, StoreError> {
        let mut items: Vec<AssessmentItem> = self
            .inner
            .read()
            .items
            .values()
            .filter(|item| item.set_id == set_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.question_number);
        Ok(items)
    }

    async fn due_items(
        &self,
        set_id: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AssessmentItem>, StoreError> {
        let mut due: Vec<AssessmentItem> = self
            .inner
            .read()
            .items
            .values()
            .filter(|item| {
                item.set_id == set_id && item.next_review.is_some_and(|review| review <= now)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.next_review
                .cmp(&b.next_review)
                .then_with(|| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
        });
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn get_topic_by_title(&self, title: &str) -> Result<Option<Topic>, StoreError> {
        Ok(self.inner.read().topics.get(&title.to_lowercase()).cloned())
    }

    async fn upsert_topic(&self, topic: &Topic) -> Result<(), StoreError> {
        self.inner
            .write()
            .topics
            .insert(topic.title.to_lowercase(), topic.clone());
        Ok(())
    }
}

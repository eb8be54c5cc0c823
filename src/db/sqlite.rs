//! SQLite-backed store. Array and map fields are JSON-encoded in TEXT
//! columns; timestamps are RFC 3339 TEXT handled by sqlx's chrono support.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::{AssessmentStore, StoreError};
use crate::engine::types::{AssessmentItem, AssessmentSet, Topic};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS assessment_sets (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    original_count INTEGER NOT NULL,
    source_content TEXT NOT NULL,
    topic_difficulty TEXT NOT NULL DEFAULT '{}',
    score INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assessment_items (
    id TEXT PRIMARY KEY,
    set_id TEXT NOT NULL REFERENCES assessment_sets(id) ON DELETE CASCADE,
    question_number INTEGER NOT NULL,
    stem TEXT NOT NULL,
    options TEXT NOT NULL,
    correct_index INTEGER NOT NULL,
    topic TEXT,
    user_answer TEXT,
    is_correct INTEGER NOT NULL DEFAULT 0,
    times_seen INTEGER NOT NULL DEFAULT 0,
    times_correct INTEGER NOT NULL DEFAULT 0,
    correct_streak INTEGER NOT NULL DEFAULT 0,
    max_streak INTEGER NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT -1,
    mastery REAL NOT NULL DEFAULT 0,
    option_selection_counts TEXT NOT NULL DEFAULT '[0,0,0,0]',
    interval_minutes INTEGER NOT NULL DEFAULT 10,
    last_reviewed TEXT,
    next_review TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_set_number ON assessment_items(set_id, question_number);
CREATE INDEX IF NOT EXISTS idx_items_set_due ON assessment_items(set_id, next_review, confidence);

CREATE TABLE IF NOT EXISTS topics (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL UNIQUE COLLATE NOCASE,
    average_difficulty REAL NOT NULL DEFAULT 0,
    difficulty_sum REAL NOT NULL DEFAULT 0,
    difficulty_count INTEGER NOT NULL DEFAULT 0
);
"#;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;

        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl AssessmentStore for SqliteStore {
    async fn insert_set(&self, set: &AssessmentSet) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO assessment_sets
              (id, title, original_count, source_content, topic_difficulty, score, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&set.id)
        .bind(&set.title)
        .bind(set.original_count)
        .bind(&set.source_content)
        .bind(encode_topic_difficulty(set))
        .bind(set.score)
        .bind(set.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_set(&self, set_id: &str) -> Result<Option<AssessmentSet>, StoreError> {
        let row = sqlx::query("SELECT * FROM assessment_sets WHERE id = ? LIMIT 1")
            .bind(set_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_set_row).transpose()
    }

    async fn update_set(&self, set: &AssessmentSet) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE assessment_sets SET topic_difficulty = ?, score = ? WHERE id = ?",
        )
        .bind(encode_topic_difficulty(set))
        .bind(set.score)
        .bind(&set.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_items(&self, items: &[AssessmentItem]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO assessment_items
                  (id, set_id, question_number, stem, options, correct_index, topic,
                   user_answer, is_correct, times_seen, times_correct, correct_streak,
                   max_streak, confidence, mastery, option_selection_counts,
                   interval_minutes, last_reviewed, next_review, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.id)
            .bind(&item.set_id)
            .bind(item.question_number)
            .bind(&item.stem)
            .bind(encode_string_list(&item.options))
            .bind(item.correct_index as i64)
            .bind(&item.topic)
            .bind(&item.user_answer)
            .bind(item.is_correct)
            .bind(item.times_seen)
            .bind(item.times_correct)
            .bind(item.correct_streak)
            .bind(item.max_streak)
            .bind(item.confidence)
            .bind(item.mastery)
            .bind(encode_counts(&item.option_selection_counts))
            .bind(item.interval_minutes)
            .bind(item.last_reviewed)
            .bind(item.next_review)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<AssessmentItem>, StoreError> {
        let row = sqlx::query("SELECT * FROM assessment_items WHERE id = ? LIMIT 1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_item_row).transpose()
    }

    async fn update_item(&self, item: &AssessmentItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE assessment_items SET
              user_answer = ?, is_correct = ?, times_seen = ?, times_correct = ?,
              correct_streak = ?, max_streak = ?, confidence = ?, mastery = ?,
              option_selection_counts = ?, interval_minutes = ?, last_reviewed = ?,
              next_review = ?, topic = ?
            WHERE id = ?
            "#,
        )
        .bind(&item.user_answer)
        .bind(item.is_correct)
        .bind(item.times_seen)
        .bind(item.times_correct)
        .bind(item.correct_streak)
        .bind(item.max_streak)
        .bind(item.confidence)
        .bind(item.mastery)
        .bind(encode_counts(&item.option_selection_counts))
        .bind(item.interval_minutes)
        .bind(item.last_reviewed)
        .bind(item.next_review)
        .bind(&item.topic)
        .bind(&item.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn items_for_set(&self, set_id: &str) -> Result<Vec<AssessmentItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM assessment_items WHERE set_id = ? ORDER BY question_number ASC",
        )
        .bind(set_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_item_row).collect()
    }

    async fn due_items(
        &self,
        set_id: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AssessmentItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM assessment_items
            WHERE set_id = ? AND next_review IS NOT NULL AND next_review <= ?
            ORDER BY next_review ASC, confidence ASC
            LIMIT ?
            "#,
        )
        .bind(set_id)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_item_row).collect()
    }

    async fn get_topic_by_title(&self, title: &str) -> Result<Option<Topic>, StoreError> {
        let row = sqlx::query("SELECT * FROM topics WHERE title = ? COLLATE NOCASE LIMIT 1")
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| Topic {
            id: row.try_get("id").unwrap_or_default(),
            title: row.try_get("title").unwrap_or_default(),
            average_difficulty: row.try_get("average_difficulty").unwrap_or(0.0),
            difficulty_sum: row.try_get("difficulty_sum").unwrap_or(0.0),
            difficulty_count: row.try_get("difficulty_count").unwrap_or(0),
        }))
    }

    async fn upsert_topic(&self, topic: &Topic) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO topics (id, title, average_difficulty, difficulty_sum, difficulty_count)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
              average_difficulty = excluded.average_difficulty,
              difficulty_sum = excluded.difficulty_sum,
              difficulty_count = excluded.difficulty_count
            "#,
        )
        .bind(&topic.id)
        .bind(&topic.title)
        .bind(topic.average_difficulty)
        .bind(topic.difficulty_sum)
        .bind(topic.difficulty_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn encode_topic_difficulty(set: &AssessmentSet) -> String {
    serde_json::to_string(&set.topic_difficulty).unwrap_or_else(|_| "{}".to_string())
}

fn encode_string_list(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

fn encode_counts(counts: &[i64]) -> String {
    serde_json::to_string(counts).unwrap_or_else(|_| "[0,0,0,0]".to_string())
}

fn map_set_row(row: SqliteRow) -> Result<AssessmentSet, StoreError> {
    let topic_raw: String = row.try_get("topic_difficulty").unwrap_or_else(|_| "{}".to_string());
    let topic_difficulty = serde_json::from_str(&topic_raw)
        .map_err(|err| StoreError::Corrupt(format!("topic_difficulty: {err}")))?;

    Ok(AssessmentSet {
        id: row.try_get("id").unwrap_or_default(),
        title: row.try_get("title").unwrap_or_default(),
        original_count: row.try_get("original_count").unwrap_or(0),
        source_content: row.try_get("source_content").unwrap_or_default(),
        topic_difficulty,
        score: row.try_get("score").unwrap_or(0),
        created_at: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
    })
}

fn map_item_row(row: SqliteRow) -> Result<AssessmentItem, StoreError> {
    let options_raw: String = row.try_get("options").unwrap_or_else(|_| "[]".to_string());
    let options: Vec<String> = serde_json::from_str(&options_raw)
        .map_err(|err| StoreError::Corrupt(format!("options: {err}")))?;
    let counts_raw: String = row
        .try_get("option_selection_counts")
        .unwrap_or_else(|_| "[0,0,0,0]".to_string());
    let option_selection_counts: Vec<i64> = serde_json::from_str(&counts_raw)
        .map_err(|err| StoreError::Corrupt(format!("option_selection_counts: {err}")))?;

    Ok(AssessmentItem {
        id: row.try_get("id").unwrap_or_default(),
        set_id: row.try_get("set_id").unwrap_or_default(),
        question_number: row.try_get("question_number").unwrap_or(0),
        stem: row.try_get("stem").unwrap_or_default(),
        options,
        correct_index: row.try_get::<i64, _>("correct_index").unwrap_or(0) as usize,
        topic: row.try_get::<Option<String>, _>("topic").ok().flatten(),
        user_answer: row.try_get::<Option<String>, _>("user_answer").ok().flatten(),
        is_correct: row.try_get("is_correct").unwrap_or(false),
        times_seen: row.try_get("times_seen").unwrap_or(0),
        times_correct: row.try_get("times_correct").unwrap_or(0),
        correct_streak: row.try_get("correct_streak").unwrap_or(0),
        max_streak: row.try_get("max_streak").unwrap_or(0),
        confidence: row.try_get("confidence").unwrap_or(-1.0),
        mastery: row.try_get("mastery").unwrap_or(0.0),
        option_selection_counts,
        interval_minutes: row.try_get("interval_minutes").unwrap_or(10),
        last_reviewed: row.try_get::<Option<DateTime<Utc>>, _>("last_reviewed").ok().flatten(),
        next_review: row.try_get::<Option<DateTime<Utc>>, _>("next_review").ok().flatten(),
        created_at: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
    })
}

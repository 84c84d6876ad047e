// src/services/archive.rs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, prelude::FromRow, types::Json};

use crate::engine::scoring::CompetencyScore;
use crate::engine::selection::Selection;
use crate::models::question::QuizQuestion;
use crate::models::result::QuizResult;
use crate::services::StoreError;

/// Store of completed attempts.
#[async_trait]
pub trait ResultArchive: Send + Sync {
    /// Stores a result. Saving the same id twice keeps the first record.
    async fn save(&self, result: &QuizResult) -> Result<(), StoreError>;

    /// All results of a user. Callers must not rely on the order.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<QuizResult>, StoreError>;

    async fn get(&self, user_id: &str, id: &str) -> Result<Option<QuizResult>, StoreError>;
}

/// Sorts results newest first.
pub fn newest_first(mut results: Vec<QuizResult>) -> Vec<QuizResult> {
    results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    results
}

/// Row of the 'quiz_results' table.
#[derive(Debug, FromRow)]
struct QuizResultRow {
    id: String,
    user_id: String,
    user_name: Option<String>,
    topic: String,
    questions: Json<Vec<QuizQuestion>>,
    selections: Json<HashMap<String, Selection>>,
    score: i32,
    correct_count: i32,
    total_questions: i32,
    competency_scores: Json<BTreeMap<String, CompetencyScore>>,
    elapsed_seconds: i64,
    created_at: DateTime<Utc>,
}

impl From<QuizResultRow> for QuizResult {
    fn from(row: QuizResultRow) -> Self {
        QuizResult {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            topic: row.topic,
            questions: row.questions.0,
            selections: row.selections.0,
            score: row.score,
            correct_count: row.correct_count,
            total_questions: row.total_questions,
            competency_scores: row.competency_scores.0,
            elapsed_seconds: row.elapsed_seconds,
            created_at: row.created_at,
        }
    }
}

const SELECT_RESULT: &str = r#"
    SELECT
        id,
        user_id,
        user_name,
        topic,
        questions,
        selections,
        score,
        correct_count,
        total_questions,
        competency_scores,
        elapsed_seconds,
        created_at
    FROM quiz_results
"#;

#[derive(Clone)]
pub struct PgResultArchive {
    pool: PgPool,
}

impl PgResultArchive {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultArchive for PgResultArchive {
    async fn save(&self, result: &QuizResult) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO quiz_results
                (id, user_id, user_name, topic, questions, selections, score,
                 correct_count, total_questions, competency_scores, elapsed_seconds, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&result.id)
        .bind(&result.user_id)
        .bind(&result.user_name)
        .bind(&result.topic)
        .bind(Json(&result.questions))
        .bind(Json(&result.selections))
        .bind(result.score)
        .bind(result.correct_count)
        .bind(result.total_questions)
        .bind(Json(&result.competency_scores))
        .bind(result.elapsed_seconds)
        .bind(result.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save quiz result {}: {:?}", result.id, e);
            StoreError::from(e)
        })?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<QuizResult>, StoreError> {
        let query = format!("{} WHERE user_id = $1 ORDER BY created_at DESC", SELECT_RESULT);
        let rows = sqlx::query_as::<_, QuizResultRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(QuizResult::from).collect())
    }

    async fn get(&self, user_id: &str, id: &str) -> Result<Option<QuizResult>, StoreError> {
        let query = format!("{} WHERE user_id = $1 AND id = $2", SELECT_RESULT);
        let row = sqlx::query_as::<_, QuizResultRow>(&query)
            .bind(user_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(QuizResult::from))
    }
}

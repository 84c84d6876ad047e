// src/services/bank.rs

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, prelude::FromRow, types::Json};

use crate::models::question::QuizQuestion;
use crate::models::result::BankStats;
use crate::services::StoreError;

/// Key of the counter row holding the bank's total size.
pub const TOTAL_COUNTER_KEY: &str = "__total__";

/// Durable pool of previously generated questions.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// Up to `count` questions of `competency` whose ids are not in `exclude`.
    async fn fetch_unseen(
        &self,
        competency: &str,
        exclude: &HashSet<String>,
        count: usize,
    ) -> Result<Vec<QuizQuestion>, StoreError>;

    /// Appends questions and bumps the counters as one atomic write.
    async fn save_batch(&self, questions: &[QuizQuestion]) -> Result<(), StoreError>;

    async fn stats(&self) -> Result<BankStats, StoreError>;

    /// Ids of every question already served to `user_id`.
    async fn seen_ids(&self, user_id: &str) -> Result<HashSet<String>, StoreError>;

    async fn mark_seen(&self, user_id: &str, question_ids: &[String]) -> Result<(), StoreError>;
}

/// Counter increments for a batch of inserted competencies.
pub fn count_by_competency<'a>(
    competencies: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    for competency in competencies {
        *counts.entry(competency.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Row of the 'bank_questions' table.
#[derive(Debug, FromRow)]
struct BankQuestionRow {
    id: String,
    competency: String,
    passage: String,
    prompt: String,
    options: Json<Vec<String>>,
    best_answers: Json<Vec<String>>,
    second_best_answers: Json<Vec<String>>,
    worst_answer: Option<String>,
    explanation: String,
}

impl From<BankQuestionRow> for QuizQuestion {
    fn from(row: BankQuestionRow) -> Self {
        QuizQuestion {
            id: row.id,
            competency: row.competency,
            passage: row.passage,
            prompt: row.prompt,
            options: row.options.0,
            best_answers: row.best_answers.0,
            second_best_answers: row.second_best_answers.0,
            worst_answer: row.worst_answer,
            explanation: row.explanation,
        }
    }
}

#[derive(Debug, FromRow)]
struct CounterRow {
    key: String,
    count: i64,
}

#[derive(Clone)]
pub struct PgQuestionBank {
    pool: PgPool,
}

impl PgQuestionBank {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionBank for PgQuestionBank {
    async fn fetch_unseen(
        &self,
        competency: &str,
        exclude: &HashSet<String>,
        count: usize,
    ) -> Result<Vec<QuizQuestion>, StoreError> {
        let exclude: Vec<String> = exclude.iter().cloned().collect();

        let rows = sqlx::query_as::<_, BankQuestionRow>(
            r#"
            SELECT
                id,
                competency,
                passage,
                prompt,
                options,
                best_answers,
                second_best_answers,
                worst_answer,
                explanation
            FROM bank_questions
            WHERE competency = $1
              AND NOT (id = ANY($2))
            ORDER BY RANDOM()
            LIMIT $3
            "#,
        )
        .bind(competency)
        .bind(&exclude)
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch bank questions for '{}': {:?}", competency, e);
            StoreError::from(e)
        })?;

        Ok(rows.into_iter().map(QuizQuestion::from).collect())
    }

    async fn save_batch(&self, questions: &[QuizQuestion]) -> Result<(), StoreError> {
        if questions.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let mut query_builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO bank_questions
                (id, competency, passage, prompt, options, best_answers,
                 second_best_answers, worst_answer, explanation) ",
        );
        query_builder.push_values(questions, |mut b, q| {
            b.push_bind(&q.id)
                .push_bind(&q.competency)
                .push_bind(&q.passage)
                .push_bind(&q.prompt)
                .push_bind(Json(&q.options))
                .push_bind(Json(&q.best_answers))
                .push_bind(Json(&q.second_best_answers))
                .push_bind(&q.worst_answer)
                .push_bind(&q.explanation);
        });
        query_builder.push(" ON CONFLICT (id) DO NOTHING RETURNING competency");

        // Counters move by what was actually inserted, so re-saving a batch is harmless.
        let inserted: Vec<String> = query_builder
            .build_query_scalar()
            .fetch_all(&mut *tx)
            .await?;

        let mut counts = count_by_competency(inserted.iter().map(String::as_str));
        if !inserted.is_empty() {
            counts.insert(TOTAL_COUNTER_KEY.to_string(), inserted.len() as i64);
        }

        for (key, delta) in counts {
            sqlx::query(
                r#"
                INSERT INTO bank_counters (key, count)
                VALUES ($1, $2)
                ON CONFLICT (key) DO UPDATE SET count = bank_counters.count + EXCLUDED.count
                "#,
            )
            .bind(&key)
            .bind(delta)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!("Saved {} new questions to the bank", inserted.len());
        Ok(())
    }

    async fn stats(&self) -> Result<BankStats, StoreError> {
        let rows = sqlx::query_as::<_, CounterRow>("SELECT key, count FROM bank_counters")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = BankStats::default();
        for row in rows {
            if row.key == TOTAL_COUNTER_KEY {
                stats.total = row.count;
            } else {
                stats.per_competency.insert(row.key, row.count);
            }
        }
        Ok(stats)
    }

    async fn seen_ids(&self, user_id: &str) -> Result<HashSet<String>, StoreError> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT question_id FROM seen_questions WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn mark_seen(&self, user_id: &str, question_ids: &[String]) -> Result<(), StoreError> {
        if question_ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO seen_questions (user_id, question_id)
            SELECT $1, UNNEST($2::TEXT[])
            ON CONFLICT (user_id, question_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(question_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::fixtures::tiered;

    #[test]
    fn counts_batch_by_competency() {
        let batch = vec![tiered("a", "X"), tiered("b", "Y"), tiered("c", "X")];
        let counts = count_by_competency(batch.iter().map(|q| q.competency.as_str()));
        assert_eq!(counts["X"], 2);
        assert_eq!(counts["Y"], 1);
    }
}

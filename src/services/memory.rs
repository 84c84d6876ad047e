// src/services/memory.rs

//! In-process stores, used when no database is configured and in tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::models::question::QuizQuestion;
use crate::models::result::{BankStats, QuizResult};
use crate::services::StoreError;
use crate::services::archive::ResultArchive;
use crate::services::bank::{QuestionBank, count_by_competency};

#[derive(Default)]
struct BankInner {
    questions: Vec<QuizQuestion>,
    counters: BTreeMap<String, i64>,
    total: i64,
    seen: HashMap<String, HashSet<String>>,
}

/// Question bank kept in memory. Inserts and counter bumps happen under one lock.
#[derive(Default)]
pub struct MemoryQuestionBank {
    inner: Mutex<BankInner>,
}

impl MemoryQuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bank pre-filled with `questions`.
    pub fn with_questions(questions: Vec<QuizQuestion>) -> Self {
        let mut inner = BankInner::default();
        Self::insert_into(&mut inner, &questions);
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BankInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError("question bank lock poisoned".to_string()))
    }

    /// Adds questions not present yet and bumps the counters. Returns how many were added.
    fn insert_into(inner: &mut BankInner, questions: &[QuizQuestion]) -> usize {
        let fresh: Vec<QuizQuestion> = questions
            .iter()
            .filter(|q| !inner.questions.iter().any(|existing| existing.id == q.id))
            .cloned()
            .collect();

        for (competency, n) in count_by_competency(fresh.iter().map(|q| q.competency.as_str())) {
            *inner.counters.entry(competency).or_insert(0) += n;
        }
        inner.total += fresh.len() as i64;
        let added = fresh.len();
        inner.questions.extend(fresh);
        added
    }
}

#[async_trait]
impl QuestionBank for MemoryQuestionBank {
    async fn fetch_unseen(
        &self,
        competency: &str,
        exclude: &HashSet<String>,
        count: usize,
    ) -> Result<Vec<QuizQuestion>, StoreError> {
        let inner = self.lock()?;
        let mut candidates: Vec<&QuizQuestion> = inner
            .questions
            .iter()
            .filter(|q| q.competency == competency && !exclude.contains(&q.id))
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        Ok(candidates.into_iter().take(count).cloned().collect())
    }

    async fn save_batch(&self, questions: &[QuizQuestion]) -> Result<(), StoreError> {
        let added = Self::insert_into(&mut *self.lock()?, questions);
        tracing::info!("Saved {} new questions to the bank", added);
        Ok(())
    }

    async fn stats(&self) -> Result<BankStats, StoreError> {
        let inner = self.lock()?;
        Ok(BankStats {
            total: inner.total,
            per_competency: inner.counters.clone(),
        })
    }

    async fn seen_ids(&self, user_id: &str) -> Result<HashSet<String>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.seen.get(user_id).cloned().unwrap_or_default())
    }

    async fn mark_seen(&self, user_id: &str, question_ids: &[String]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .seen
            .entry(user_id.to_string())
            .or_default()
            .extend(question_ids.iter().cloned());
        Ok(())
    }
}

/// Result archive kept in memory.
#[derive(Default)]
pub struct MemoryResultArchive {
    results: Mutex<Vec<QuizResult>>,
}

impl MemoryResultArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultArchive for MemoryResultArchive {
    async fn save(&self, result: &QuizResult) -> Result<(), StoreError> {
        let mut results = self
            .results
            .lock()
            .map_err(|_| StoreError("result archive lock poisoned".to_string()))?;
        if !results.iter().any(|r| r.id == result.id) {
            results.push(result.clone());
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<QuizResult>, StoreError> {
        let results = self
            .results
            .lock()
            .map_err(|_| StoreError("result archive lock poisoned".to_string()))?;
        Ok(results.iter().filter(|r| r.user_id == user_id).cloned().collect())
    }

    async fn get(&self, user_id: &str, id: &str) -> Result<Option<QuizResult>, StoreError> {
        let results = self
            .results
            .lock()
            .map_err(|_| StoreError("result archive lock poisoned".to_string()))?;
        Ok(results
            .iter()
            .find(|r| r.user_id == user_id && r.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::fixtures::tiered;

    #[tokio::test]
    async fn seen_questions_are_never_returned() {
        let bank = MemoryQuestionBank::with_questions(vec![
            tiered("old", "Leadership"),
            tiered("new", "Leadership"),
        ]);
        bank.mark_seen("u1", &["old".to_string()]).await.unwrap();
        let seen = bank.seen_ids("u1").await.unwrap();

        for _ in 0..20 {
            let got = bank.fetch_unseen("Leadership", &seen, 1).await.unwrap();
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].id, "new");
        }
    }

    #[tokio::test]
    async fn exhausted_competency_returns_nothing() {
        let bank = MemoryQuestionBank::with_questions(vec![tiered("a", "Leadership")]);
        let exclude: HashSet<String> = ["a".to_string()].into_iter().collect();
        assert!(bank.fetch_unseen("Leadership", &exclude, 1).await.unwrap().is_empty());
        assert!(bank.fetch_unseen("Integrity", &HashSet::new(), 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn counters_follow_saved_batches() {
        let bank = MemoryQuestionBank::new();
        bank.save_batch(&[tiered("a", "X"), tiered("b", "Y")]).await.unwrap();
        bank.save_batch(&[tiered("b", "Y"), tiered("c", "X")]).await.unwrap();

        let stats = bank.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.per_competency["X"], 2);
        assert_eq!(stats.per_competency["Y"], 1);
    }

    #[tokio::test]
    async fn poisoned_bank_reports_failed_saves() {
        let bank = MemoryQuestionBank::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = bank.inner.lock().unwrap();
            panic!("poison the bank lock");
        }));

        assert!(bank.save_batch(&[tiered("a", "X")]).await.is_err());
    }

    #[tokio::test]
    async fn seen_sets_are_per_user() {
        let bank = MemoryQuestionBank::new();
        bank.mark_seen("u1", &["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(bank.seen_ids("u1").await.unwrap().len(), 2);
        assert!(bank.seen_ids("u2").await.unwrap().is_empty());
    }
}

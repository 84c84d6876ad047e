// src/engine/attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::EngineError;
use crate::engine::scoring::{ScoreReport, ScoringScheme, score_attempt};
use crate::engine::selection::{Selection, ToggleOutcome};
use crate::models::question::QuizQuestion;

/// Frozen outcome of a submitted attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub submitted_at: DateTime<Utc>,
    pub elapsed_seconds: i64,
    pub report: ScoreReport,
}

/// One user's run through a fixed-size question set.
///
/// Selections change only through [`Attempt::toggle`] and only until
/// [`Attempt::submit`] succeeds; after that the attempt is read-only.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub id: Uuid,
    pub user_id: String,
    expected_questions: usize,
    questions: Vec<QuizQuestion>,
    selections: HashMap<String, Selection>,
    started_at: DateTime<Utc>,
    submission: Option<Submission>,
}

impl Attempt {
    pub fn new(user_id: impl Into<String>, expected_questions: usize, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            expected_questions,
            questions: Vec::with_capacity(expected_questions),
            selections: HashMap::new(),
            started_at: now,
            submission: None,
        }
    }

    /// Appends questions to the end of the set, shuffling each one's options.
    /// Already placed questions keep their position. Ignored once submitted.
    pub fn append_questions(&mut self, questions: Vec<QuizQuestion>) {
        if self.is_submitted() {
            return;
        }
        let mut rng = rand::thread_rng();
        for mut q in questions {
            if self.questions.iter().any(|existing| existing.id == q.id) {
                tracing::warn!("Skipping duplicate question {} in attempt {}", q.id, self.id);
                continue;
            }
            q.options.shuffle(&mut rng);
            self.questions.push(q);
        }
    }

    /// Toggles `option` on `question_id`. Every toggle after submission is rejected.
    pub fn toggle(&mut self, question_id: &str, option: &str) -> Result<ToggleOutcome, EngineError> {
        if self.is_submitted() {
            return Ok(ToggleOutcome::Rejected);
        }

        let question = self
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| EngineError::QuestionNotFound(question_id.to_string()))?;

        if !question.has_option(option) {
            return Err(EngineError::UnknownOption(option.to_string()));
        }

        let selection = self.selections.entry(question_id.to_string()).or_default();
        Ok(selection.toggle(option))
    }

    /// Questions that currently have both picks.
    pub fn answered_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| self.selections.get(&q.id).is_some_and(Selection::is_full))
            .count()
    }

    /// The whole set is present and every question has exactly two picks.
    pub fn is_finished(&self) -> bool {
        self.questions.len() == self.expected_questions
            && self.answered_count() == self.expected_questions
    }

    /// Scores and freezes the attempt.
    pub fn submit(
        &mut self,
        scheme: ScoringScheme,
        now: DateTime<Utc>,
    ) -> Result<&Submission, EngineError> {
        if self.is_submitted() {
            return Err(EngineError::AlreadySubmitted);
        }
        if !self.is_finished() {
            return Err(EngineError::Incomplete {
                answered: self.answered_count(),
                required: self.expected_questions,
            });
        }

        let report = score_attempt(&self.questions, &self.selections, scheme);
        let elapsed_seconds = (now - self.started_at).num_seconds().max(0);

        Ok(&*self.submission.insert(Submission {
            submitted_at: now,
            elapsed_seconds,
            report,
        }))
    }

    pub fn is_submitted(&self) -> bool {
        self.submission.is_some()
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    pub fn selections(&self) -> &HashMap<String, Selection> {
        &self.selections
    }

    pub fn selection(&self, question_id: &str) -> Option<&Selection> {
        self.selections.get(question_id)
    }

    pub fn expected_questions(&self) -> usize {
        self.expected_questions
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn question_ids(&self) -> Vec<String> {
        self.questions.iter().map(|q| q.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::fixtures::tiered;
    use chrono::Duration;

    fn attempt_with(n: usize) -> Attempt {
        let mut attempt = Attempt::new("user-1", n, Utc::now());
        attempt.append_questions((0..n).map(|i| tiered(&format!("q{}", i), "Leadership")).collect());
        attempt
    }

    fn answer_all(attempt: &mut Attempt, picks: [&str; 2]) {
        for id in attempt.question_ids() {
            for p in picks {
                attempt.toggle(&id, p).unwrap();
            }
        }
    }

    #[test]
    fn finished_only_when_every_question_has_two_picks() {
        let mut attempt = attempt_with(3);
        assert!(!attempt.is_finished());

        attempt.toggle("q0", "b1").unwrap();
        attempt.toggle("q0", "b2").unwrap();
        attempt.toggle("q1", "s1").unwrap();
        attempt.toggle("q1", "w").unwrap();
        attempt.toggle("q2", "b1").unwrap();
        assert!(!attempt.is_finished());

        attempt.toggle("q2", "s2").unwrap();
        assert!(attempt.is_finished());

        attempt.toggle("q1", "w").unwrap();
        assert!(!attempt.is_finished());
    }

    #[test]
    fn short_set_is_never_finished() {
        let mut attempt = Attempt::new("user-1", 3, Utc::now());
        attempt.append_questions(vec![tiered("q0", "A"), tiered("q1", "B")]);
        answer_all(&mut attempt, ["b1", "b2"]);
        assert!(!attempt.is_finished());
        assert_eq!(
            attempt.submit(ScoringScheme::Weighted, Utc::now()).unwrap_err(),
            EngineError::Incomplete { answered: 2, required: 3 }
        );
    }

    #[test]
    fn submit_freezes_selections() {
        let mut attempt = attempt_with(2);
        answer_all(&mut attempt, ["b1", "b2"]);

        let later = attempt.started_at() + Duration::seconds(95);
        let submission = attempt.submit(ScoringScheme::Weighted, later).unwrap();
        assert_eq!(submission.report.score, 100);
        assert_eq!(submission.elapsed_seconds, 95);

        assert_eq!(attempt.toggle("q0", "b1").unwrap(), ToggleOutcome::Rejected);
        assert_eq!(attempt.selection("q0").unwrap().len(), 2);
        assert_eq!(
            attempt.submit(ScoringScheme::Weighted, later).unwrap_err(),
            EngineError::AlreadySubmitted
        );
    }

    #[test]
    fn unknown_question_or_option_is_an_error() {
        let mut attempt = attempt_with(1);
        assert_eq!(
            attempt.toggle("missing", "b1").unwrap_err(),
            EngineError::QuestionNotFound("missing".to_string())
        );
        assert_eq!(
            attempt.toggle("q0", "nope").unwrap_err(),
            EngineError::UnknownOption("nope".to_string())
        );
    }

    #[test]
    fn appending_keeps_existing_order_and_skips_duplicates() {
        let mut attempt = Attempt::new("user-1", 4, Utc::now());
        attempt.append_questions(vec![tiered("a", "X"), tiered("b", "Y")]);
        attempt.append_questions(vec![tiered("c", "X"), tiered("a", "X"), tiered("d", "Y")]);
        assert_eq!(attempt.question_ids(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn shuffled_options_keep_the_same_set() {
        let attempt = attempt_with(1);
        let mut options = attempt.questions()[0].options.clone();
        options.sort();
        assert_eq!(options, vec!["b1", "b2", "s1", "s2", "w"]);
    }
}

// src/engine/session.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::config::QuizPlan;
use crate::engine::EngineError;
use crate::engine::attempt::Attempt;
use crate::engine::scoring::ScoringScheme;
use crate::engine::supply::{BANK_PHASE, GENERATION_PHASE, PhaseOutcome, Supplier};
use crate::engine::verification::verify_questions;
use crate::error::AppError;
use crate::models::question::{PublicQuestion, QuizQuestion};
use crate::models::result::QuizResult;
use crate::models::session::{
    AttemptView, SubmitResponse, ToggleResponse, VerificationStatus, VerificationView,
};
use crate::services::archive::ResultArchive;

pub const DEFAULT_TOPIC: &str = "Hybrid mock assessment";

/// Server-side state of one live attempt.
#[derive(Debug)]
pub struct Session {
    pub attempt: Attempt,
    pub user_name: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
    pub archived: bool,
    pub verification: Option<BTreeMap<String, Option<String>>>,
    last_touched: Instant,
}

impl Session {
    pub fn new(attempt: Attempt, user_name: Option<String>) -> Self {
        Self {
            attempt,
            user_name,
            loading: false,
            error: None,
            archived: false,
            verification: None,
            last_touched: Instant::now(),
        }
    }

    pub fn view(&self) -> AttemptView {
        let attempt = &self.attempt;
        let elapsed_seconds = match attempt.submission() {
            Some(s) => s.elapsed_seconds,
            None => (Utc::now() - attempt.started_at()).num_seconds().max(0),
        };
        AttemptView {
            attempt_id: attempt.id.to_string(),
            questions: attempt.questions().iter().map(PublicQuestion::from).collect(),
            selections: attempt.selections().clone(),
            answered: attempt.answered_count(),
            required: attempt.expected_questions(),
            finished: attempt.is_finished(),
            loading: self.loading,
            submitted: attempt.is_submitted(),
            score: attempt.submission().map(|s| s.report.score),
            elapsed_seconds,
            error: self.error.clone(),
        }
    }

    pub fn verification_view(&self) -> VerificationView {
        match &self.verification {
            None => VerificationView {
                status: VerificationStatus::NotStarted,
                results: BTreeMap::new(),
            },
            Some(slots) => VerificationView {
                status: if slots.values().all(Option::is_some) {
                    VerificationStatus::Complete
                } else {
                    VerificationStatus::Pending
                },
                results: slots.clone(),
            },
        }
    }
}

/// Live attempts keyed by attempt id.
///
/// The attempt id doubles as the identity token background work checks before
/// touching a session: once an attempt is removed, late results are dropped.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<Uuid, Session>>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, session: Session) -> Uuid {
        let id = session.attempt.id;
        self.lock().insert(id, session);
        id
    }

    /// Runs `f` on the user's session. Other users' attempts are reported as missing.
    pub fn with_session<R>(
        &self,
        id: Uuid,
        user_id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, EngineError> {
        let mut sessions = self.lock();
        match sessions.get_mut(&id) {
            Some(session) if session.attempt.user_id == user_id => {
                session.last_touched = Instant::now();
                Ok(f(session))
            }
            _ => Err(EngineError::AttemptNotFound(id)),
        }
    }

    pub fn remove(&self, id: Uuid, user_id: &str) -> Result<Session, EngineError> {
        let mut sessions = self.lock();
        match sessions.get(&id) {
            Some(session) if session.attempt.user_id == user_id => sessions
                .remove(&id)
                .ok_or(EngineError::AttemptNotFound(id)),
            _ => Err(EngineError::AttemptNotFound(id)),
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.lock().contains_key(&id)
    }

    /// Appends the background phase's questions in one update.
    ///
    /// Returns `false` and changes nothing when the attempt has been abandoned,
    /// expired or submitted in the meantime.
    pub fn apply_generation(&self, id: Uuid, outcome: &PhaseOutcome) -> bool {
        let mut sessions = self.lock();
        let Some(session) = sessions.get_mut(&id) else {
            return false;
        };
        if session.attempt.is_submitted() {
            return false;
        }

        session.attempt.append_questions(outcome.questions());
        session.loading = false;

        let have = session.attempt.questions().len();
        let want = session.attempt.expected_questions();
        if have < want {
            let failed: Vec<&str> = outcome.failures.iter().map(|(c, _)| c.as_str()).collect();
            session.error = Some(format!(
                "Only {} of {} questions could be prepared (failed: {}). Please start a new quiz.",
                have,
                want,
                failed.join(", ")
            ));
        }
        true
    }

    /// Fills one verification slot, if the attempt is still live.
    pub fn record_verification(&self, id: Uuid, question_id: &str, text: String) {
        let mut sessions = self.lock();
        if let Some(slots) = sessions.get_mut(&id).and_then(|s| s.verification.as_mut()) {
            if let Some(slot) = slots.get_mut(question_id) {
                *slot = Some(text);
            }
        }
    }

    /// Drops sessions idle for longer than the TTL.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.last_touched.elapsed() < ttl);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Coordinates supply, selection, scoring, archiving and verification.
#[derive(Clone)]
pub struct QuizEngine {
    supplier: Supplier,
    archive: Arc<dyn ResultArchive>,
    sessions: SessionRegistry,
    plan: QuizPlan,
    scheme: ScoringScheme,
}

impl QuizEngine {
    pub fn new(
        supplier: Supplier,
        archive: Arc<dyn ResultArchive>,
        sessions: SessionRegistry,
        plan: QuizPlan,
        scheme: ScoringScheme,
    ) -> Self {
        Self {
            supplier,
            archive,
            sessions,
            plan,
            scheme,
        }
    }

    pub fn plan(&self) -> &QuizPlan {
        &self.plan
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn supplier(&self) -> &Supplier {
        &self.supplier
    }

    pub fn archive(&self) -> &Arc<dyn ResultArchive> {
        &self.archive
    }

    /// Starts an attempt.
    ///
    /// * Serves the bank phase before returning; fails if it cannot be filled.
    /// * Spawns the generation phase, which appends the rest of the set later.
    pub async fn start(
        &self,
        user_id: &str,
        user_name: Option<String>,
    ) -> Result<AttemptView, AppError> {
        let purged = self.sessions.purge_expired();
        if purged > 0 {
            tracing::info!("Purged {} expired quiz sessions", purged);
        }

        let seen = match self.supplier.bank().seen_ids(user_id).await {
            Ok(seen) => seen,
            Err(e) => {
                tracing::warn!("Could not load seen questions for {}: {}", user_id, e);
                HashSet::new()
            }
        };

        let first = self
            .supplier
            .supply_phase(
                &self.plan.competencies,
                self.plan.bank_per_competency,
                &seen,
                BANK_PHASE,
            )
            .await;

        self.archive_generated(first.generated());

        if first.supplied.len() < self.plan.initial_questions() {
            let failed: Vec<&str> = first.failures.iter().map(|(c, _)| c.as_str()).collect();
            return Err(AppError::UpstreamError(format!(
                "Could not prepare the quiz: no question available for {}",
                failed.join(", ")
            )));
        }

        let mut attempt = Attempt::new(user_id, self.plan.total_questions(), Utc::now());
        attempt.append_questions(first.questions());

        let mut exclude = seen;
        exclude.extend(attempt.question_ids());

        let mut session = Session::new(attempt, user_name);
        session.loading = self.plan.generated_per_competency > 0;
        let view = session.view();
        let attempt_id = self.sessions.insert(session);

        tracing::info!(
            "Started attempt {} for {} with {} questions",
            attempt_id,
            user_id,
            view.questions.len()
        );

        if self.plan.generated_per_competency > 0 {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.run_generation_phase(attempt_id, exclude).await;
            });
        }

        Ok(view)
    }

    async fn run_generation_phase(&self, attempt_id: Uuid, exclude: HashSet<String>) {
        let outcome = self
            .supplier
            .supply_phase(
                &self.plan.competencies,
                self.plan.generated_per_competency,
                &exclude,
                GENERATION_PHASE,
            )
            .await;

        if self.sessions.apply_generation(attempt_id, &outcome) {
            tracing::info!(
                "Appended {} generated questions to attempt {}",
                outcome.supplied.len(),
                attempt_id
            );
        } else {
            tracing::info!(
                "Discarded {} late questions for closed attempt {}",
                outcome.supplied.len(),
                attempt_id
            );
        }

        self.archive_generated(outcome.generated());
    }

    /// Saves generated questions to the bank without waiting on the result.
    fn archive_generated(&self, questions: Vec<QuizQuestion>) {
        if questions.is_empty() {
            return;
        }
        let bank = Arc::clone(self.supplier.bank());
        tokio::spawn(async move {
            if let Err(e) = bank.save_batch(&questions).await {
                tracing::error!("Failed to save {} generated questions: {}", questions.len(), e);
            }
        });
    }

    pub fn view(&self, attempt_id: Uuid, user_id: &str) -> Result<AttemptView, AppError> {
        Ok(self.sessions.with_session(attempt_id, user_id, |s| s.view())?)
    }

    pub fn toggle(
        &self,
        attempt_id: Uuid,
        user_id: &str,
        question_id: &str,
        option: &str,
    ) -> Result<ToggleResponse, AppError> {
        let response = self.sessions.with_session(attempt_id, user_id, |s| {
            let outcome = s.attempt.toggle(question_id, option)?;
            Ok::<_, EngineError>(ToggleResponse {
                outcome,
                question_id: question_id.to_string(),
                selection: s.attempt.selection(question_id).cloned().unwrap_or_default(),
                finished: s.attempt.is_finished(),
            })
        })??;
        Ok(response)
    }

    /// Scores and archives an attempt.
    ///
    /// Scoring happens once. If archiving fails the error is returned, the
    /// attempt stays submitted, and calling submit again retries only the
    /// archive write.
    pub async fn submit(&self, attempt_id: Uuid, user_id: &str) -> Result<SubmitResponse, AppError> {
        let scheme = self.scheme;
        let (record, response, first_submission) =
            self.sessions.with_session(attempt_id, user_id, |s| {
                if s.archived {
                    return Err(EngineError::AlreadySubmitted);
                }
                let first_submission = !s.attempt.is_submitted();
                if first_submission {
                    s.attempt.submit(scheme, Utc::now())?;
                    s.verification = Some(
                        s.attempt
                            .question_ids()
                            .into_iter()
                            .map(|id| (id, None))
                            .collect(),
                    );
                }
                let submission = s
                    .attempt
                    .submission()
                    .cloned()
                    .ok_or(EngineError::AlreadySubmitted)?;

                let record = QuizResult {
                    id: s.attempt.id.to_string(),
                    user_id: s.attempt.user_id.clone(),
                    user_name: s.user_name.clone(),
                    topic: DEFAULT_TOPIC.to_string(),
                    questions: s.attempt.questions().to_vec(),
                    selections: s.attempt.selections().clone(),
                    score: submission.report.score as i32,
                    correct_count: submission.report.correct_count as i32,
                    total_questions: submission.report.total_questions as i32,
                    competency_scores: submission.report.competencies.clone(),
                    elapsed_seconds: submission.elapsed_seconds,
                    created_at: submission.submitted_at,
                };
                let response = SubmitResponse {
                    attempt_id: record.id.clone(),
                    report: submission.report,
                    elapsed_seconds: submission.elapsed_seconds,
                    submitted_at: submission.submitted_at,
                    questions: record.questions.clone(),
                    selections: record.selections.clone(),
                };
                Ok((record, response, first_submission))
            })??;

        if first_submission {
            tracing::info!(
                "Attempt {} submitted by {} with score {}",
                attempt_id,
                user_id,
                response.report.score
            );
            self.spawn_verification(attempt_id, record.questions.clone());
            self.mark_seen(user_id, &record).await;
        }

        self.archive.save(&record).await.map_err(|e| {
            tracing::error!("Failed to archive attempt {}: {}", attempt_id, e);
            AppError::InternalServerError(format!("Failed to save quiz result: {}", e))
        })?;

        // The attempt may have been abandoned while the write was in flight.
        let _ = self
            .sessions
            .with_session(attempt_id, user_id, |s| s.archived = true);

        Ok(response)
    }

    async fn mark_seen(&self, user_id: &str, record: &QuizResult) {
        let ids: Vec<String> = record.questions.iter().map(|q| q.id.clone()).collect();
        if let Err(e) = self.supplier.bank().mark_seen(user_id, &ids).await {
            tracing::warn!("Failed to mark questions seen for {}: {}", user_id, e);
        }
    }

    fn spawn_verification(&self, attempt_id: Uuid, questions: Vec<QuizQuestion>) {
        let generator = Arc::clone(self.supplier.generator());
        let permits = Arc::clone(self.supplier.permits());
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            verify_questions(generator, permits, questions, move |question_id, text| {
                sessions.record_verification(attempt_id, question_id, text);
            })
            .await;
        });
    }

    pub fn verification(&self, attempt_id: Uuid, user_id: &str) -> Result<VerificationView, AppError> {
        Ok(self
            .sessions
            .with_session(attempt_id, user_id, |s| s.verification_view())?)
    }

    /// Drops an attempt. Background results that arrive later are discarded.
    pub fn abandon(&self, attempt_id: Uuid, user_id: &str) -> Result<(), AppError> {
        self.sessions.remove(attempt_id, user_id)?;
        tracing::info!("Attempt {} abandoned by {}", attempt_id, user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::engine::selection::ToggleOutcome;
    use crate::engine::supply::testing::{BrokenBank, ScriptedGenerator};
    use crate::models::question::fixtures::tiered;
    use crate::models::result::AnswerSummary;
    use crate::services::bank::QuestionBank;
    use crate::services::generator::QuestionGenerator;
    use crate::services::memory::{MemoryQuestionBank, MemoryResultArchive};
    use crate::services::{StoreError, SupplyError};

    /// Archive whose first write fails.
    #[derive(Default)]
    struct FailOnceArchive {
        inner: MemoryResultArchive,
        failed: AtomicBool,
    }

    #[async_trait]
    impl ResultArchive for FailOnceArchive {
        async fn save(&self, result: &QuizResult) -> Result<(), StoreError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(StoreError("down".to_string()));
            }
            self.inner.save(result).await
        }

        async fn list_for_user(&self, user_id: &str) -> Result<Vec<QuizResult>, StoreError> {
            self.inner.list_for_user(user_id).await
        }

        async fn get(&self, user_id: &str, id: &str) -> Result<Option<QuizResult>, StoreError> {
            self.inner.get(user_id, id).await
        }
    }

    /// Generator that holds every call until the gate is opened.
    #[derive(Default)]
    struct GatedGenerator {
        gate: Notify,
        waiting: AtomicUsize,
    }

    #[async_trait]
    impl QuestionGenerator for GatedGenerator {
        async fn generate(&self, competency: &str) -> Result<QuizQuestion, SupplyError> {
            // Registered before counting, so opening the gate cannot be missed.
            let opened = self.gate.notified();
            let n = self.waiting.fetch_add(1, Ordering::SeqCst);
            opened.await;
            Ok(tiered(&format!("late-{}-{}", competency, n), competency))
        }

        async fn verify(&self, question: &QuizQuestion) -> Result<String, SupplyError> {
            Ok(format!("verified {}", question.id))
        }

        async fn analyze(
            &self,
            _competencies: &[String],
            _answers: &[AnswerSummary],
        ) -> Result<BTreeMap<String, String>, SupplyError> {
            Ok(BTreeMap::new())
        }
    }

    fn plan() -> QuizPlan {
        QuizPlan {
            competencies: ["A", "B", "C", "D", "E"].iter().map(|c| c.to_string()).collect(),
            bank_per_competency: 1,
            generated_per_competency: 1,
        }
    }

    fn build_engine(
        bank: Arc<dyn QuestionBank>,
        generator: Arc<dyn QuestionGenerator>,
        archive: Arc<dyn ResultArchive>,
    ) -> QuizEngine {
        QuizEngine::new(
            Supplier::new(bank, generator, 5),
            archive,
            SessionRegistry::new(Duration::from_secs(3600)),
            plan(),
            ScoringScheme::Weighted,
        )
    }

    fn engine_with(bank: Arc<dyn QuestionBank>, generator: ScriptedGenerator) -> QuizEngine {
        build_engine(bank, Arc::new(generator), Arc::new(MemoryResultArchive::new()))
    }

    fn stocked_bank() -> Arc<MemoryQuestionBank> {
        Arc::new(MemoryQuestionBank::with_questions(
            ["A", "B", "C", "D", "E"]
                .iter()
                .map(|c| tiered(&format!("bank-{}", c), c))
                .collect(),
        ))
    }

    async fn wait_until_loaded(engine: &QuizEngine, id: Uuid, user: &str) -> AttemptView {
        for _ in 0..200 {
            let view = engine.view(id, user).unwrap();
            if !view.loading {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("generation phase never finished");
    }

    fn answer_all_best(engine: &QuizEngine, id: Uuid, user: &str) {
        let view = engine.view(id, user).unwrap();
        for q in &view.questions {
            engine.toggle(id, user, &q.id, "b1").unwrap();
            engine.toggle(id, user, &q.id, "b2").unwrap();
        }
    }

    #[tokio::test]
    async fn full_attempt_flow() {
        let bank = stocked_bank();
        let engine = engine_with(bank.clone(), ScriptedGenerator::default());

        let started = engine.start("u1", Some("Kim".to_string())).await.unwrap();
        assert_eq!(started.questions.len(), 5);
        assert_eq!(started.required, 10);
        assert!(started.loading);
        let id = Uuid::parse_str(&started.attempt_id).unwrap();

        let loaded = wait_until_loaded(&engine, id, "u1").await;
        assert_eq!(loaded.questions.len(), 10);
        assert!(loaded.error.is_none());
        // The first five stay where they were.
        let first_ids: Vec<&String> = started.questions.iter().map(|q| &q.id).collect();
        let still: Vec<&String> = loaded.questions[..5].iter().map(|q| &q.id).collect();
        assert_eq!(first_ids, still);

        answer_all_best(&engine, id, "u1");
        assert!(engine.view(id, "u1").unwrap().finished);

        let submitted = engine.submit(id, "u1").await.unwrap();
        assert_eq!(submitted.report.score, 100);

        let archived = engine.archive().list_for_user("u1").await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].user_name.as_deref(), Some("Kim"));

        let seen = bank.seen_ids("u1").await.unwrap();
        assert_eq!(seen.len(), 10);

        let err = engine.submit(id, "u1").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn submit_before_finish_is_rejected() {
        let engine = engine_with(Arc::new(MemoryQuestionBank::new()), ScriptedGenerator::default());
        let started = engine.start("u1", None).await.unwrap();
        let id = Uuid::parse_str(&started.attempt_id).unwrap();
        wait_until_loaded(&engine, id, "u1").await;

        let err = engine.submit(id, "u1").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn start_fails_when_a_competency_cannot_be_supplied() {
        let engine = engine_with(Arc::new(BrokenBank), ScriptedGenerator::failing_for(&["B"]));
        let err = engine.start("u1", None).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(_)));
        assert!(engine.sessions().is_empty());
    }

    #[tokio::test]
    async fn short_generation_phase_sets_error_and_blocks_completion() {
        // D's only bank question is served in the first phase and generation for D always fails.
        let generator = ScriptedGenerator::failing_for(&["D"]);
        let bank = Arc::new(MemoryQuestionBank::with_questions(vec![tiered("bank-d", "D")]));
        let engine = engine_with(bank, generator);
        let started = engine.start("u2", None).await.unwrap();
        let id = Uuid::parse_str(&started.attempt_id).unwrap();
        let view = wait_until_loaded(&engine, id, "u2").await;

        assert_eq!(view.questions.len(), 9);
        assert!(view.error.is_some());
        answer_all_best(&engine, id, "u2");
        assert!(!engine.view(id, "u2").unwrap().finished);
    }

    #[tokio::test]
    async fn abandoned_attempt_ignores_late_questions() {
        let bank = stocked_bank();
        let generator = Arc::new(GatedGenerator::default());
        let engine = build_engine(
            bank.clone(),
            generator.clone(),
            Arc::new(MemoryResultArchive::new()),
        );
        let started = engine.start("u1", None).await.unwrap();
        let id = Uuid::parse_str(&started.attempt_id).unwrap();

        // Every competency's background generation is in flight.
        for _ in 0..200 {
            if generator.waiting.load(Ordering::SeqCst) == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(generator.waiting.load(Ordering::SeqCst), 5);

        engine.abandon(id, "u1").unwrap();
        generator.gate.notify_waiters();

        // The late questions still reach the bank.
        let mut total = 0;
        for _ in 0..200 {
            total = bank.stats().await.unwrap().total;
            if total == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(total, 10);
        assert!(!engine.sessions().contains(id));
        assert!(engine.view(id, "u1").is_err());
    }

    #[tokio::test]
    async fn failed_archive_write_is_reported_and_retried_once() {
        let engine = build_engine(
            Arc::new(MemoryQuestionBank::new()),
            Arc::new(ScriptedGenerator::default()),
            Arc::new(FailOnceArchive::default()),
        );
        let started = engine.start("u1", None).await.unwrap();
        let id = Uuid::parse_str(&started.attempt_id).unwrap();
        wait_until_loaded(&engine, id, "u1").await;
        answer_all_best(&engine, id, "u1");

        let first = engine.submit(id, "u1").await.unwrap_err();
        assert!(matches!(first, AppError::InternalServerError(_)));
        // Scored and frozen even though the write failed.
        let view = engine.view(id, "u1").unwrap();
        assert!(view.submitted);
        assert_eq!(view.score, Some(100));

        let retried = engine.submit(id, "u1").await.unwrap();
        assert_eq!(retried.report.score, 100);
        assert_eq!(engine.archive().list_for_user("u1").await.unwrap().len(), 1);

        let third = engine.submit(id, "u1").await.unwrap_err();
        assert!(matches!(third, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn other_users_cannot_touch_an_attempt() {
        let engine = engine_with(Arc::new(MemoryQuestionBank::new()), ScriptedGenerator::default());
        let started = engine.start("u1", None).await.unwrap();
        let id = Uuid::parse_str(&started.attempt_id).unwrap();
        let qid = started.questions[0].id.clone();

        assert!(matches!(engine.view(id, "u2"), Err(AppError::NotFound(_))));
        assert!(engine.toggle(id, "u2", &qid, "b1").is_err());
        assert!(engine.abandon(id, "u2").is_err());
        assert!(engine.sessions().contains(id));
    }

    #[tokio::test]
    async fn third_pick_is_rejected_through_the_engine() {
        let engine = engine_with(Arc::new(MemoryQuestionBank::new()), ScriptedGenerator::default());
        let started = engine.start("u1", None).await.unwrap();
        let id = Uuid::parse_str(&started.attempt_id).unwrap();
        let qid = started.questions[0].id.clone();

        engine.toggle(id, "u1", &qid, "b1").unwrap();
        engine.toggle(id, "u1", &qid, "s1").unwrap();
        let third = engine.toggle(id, "u1", &qid, "w").unwrap();
        assert_eq!(third.outcome, ToggleOutcome::Rejected);
        assert_eq!(third.selection.as_slice(), ["b1".to_string(), "s1".to_string()]);
    }

    #[tokio::test]
    async fn verification_slots_fill_after_submit() {
        let engine = engine_with(Arc::new(MemoryQuestionBank::new()), ScriptedGenerator::default());
        let started = engine.start("u1", None).await.unwrap();
        let id = Uuid::parse_str(&started.attempt_id).unwrap();
        wait_until_loaded(&engine, id, "u1").await;
        assert_eq!(
            engine.verification(id, "u1").unwrap().status,
            VerificationStatus::NotStarted
        );

        answer_all_best(&engine, id, "u1");
        engine.submit(id, "u1").await.unwrap();

        let mut view = engine.verification(id, "u1").unwrap();
        for _ in 0..200 {
            if view.status == VerificationStatus::Complete {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            view = engine.verification(id, "u1").unwrap();
        }
        assert_eq!(view.status, VerificationStatus::Complete);
        assert_eq!(view.results.len(), 10);
    }

    #[test]
    fn expired_sessions_are_purged() {
        let registry = SessionRegistry::new(Duration::from_secs(0));
        registry.insert(Session::new(Attempt::new("u1", 10, Utc::now()), None));
        assert_eq!(registry.purge_expired(), 1);
        assert!(registry.is_empty());
    }
}

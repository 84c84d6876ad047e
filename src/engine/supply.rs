// src/engine/supply.rs

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::models::question::QuizQuestion;
use crate::services::SupplyError;
use crate::services::bank::QuestionBank;
use crate::services::generator::QuestionGenerator;

/// One way of obtaining a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyStrategy {
    /// Read an unseen question from the bank.
    Bank,
    /// Ask the generator for a new one.
    Generate,
}

/// Fast path served before the attempt is shown: bank first, live generation if the bank has nothing.
pub const BANK_PHASE: &[SupplyStrategy] = &[SupplyStrategy::Bank, SupplyStrategy::Generate];

/// Background path: fresh questions, then the bank, then one more generation try.
pub const GENERATION_PHASE: &[SupplyStrategy] = &[
    SupplyStrategy::Generate,
    SupplyStrategy::Bank,
    SupplyStrategy::Generate,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Bank,
    Generated,
}

#[derive(Debug, Clone)]
pub struct Supplied {
    pub question: QuizQuestion,
    pub origin: Origin,
}

/// Result of one phase, in competency order.
#[derive(Debug, Default)]
pub struct PhaseOutcome {
    pub supplied: Vec<Supplied>,
    pub failures: Vec<(String, SupplyError)>,
}

impl PhaseOutcome {
    pub fn questions(&self) -> Vec<QuizQuestion> {
        self.supplied.iter().map(|s| s.question.clone()).collect()
    }

    /// Questions that came from the generator and are not in the bank yet.
    pub fn generated(&self) -> Vec<QuizQuestion> {
        self.supplied
            .iter()
            .filter(|s| s.origin == Origin::Generated)
            .map(|s| s.question.clone())
            .collect()
    }
}

/// Obtains questions by trying strategies in order.
///
/// Generator calls share one semaphore, so fan-out never exceeds the
/// configured number of concurrent generations.
#[derive(Clone)]
pub struct Supplier {
    bank: Arc<dyn QuestionBank>,
    generator: Arc<dyn QuestionGenerator>,
    permits: Arc<Semaphore>,
}

impl Supplier {
    pub fn new(
        bank: Arc<dyn QuestionBank>,
        generator: Arc<dyn QuestionGenerator>,
        max_concurrent_generations: usize,
    ) -> Self {
        Self {
            bank,
            generator,
            permits: Arc::new(Semaphore::new(max_concurrent_generations.max(1))),
        }
    }

    pub fn bank(&self) -> &Arc<dyn QuestionBank> {
        &self.bank
    }

    pub fn generator(&self) -> &Arc<dyn QuestionGenerator> {
        &self.generator
    }

    pub fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    async fn try_strategy(
        &self,
        strategy: SupplyStrategy,
        competency: &str,
        exclude: &HashSet<String>,
    ) -> Result<Supplied, SupplyError> {
        match strategy {
            SupplyStrategy::Bank => {
                let mut found = self.bank.fetch_unseen(competency, exclude, 1).await?;
                found
                    .pop()
                    .map(|question| Supplied {
                        question,
                        origin: Origin::Bank,
                    })
                    .ok_or_else(|| SupplyError::Exhausted(competency.to_string()))
            }
            SupplyStrategy::Generate => {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| SupplyError::Generation(e.to_string()))?;
                let question = self.generator.generate(competency).await?;
                if exclude.contains(&question.id) {
                    return Err(SupplyError::InvalidSchema(format!(
                        "generator returned already served id {}",
                        question.id
                    )));
                }
                Ok(Supplied {
                    question,
                    origin: Origin::Generated,
                })
            }
        }
    }

    /// Tries `strategies` in order until one yields a question.
    pub async fn supply_one(
        &self,
        competency: &str,
        exclude: &HashSet<String>,
        strategies: &[SupplyStrategy],
    ) -> Result<Supplied, SupplyError> {
        for strategy in strategies {
            match self.try_strategy(*strategy, competency, exclude).await {
                Ok(supplied) => return Ok(supplied),
                Err(e) => {
                    tracing::warn!("{:?} supply for '{}' failed: {}", strategy, competency, e);
                }
            }
        }
        Err(SupplyError::Exhausted(competency.to_string()))
    }

    /// Supplies `per_competency` questions for every competency.
    ///
    /// Competencies run concurrently; the slots of one competency run in turn so
    /// the same bank question is never handed out twice. Returns once every
    /// competency has finished.
    pub async fn supply_phase(
        &self,
        competencies: &[String],
        per_competency: usize,
        exclude: &HashSet<String>,
        strategies: &'static [SupplyStrategy],
    ) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();
        if per_competency == 0 || competencies.is_empty() {
            return outcome;
        }

        let exclude = Arc::new(exclude.clone());
        let mut tasks = JoinSet::new();

        for (index, competency) in competencies.iter().enumerate() {
            let supplier = self.clone();
            let competency = competency.clone();
            let exclude = Arc::clone(&exclude);

            tasks.spawn(async move {
                let mut local_exclude = (*exclude).clone();
                let mut results = Vec::with_capacity(per_competency);
                for _ in 0..per_competency {
                    let result = supplier.supply_one(&competency, &local_exclude, strategies).await;
                    if let Ok(supplied) = &result {
                        local_exclude.insert(supplied.question.id.clone());
                    }
                    results.push(result);
                }
                (index, results)
            });
        }

        let mut by_index: Vec<Option<Vec<Result<Supplied, SupplyError>>>> =
            (0..competencies.len()).map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, results)) => by_index[index] = Some(results),
                Err(e) => tracing::error!("Supply task failed: {:?}", e),
            }
        }

        for (competency, results) in competencies.iter().zip(by_index) {
            let results = results.unwrap_or_else(|| {
                (0..per_competency)
                    .map(|_| Err(SupplyError::Exhausted(competency.clone())))
                    .collect()
            });
            for result in results {
                match result {
                    Ok(supplied) => outcome.supplied.push(supplied),
                    Err(e) => outcome.failures.push((competency.clone(), e)),
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::models::question::QuizQuestion;
    use crate::models::question::fixtures::tiered;
    use crate::models::result::{AnswerSummary, BankStats};
    use crate::services::bank::QuestionBank;
    use crate::services::generator::QuestionGenerator;
    use crate::services::{StoreError, SupplyError};

    /// Generator that succeeds except for the listed competencies.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        pub failing: Mutex<HashSet<String>>,
        pub fail_verification: bool,
        pub calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        pub fn failing_for(competencies: &[&str]) -> Self {
            Self {
                failing: Mutex::new(competencies.iter().map(|c| c.to_string()).collect()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl QuestionGenerator for ScriptedGenerator {
        async fn generate(&self, competency: &str) -> Result<QuizQuestion, SupplyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.lock().unwrap().contains(competency) {
                return Err(SupplyError::Generation("scripted failure".to_string()));
            }
            Ok(tiered(&format!("gen-{}-{}", competency, n), competency))
        }

        async fn verify(&self, question: &QuizQuestion) -> Result<String, SupplyError> {
            if self.fail_verification {
                return Err(SupplyError::Generation("scripted failure".to_string()));
            }
            Ok(format!("verified {}", question.id))
        }

        async fn analyze(
            &self,
            competencies: &[String],
            _answers: &[AnswerSummary],
        ) -> Result<BTreeMap<String, String>, SupplyError> {
            Ok(competencies.iter().map(|c| (c.clone(), "steady".to_string())).collect())
        }
    }

    /// Bank whose every call fails.
    pub struct BrokenBank;

    #[async_trait]
    impl QuestionBank for BrokenBank {
        async fn fetch_unseen(
            &self,
            _competency: &str,
            _exclude: &HashSet<String>,
            _count: usize,
        ) -> Result<Vec<QuizQuestion>, StoreError> {
            Err(StoreError("connection refused".to_string()))
        }

        async fn save_batch(&self, _questions: &[QuizQuestion]) -> Result<(), StoreError> {
            Err(StoreError("connection refused".to_string()))
        }

        async fn stats(&self) -> Result<BankStats, StoreError> {
            Err(StoreError("connection refused".to_string()))
        }

        async fn seen_ids(&self, _user_id: &str) -> Result<HashSet<String>, StoreError> {
            Err(StoreError("connection refused".to_string()))
        }

        async fn mark_seen(&self, _user_id: &str, _ids: &[String]) -> Result<(), StoreError> {
            Err(StoreError("connection refused".to_string()))
        }
    }
}

// src/engine/verification.rs

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::models::question::QuizQuestion;
use crate::services::generator::QuestionGenerator;

/// Shown in place of a verification that could not be obtained.
pub const VERIFICATION_FALLBACK: &str = "Verification failed.";

/// Verifies every question concurrently.
///
/// Each result is handed to `sink` as soon as it resolves, so slots fill in
/// independently. Failures are reported through `sink` as
/// [`VERIFICATION_FALLBACK`]; this function itself never fails.
pub async fn verify_questions<F>(
    generator: Arc<dyn QuestionGenerator>,
    permits: Arc<Semaphore>,
    questions: Vec<QuizQuestion>,
    sink: F,
) where
    F: Fn(&str, String) + Send + Sync + 'static,
{
    let sink = Arc::new(sink);
    let mut tasks = JoinSet::new();

    for question in questions {
        let generator = Arc::clone(&generator);
        let permits = Arc::clone(&permits);
        let sink = Arc::clone(&sink);

        tasks.spawn(async move {
            let text = match permits.acquire().await {
                Ok(_permit) => match generator.verify(&question).await {
                    Ok(text) if !text.trim().is_empty() => text,
                    Ok(_) => VERIFICATION_FALLBACK.to_string(),
                    Err(e) => {
                        tracing::warn!("Verification of {} failed: {}", question.id, e);
                        VERIFICATION_FALLBACK.to_string()
                    }
                },
                Err(_) => VERIFICATION_FALLBACK.to_string(),
            };
            sink(&question.id, text);
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Verification task failed: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::engine::supply::testing::ScriptedGenerator;
    use crate::models::question::fixtures::tiered;

    async fn run(generator: ScriptedGenerator) -> HashMap<String, String> {
        let slots = Arc::new(Mutex::new(HashMap::new()));
        let sink_slots = Arc::clone(&slots);
        verify_questions(
            Arc::new(generator),
            Arc::new(Semaphore::new(2)),
            vec![tiered("q1", "A"), tiered("q2", "B"), tiered("q3", "C")],
            move |id, text| {
                sink_slots.lock().unwrap().insert(id.to_string(), text);
            },
        )
        .await;
        let result = slots.lock().unwrap().clone();
        result
    }

    #[tokio::test]
    async fn every_question_gets_its_own_slot() {
        let slots = run(ScriptedGenerator::default()).await;
        assert_eq!(slots.len(), 3);
        assert_eq!(slots["q2"], "verified q2");
    }

    #[tokio::test]
    async fn failures_become_the_fallback_text() {
        let generator = ScriptedGenerator {
            fail_verification: true,
            ..Default::default()
        };
        let slots = run(generator).await;
        assert_eq!(slots.len(), 3);
        assert!(slots.values().all(|t| t == VERIFICATION_FALLBACK));
    }
}

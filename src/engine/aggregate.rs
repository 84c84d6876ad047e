// src/engine/aggregate.rs

use std::collections::BTreeMap;

use crate::models::result::{AnswerSummary, CompetencyStat, CompetencyStatsResponse, QuizResult};

/// How many answered questions feed the competency analysis.
pub const ANALYSIS_QUESTION_LIMIT: usize = 30;

fn rounded_mean(total: i64, count: i64) -> i64 {
    if count == 0 {
        return 0;
    }
    (total as f64 / count as f64).round() as i64
}

/// Per-competency historical averages over a user's archived attempts.
///
/// Every configured competency is listed, in configuration order, even without
/// attempts. Competencies found only in old results are appended after them.
pub fn competency_stats(results: &[QuizResult], competencies: &[String]) -> CompetencyStatsResponse {
    let mut totals: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    for result in results {
        for (competency, sub) in &result.competency_scores {
            let entry = totals.entry(competency.as_str()).or_insert((0, 0));
            entry.0 += i64::from(sub.score);
            entry.1 += 1;
        }
    }

    let stat = |competency: &str, (total, attempts): (i64, i64)| CompetencyStat {
        competency: competency.to_string(),
        total_score: total,
        attempts,
        average: rounded_mean(total, attempts),
    };

    let mut stats: Vec<CompetencyStat> = competencies
        .iter()
        .map(|c| stat(c, totals.remove(c.as_str()).unwrap_or((0, 0))))
        .collect();
    stats.extend(totals.into_iter().map(|(c, t)| stat(c, t)));

    let attempts = results.len() as i64;
    let score_total: i64 = results.iter().map(|r| i64::from(r.score)).sum();

    CompetencyStatsResponse {
        attempts,
        average_score: rounded_mean(score_total, attempts),
        competencies: stats,
    }
}

/// Condenses the most recent answered questions, newest attempt first.
pub fn answer_summaries(results: &[QuizResult], limit: usize) -> Vec<AnswerSummary> {
    let mut ordered: Vec<&QuizResult> = results.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    ordered
        .into_iter()
        .flat_map(|result| {
            result.questions.iter().filter_map(move |q| {
                let picks = result.selections.get(&q.id)?;
                Some(AnswerSummary {
                    competency: q.competency.clone(),
                    user_choices: picks.as_slice().to_vec(),
                    best: q.best_answers.clone(),
                    second_best: q.second_best_answers.clone(),
                    worst: q.worst_answer.clone(),
                })
            })
        })
        .take(limit)
        .collect()
}

// src/models/result.rs

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::scoring::CompetencyScore;
use crate::engine::selection::Selection;
use crate::models::question::QuizQuestion;

/// A completed attempt as stored in the result archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResult {
    /// Same value as the attempt id.
    pub id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub topic: String,
    pub questions: Vec<QuizQuestion>,
    pub selections: HashMap<String, Selection>,
    pub score: i32,
    pub correct_count: i32,
    pub total_questions: i32,
    /// Sub-scores per competency, denormalised so statistics need no rescoring.
    pub competency_scores: BTreeMap<String, CompetencyScore>,
    pub elapsed_seconds: i64,
    pub created_at: DateTime<Utc>,
}

/// Row of the user's history list.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    pub id: String,
    pub topic: String,
    pub score: i32,
    pub correct_count: i32,
    pub total_questions: i32,
    pub elapsed_seconds: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&QuizResult> for ResultSummary {
    fn from(r: &QuizResult) -> Self {
        Self {
            id: r.id.clone(),
            topic: r.topic.clone(),
            score: r.score,
            correct_count: r.correct_count,
            total_questions: r.total_questions,
            elapsed_seconds: r.elapsed_seconds,
            created_at: r.created_at,
        }
    }
}

/// Historical average for one competency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetencyStat {
    pub competency: String,
    pub total_score: i64,
    pub attempts: i64,
    /// Rounded mean of the per-attempt sub-scores; 0 without attempts.
    pub average: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompetencyStatsResponse {
    pub attempts: i64,
    pub average_score: i64,
    pub competencies: Vec<CompetencyStat>,
}

/// One answered question, condensed for the competency analysis prompt.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerSummary {
    pub competency: String,
    pub user_choices: Vec<String>,
    pub best: Vec<String>,
    pub second_best: Vec<String>,
    pub worst: Option<String>,
}

/// Question counts held by the bank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BankStats {
    pub total: i64,
    pub per_competency: BTreeMap<String, i64>,
}

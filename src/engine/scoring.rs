// src/engine/scoring.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::selection::Selection;
use crate::models::question::QuizQuestion;

pub const BEST_POINTS: u32 = 3;
pub const SECOND_BEST_POINTS: u32 = 2;
pub const WORST_POINTS: u32 = 1;

/// Both best answers picked.
pub const MAX_POINTS_PER_QUESTION: u32 = 2 * BEST_POINTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringScheme {
    /// A question counts only when the picked pair equals the best pair.
    Exact,
    /// Every picked option earns tiered partial credit.
    #[default]
    Weighted,
}

impl ScoringScheme {
    /// Weighted scoring is forced as soon as any question carries answer tiers.
    pub fn resolve(self, questions: &[QuizQuestion]) -> Self {
        if questions.iter().any(QuizQuestion::is_tiered) {
            ScoringScheme::Weighted
        } else {
            self
        }
    }
}

impl FromStr for ScoringScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(ScoringScheme::Exact),
            "weighted" => Ok(ScoringScheme::Weighted),
            other => Err(format!("unknown scoring scheme '{}'", other)),
        }
    }
}

impl fmt::Display for ScoringScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringScheme::Exact => write!(f, "exact"),
            ScoringScheme::Weighted => write!(f, "weighted"),
        }
    }
}

/// Score for the questions of a single competency within one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetencyScore {
    pub points: u32,
    pub max_points: u32,
    pub questions: u32,
    /// 0..=100
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub scheme: ScoringScheme,
    /// 0..=100
    pub score: u32,
    pub total_points: u32,
    pub max_points: u32,
    /// Questions where exactly the best pair was picked.
    pub correct_count: u32,
    pub total_questions: u32,
    pub competencies: BTreeMap<String, CompetencyScore>,
}

/// Points earned by one question's picks under the weighted scheme.
pub fn weighted_points(question: &QuizQuestion, selection: &Selection) -> u32 {
    selection
        .iter()
        .map(|picked| {
            if question.best_answers.contains(picked) {
                BEST_POINTS
            } else if question.second_best_answers.contains(picked) {
                SECOND_BEST_POINTS
            } else if question.worst_answer.as_deref() == Some(picked.as_str()) {
                WORST_POINTS
            } else {
                0
            }
        })
        .sum()
}

/// Order-independent equality between the picks and the best pair.
pub fn is_exact_match(question: &QuizQuestion, selection: &Selection) -> bool {
    selection.len() == question.best_answers.len()
        && question.best_answers.iter().all(|b| selection.contains(b))
}

fn percentage(earned: u32, possible: u32) -> u32 {
    if possible == 0 {
        return 0;
    }
    (100.0 * f64::from(earned) / f64::from(possible)).round() as u32
}

/// Scores an attempt. Pure over `(questions, selections)`.
pub fn score_attempt(
    questions: &[QuizQuestion],
    selections: &HashMap<String, Selection>,
    scheme: ScoringScheme,
) -> ScoreReport {
    let scheme = scheme.resolve(questions);
    let empty = Selection::default();

    let mut total_points = 0;
    let mut max_points = 0;
    let mut correct_count = 0;
    let mut competencies: BTreeMap<String, CompetencyScore> = BTreeMap::new();

    for question in questions {
        let selection = selections.get(&question.id).unwrap_or(&empty);
        let exact = is_exact_match(question, selection);

        let (earned, possible) = match scheme {
            ScoringScheme::Weighted => (weighted_points(question, selection), MAX_POINTS_PER_QUESTION),
            ScoringScheme::Exact => (u32::from(exact), 1),
        };

        total_points += earned;
        max_points += possible;
        if exact {
            correct_count += 1;
        }

        let entry = competencies
            .entry(question.competency.clone())
            .or_insert(CompetencyScore {
                points: 0,
                max_points: 0,
                questions: 0,
                score: 0,
            });
        entry.points += earned;
        entry.max_points += possible;
        entry.questions += 1;
    }

    for entry in competencies.values_mut() {
        entry.score = percentage(entry.points, entry.max_points);
    }

    ScoreReport {
        scheme,
        score: percentage(total_points, max_points),
        total_points,
        max_points,
        correct_count,
        total_questions: questions.len() as u32,
        competencies,
    }
}

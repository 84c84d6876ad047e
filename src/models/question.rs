// src/models/question.rs

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::html::contains_markup;

/// Number of options a tiered question carries.
pub const OPTION_COUNT: usize = 5;

/// Number of options the user picks, and the size of each answer tier pair.
pub const PICKS_PER_QUESTION: usize = 2;

/// A scenario question. Immutable once created.
///
/// Questions from the older two-tier format simply have no second-best answers
/// and no worst answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,

    /// Competency label this question evaluates.
    pub competency: String,

    /// Scenario text.
    pub passage: String,

    /// The question stem.
    pub prompt: String,

    /// Display order is not meaningful; answers are matched by text.
    pub options: Vec<String>,

    pub best_answers: Vec<String>,

    #[serde(default)]
    pub second_best_answers: Vec<String>,

    #[serde(default)]
    pub worst_answer: Option<String>,

    pub explanation: String,
}

impl QuizQuestion {
    /// True when the question carries second-best / worst tiers.
    pub fn is_tiered(&self) -> bool {
        !self.second_best_answers.is_empty() || self.worst_answer.is_some()
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    /// Checks the answer tiers against the options.
    ///
    /// * every tier is a subset of `options`
    /// * tiers are pairwise disjoint
    /// * `best_answers` has exactly two entries, `second_best_answers` zero or two
    /// * tiered questions have exactly five distinct options
    pub fn check_tiers(&self) -> Result<(), String> {
        let options: HashSet<&str> = self.options.iter().map(String::as_str).collect();
        if options.len() != self.options.len() {
            return Err("options must be distinct".to_string());
        }

        if self.best_answers.len() != PICKS_PER_QUESTION {
            return Err(format!(
                "expected {} best answers, got {}",
                PICKS_PER_QUESTION,
                self.best_answers.len()
            ));
        }

        if !self.second_best_answers.is_empty()
            && self.second_best_answers.len() != PICKS_PER_QUESTION
        {
            return Err(format!(
                "expected {} second-best answers, got {}",
                PICKS_PER_QUESTION,
                self.second_best_answers.len()
            ));
        }

        if self.is_tiered() && self.options.len() != OPTION_COUNT {
            return Err(format!(
                "expected {} options, got {}",
                OPTION_COUNT,
                self.options.len()
            ));
        }

        let mut tiered: HashSet<&str> = HashSet::new();
        let all = self
            .best_answers
            .iter()
            .chain(self.second_best_answers.iter())
            .chain(self.worst_answer.iter());
        for answer in all {
            if !options.contains(answer.as_str()) {
                return Err(format!("answer '{}' is not one of the options", answer));
            }
            if !tiered.insert(answer.as_str()) {
                return Err(format!("answer '{}' appears in more than one tier", answer));
            }
        }

        Ok(())
    }
}

/// Question view served while an attempt is in progress (answers and explanation hidden).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub competency: String,
    pub passage: String,
    pub prompt: String,
    pub options: Vec<String>,
}

impl From<&QuizQuestion> for PublicQuestion {
    fn from(q: &QuizQuestion) -> Self {
        Self {
            id: q.id.clone(),
            competency: q.competency.clone(),
            passage: q.passage.clone(),
            prompt: q.prompt.clone(),
            options: q.options.clone(),
        }
    }
}

/// Shape the question provider must return.
#[derive(Debug, Deserialize, Validate)]
pub struct GeneratedQuestion {
    #[validate(length(min = 1, max = 100))]
    pub competency: String,
    #[validate(length(min = 1, max = 5000))]
    pub passage: String,
    #[validate(length(min = 1, max = 1000))]
    pub prompt: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(length(equal = 2))]
    pub best_answers: Vec<String>,
    #[validate(length(equal = 2))]
    pub second_best_answers: Vec<String>,
    #[validate(length(min = 1, max = 500))]
    pub worst_answer: String,
    #[validate(length(min = 1, max = 10000))]
    pub explanation: String,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTION_COUNT {
        return Err(validator::ValidationError::new("options_must_have_five_entries"));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

impl GeneratedQuestion {
    /// Validates the payload and turns it into a question with a fresh id.
    ///
    /// The provider is asked for a specific competency; a payload labelled with
    /// another one is rejected.
    pub fn into_question(self, expected_competency: &str) -> Result<QuizQuestion, String> {
        self.validate().map_err(|e| e.to_string())?;

        if self.competency.trim() != expected_competency {
            return Err(format!(
                "asked for competency '{}', got '{}'",
                expected_competency, self.competency
            ));
        }

        let text_fields = [&self.passage, &self.prompt, &self.worst_answer, &self.explanation]
            .into_iter()
            .chain(self.options.iter())
            .chain(self.best_answers.iter())
            .chain(self.second_best_answers.iter());
        for text in text_fields {
            if contains_markup(text) {
                return Err(format!("text contains markup: '{}'", text));
            }
        }

        let question = QuizQuestion {
            id: uuid::Uuid::new_v4().to_string(),
            competency: expected_competency.to_string(),
            passage: self.passage,
            prompt: self.prompt,
            options: self.options,
            best_answers: self.best_answers,
            second_best_answers: self.second_best_answers,
            worst_answer: Some(self.worst_answer),
            explanation: self.explanation,
        };

        question.check_tiers()?;
        Ok(question)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn generated() -> GeneratedQuestion {
        GeneratedQuestion {
            competency: "Managerial Integrity".to_string(),
            passage: "A vendor offers gift cards to the team.".to_string(),
            prompt: "Pick the two most appropriate actions.".to_string(),
            options: vec!["a", "b", "c", "d", "e"].into_iter().map(String::from).collect(),
            best_answers: vec!["a".to_string(), "b".to_string()],
            second_best_answers: vec!["c".to_string(), "d".to_string()],
            worst_answer: "e".to_string(),
            explanation: "Declining and reporting is required.".to_string(),
        }
    }

    #[test]
    fn valid_payload_becomes_question() {
        let q = generated().into_question("Managerial Integrity").unwrap();
        assert!(q.is_tiered());
        assert_eq!(q.options.len(), OPTION_COUNT);
        assert!(uuid::Uuid::parse_str(&q.id).is_ok());
    }

    #[test]
    fn wrong_option_count_is_rejected() {
        let mut g = generated();
        g.options.pop();
        assert!(g.into_question("Managerial Integrity").is_err());
    }

    #[test]
    fn overlapping_tiers_are_rejected() {
        let mut g = generated();
        g.worst_answer = "a".to_string();
        let err = g.into_question("Managerial Integrity").unwrap_err();
        assert!(err.contains("more than one tier"));
    }

    #[test]
    fn answer_outside_options_is_rejected() {
        let mut g = generated();
        g.best_answers[1] = "z".to_string();
        assert!(g.into_question("Managerial Integrity").is_err());
    }

    #[test]
    fn mismatched_competency_is_rejected() {
        assert!(generated().into_question("Situational Response").is_err());
    }

    #[test]
    fn markup_in_generated_text_is_rejected() {
        let mut g = generated();
        g.passage = "Alarm<script>alert(1)</script> sounds".to_string();
        let err = g.into_question("Managerial Integrity").unwrap_err();
        assert!(err.contains("markup"));
    }

    #[test]
    fn ampersands_and_comparisons_survive_unchanged() {
        let mut g = generated();
        g.passage = "Costs rose 5% & margins < 3%.".to_string();
        g.options[0] = "Report & log".to_string();
        g.best_answers[0] = "Report & log".to_string();
        let q = g.into_question("Managerial Integrity").unwrap();
        assert_eq!(q.passage, "Costs rose 5% & margins < 3%.");
        assert_eq!(q.options[0], "Report & log");
        assert_eq!(q.best_answers[0], "Report & log");
    }

    #[test]
    fn two_tier_question_is_accepted() {
        let q = QuizQuestion {
            id: "legacy".to_string(),
            competency: "Situational Response".to_string(),
            passage: "p".to_string(),
            prompt: "q".to_string(),
            options: vec!["a", "b", "c", "d"].into_iter().map(String::from).collect(),
            best_answers: vec!["a".to_string(), "c".to_string()],
            second_best_answers: vec![],
            worst_answer: None,
            explanation: "e".to_string(),
        };
        assert!(!q.is_tiered());
        assert!(q.check_tiers().is_ok());
    }
}

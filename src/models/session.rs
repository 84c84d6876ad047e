// src/models/session.rs

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::engine::scoring::ScoreReport;
use crate::engine::selection::{Selection, ToggleOutcome};
use crate::models::question::{PublicQuestion, QuizQuestion};

/// State of an attempt as the client sees it.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptView {
    pub attempt_id: String,
    pub questions: Vec<PublicQuestion>,
    pub selections: HashMap<String, Selection>,
    pub answered: usize,
    pub required: usize,
    /// Every question present and answered; submission is allowed.
    pub finished: bool,
    /// Background generation has not delivered yet.
    pub loading: bool,
    pub submitted: bool,
    pub score: Option<u32>,
    pub elapsed_seconds: i64,
    /// Set when the attempt can no longer be completed.
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ToggleRequest {
    #[validate(length(min = 1, max = 64))]
    pub question_id: String,
    #[validate(length(min = 1, max = 2000))]
    pub option: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToggleResponse {
    pub outcome: ToggleOutcome,
    pub question_id: String,
    pub selection: Selection,
    pub finished: bool,
}

/// Returned by submit; includes answers and explanations.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub attempt_id: String,
    pub report: ScoreReport,
    pub elapsed_seconds: i64,
    pub submitted_at: DateTime<Utc>,
    pub questions: Vec<QuizQuestion>,
    pub selections: HashMap<String, Selection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    NotStarted,
    Pending,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationView {
    pub status: VerificationStatus,
    /// Question id to verification text; `None` until that question resolves.
    pub results: BTreeMap<String, Option<String>>,
}

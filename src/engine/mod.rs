// src/engine/mod.rs

//! Quiz session engine: selection state, scoring, question supply and
//! post-submission verification.

pub mod aggregate;
pub mod attempt;
pub mod scoring;
pub mod selection;
pub mod session;
pub mod supply;
pub mod verification;

use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    AttemptNotFound(Uuid),
    QuestionNotFound(String),
    UnknownOption(String),
    AlreadySubmitted,
    /// Submission attempted before every question has two picks.
    Incomplete { answered: usize, required: usize },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::AttemptNotFound(id) => write!(f, "Attempt {} not found", id),
            EngineError::QuestionNotFound(id) => {
                write!(f, "Question {} is not part of this attempt", id)
            }
            EngineError::UnknownOption(opt) => {
                write!(f, "'{}' is not an option of this question", opt)
            }
            EngineError::AlreadySubmitted => write!(f, "Attempt has already been submitted"),
            EngineError::Incomplete { answered, required } => write!(
                f,
                "Attempt is not finished: {} of {} questions have two answers",
                answered, required
            ),
        }
    }
}

impl std::error::Error for EngineError {}

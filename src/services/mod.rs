// src/services/mod.rs

//! Clients for the collaborators the engine talks to: the question
//! generator, the question bank and the result archive.

pub mod archive;
pub mod bank;
pub mod generator;
pub mod memory;

use std::fmt;

/// Failure to obtain a question for one competency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplyError {
    /// The generator call failed (network, status, empty reply).
    Generation(String),
    /// The generator replied but the payload broke the question schema.
    InvalidSchema(String),
    /// The bank could not be read.
    Bank(String),
    /// Every strategy was tried for this competency and none produced a question.
    Exhausted(String),
}

impl fmt::Display for SupplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupplyError::Generation(msg) => write!(f, "Question generation failed: {}", msg),
            SupplyError::InvalidSchema(msg) => {
                write!(f, "Generated question does not match the schema: {}", msg)
            }
            SupplyError::Bank(msg) => write!(f, "Question bank unavailable: {}", msg),
            SupplyError::Exhausted(competency) => {
                write!(f, "Could not supply a question for '{}'", competency)
            }
        }
    }
}

impl std::error::Error for SupplyError {}

impl From<reqwest::Error> for SupplyError {
    fn from(err: reqwest::Error) -> Self {
        SupplyError::Generation(err.to_string())
    }
}

impl From<serde_json::Error> for SupplyError {
    fn from(err: serde_json::Error) -> Self {
        SupplyError::InvalidSchema(err.to_string())
    }
}

impl From<StoreError> for SupplyError {
    fn from(err: StoreError) -> Self {
        SupplyError::Bank(err.0)
    }
}

/// Failure of the bank or the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError(err.to_string())
    }
}

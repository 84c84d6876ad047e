// src/handlers/bank.rs

use axum::{Json, extract::State, response::IntoResponse};

use crate::{engine::session::QuizEngine, error::AppError};

/// Question counts per competency, read from the bank counters.
pub async fn get_bank_stats(
    State(engine): State<QuizEngine>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.supplier().bank().stats().await?))
}

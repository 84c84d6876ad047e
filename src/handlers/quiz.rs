// src/handlers/quiz.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    engine::session::QuizEngine, error::AppError, models::session::ToggleRequest,
    utils::jwt::Claims,
};

fn parse_attempt_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid attempt id: {}", raw)))
}

/// Starts a new attempt for the caller.
///
/// * Serves one bank question per competency before responding.
/// * The generated questions follow in the background; poll the attempt
///   until `loading` is false.
/// * 502 when the first phase cannot be filled.
pub async fn start_quiz(
    State(engine): State<QuizEngine>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let view = engine.start(&claims.sub, claims.name.clone()).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Current state of an attempt. Answers stay hidden until submission.
pub async fn get_attempt(
    State(engine): State<QuizEngine>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_attempt_id(&id)?;
    Ok(Json(engine.view(id, &claims.sub)?))
}

/// Adds or removes one option from a question's selection.
///
/// A third pick is not an error: the response reports `rejected` and the
/// unchanged selection.
pub async fn toggle_option(
    State(engine): State<QuizEngine>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<ToggleRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let id = parse_attempt_id(&id)?;

    let response = engine.toggle(id, &claims.sub, &payload.question_id, &payload.option)?;
    Ok(Json(response))
}

/// Scores, archives and starts verification for a finished attempt.
pub async fn submit_quiz(
    State(engine): State<QuizEngine>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_attempt_id(&id)?;
    Ok(Json(engine.submit(id, &claims.sub).await?))
}

pub async fn get_verification(
    State(engine): State<QuizEngine>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_attempt_id(&id)?;
    Ok(Json(engine.verification(id, &claims.sub)?))
}

/// Abandons an attempt; background results that arrive afterwards are dropped.
pub async fn abandon_quiz(
    State(engine): State<QuizEngine>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_attempt_id(&id)?;
    engine.abandon(id, &claims.sub)?;
    Ok(StatusCode::NO_CONTENT)
}

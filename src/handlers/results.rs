// src/handlers/results.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    engine::{
        aggregate::{ANALYSIS_QUESTION_LIMIT, answer_summaries, competency_stats},
        session::QuizEngine,
    },
    error::AppError,
    models::result::ResultSummary,
    services::archive::newest_first,
    utils::jwt::Claims,
};

/// Lists the caller's archived attempts, newest first.
pub async fn list_results(
    State(engine): State<QuizEngine>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let results = newest_first(engine.archive().list_for_user(&claims.sub).await?);
    let summaries: Vec<ResultSummary> = results.iter().map(ResultSummary::from).collect();
    Ok(Json(summaries))
}

/// Read-only replay of one archived attempt, answers included.
pub async fn get_result(
    State(engine): State<QuizEngine>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let result = engine
        .archive()
        .get(&claims.sub, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Result {} not found", id)))?;
    Ok(Json(result))
}

/// Per-competency averages over the caller's history.
pub async fn get_stats(
    State(engine): State<QuizEngine>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let results = engine.archive().list_for_user(&claims.sub).await?;
    Ok(Json(competency_stats(&results, &engine.plan().competencies)))
}

/// Written analysis per competency, based on the most recent answers.
///
/// With no history there is nothing to analyse and the generator is not called.
pub async fn get_analysis(
    State(engine): State<QuizEngine>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let results = engine.archive().list_for_user(&claims.sub).await?;
    let answers = answer_summaries(&results, ANALYSIS_QUESTION_LIMIT);

    if answers.is_empty() {
        return Ok(Json(json!({
            "questions_considered": 0,
            "analysis": {},
        })));
    }

    let analysis = engine
        .supplier()
        .generator()
        .analyze(&engine.plan().competencies, &answers)
        .await
        .map_err(|e| {
            tracing::warn!("Competency analysis failed for {}: {}", claims.sub, e);
            AppError::UpstreamError("Competency analysis is unavailable".to_string())
        })?;

    Ok(Json(json!({
        "questions_considered": answers.len(),
        "analysis": analysis,
    })))
}

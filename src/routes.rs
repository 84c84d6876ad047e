// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{bank, health, quiz, results},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (quiz, results, bank) behind the auth middleware.
/// * Leaves the health check public.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let quiz_routes = Router::new()
        .route("/start", post(quiz::start_quiz))
        .route("/{id}", get(quiz::get_attempt).delete(quiz::abandon_quiz))
        .route("/{id}/toggle", post(quiz::toggle_option))
        .route("/{id}/submit", post(quiz::submit_quiz))
        .route("/{id}/verification", get(quiz::get_verification));

    let result_routes = Router::new()
        .route("/", get(results::list_results))
        .route("/stats", get(results::get_stats))
        .route("/analysis", get(results::get_analysis))
        .route("/{id}", get(results::get_result));

    let bank_routes = Router::new().route("/stats", get(bank::get_bank_stats));

    let protected = Router::new()
        .nest("/api/quiz", quiz_routes)
        .nest("/api/results", result_routes)
        .nest("/api/bank", bank_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/api/health", get(health::health_check))
        .merge(protected)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

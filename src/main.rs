// src/main.rs

use dotenvy::dotenv;
use quizbank::config::Config;
use quizbank::engine::session::{QuizEngine, SessionRegistry};
use quizbank::engine::supply::Supplier;
use quizbank::routes;
use quizbank::services::archive::{PgResultArchive, ResultArchive};
use quizbank::services::bank::{PgQuestionBank, QuestionBank};
use quizbank::services::generator::GeminiGenerator;
use quizbank::services::memory::{MemoryQuestionBank, MemoryResultArchive};
use quizbank::state::AppState;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let (bank, archive): (Arc<dyn QuestionBank>, Arc<dyn ResultArchive>) =
        match &config.database_url {
            Some(url) => {
                let pool = connect_with_retry(url).await;
                (
                    Arc::new(PgQuestionBank::new(pool.clone())),
                    Arc::new(PgResultArchive::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory bank and archive");
                (
                    Arc::new(MemoryQuestionBank::new()),
                    Arc::new(MemoryResultArchive::new()),
                )
            }
        };

    let generator = Arc::new(GeminiGenerator::from_config(&config));
    let supplier = Supplier::new(bank, generator, config.max_concurrent_generations);
    let sessions = SessionRegistry::new(Duration::from_secs(config.session_ttl_secs));
    let engine = QuizEngine::new(
        supplier,
        archive,
        sessions,
        config.plan.clone(),
        config.scoring_scheme,
    );

    tracing::info!(
        "Quiz plan: {} competencies, {} questions per attempt, {} scoring",
        config.plan.competencies.len(),
        config.plan.total_questions(),
        config.scoring_scheme
    );

    // Create AppState
    let state = AppState {
        config: config.clone(),
        engine,
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listening address");

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}

/// Connects to Postgres, retrying while the database starts, then runs migrations.
async fn connect_with_retry(database_url: &str) -> PgPool {
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    pool
}

// src/config.rs

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;
use url::Url;

use crate::engine::scoring::ScoringScheme;

/// Competency labels used when `QUIZ_COMPETENCIES` is not set.
pub const DEFAULT_COMPETENCIES: [&str; 5] = [
    "Supervisory Leadership",
    "Responsibility and Initiative",
    "Managerial Integrity",
    "Business Awareness and Innovation",
    "Situational Response",
];

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// How many questions of each competency are served per attempt, and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizPlan {
    pub competencies: Vec<String>,
    /// Served immediately from the bank (or generated live as a fallback).
    pub bank_per_competency: usize,
    /// Generated in the background once the first questions are out.
    pub generated_per_competency: usize,
}

impl QuizPlan {
    /// Number of questions a complete attempt holds.
    pub fn total_questions(&self) -> usize {
        self.competencies.len() * (self.bank_per_competency + self.generated_per_competency)
    }

    pub fn initial_questions(&self) -> usize {
        self.competencies.len() * self.bank_per_competency
    }
}

impl Default for QuizPlan {
    fn default() -> Self {
        Self {
            competencies: DEFAULT_COMPETENCIES.iter().map(|c| c.to_string()).collect(),
            bank_per_competency: 1,
            generated_per_competency: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL. In-memory stores are used when absent.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub plan: QuizPlan,
    pub max_concurrent_generations: usize,
    pub session_ttl_secs: u64,
    pub scoring_scheme: ScoringScheme,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .expect("GEMINI_API_KEY must be set");

        let gemini_model = env::var("GEMINI_MODEL")
            .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());

        let gemini_base_url = env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string());
        if Url::parse(&gemini_base_url).is_err() {
            panic!("GEMINI_BASE_URL is not a valid URL: {}", gemini_base_url);
        }

        let competencies = env::var("QUIZ_COMPETENCIES")
            .ok()
            .map(|raw| parse_competencies(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| QuizPlan::default().competencies);

        let plan = QuizPlan {
            competencies,
            bank_per_competency: parse_or("QUIZ_BANK_PER_COMPETENCY", 1),
            generated_per_competency: parse_or("QUIZ_GENERATED_PER_COMPETENCY", 1),
        };

        let scoring_scheme = env::var("SCORING_SCHEME")
            .ok()
            .map(|raw| {
                raw.parse::<ScoringScheme>()
                    .unwrap_or_else(|e| panic!("Invalid SCORING_SCHEME: {}", e))
            })
            .unwrap_or_default();

        Self {
            database_url,
            jwt_secret,
            rust_log,
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            plan,
            max_concurrent_generations: parse_or("MAX_CONCURRENT_GENERATIONS", 5).max(1),
            session_ttl_secs: parse_or("SESSION_TTL_SECS", 7200),
            scoring_scheme,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{} must be a number, got '{}'", key, raw)),
        Err(_) => default,
    }
}

/// Splits a comma separated list, dropping blanks and duplicates while keeping order.
pub fn parse_competencies(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in raw.split(',').map(str::trim).filter(|l| !l.is_empty()) {
        if !out.iter().any(|seen| seen == label) {
            out.push(label.to_string());
        }
    }
    out
}

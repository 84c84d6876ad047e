// src/services/generator.rs

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value as JsonValue, json};

use crate::config::Config;
use crate::models::question::{GeneratedQuestion, QuizQuestion};
use crate::models::result::AnswerSummary;
use crate::services::SupplyError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Generative question provider.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Produces one new question for `competency`.
    async fn generate(&self, competency: &str) -> Result<QuizQuestion, SupplyError>;

    /// Asks the provider to sanity-check a question's tiering and explanation.
    async fn verify(&self, question: &QuizQuestion) -> Result<String, SupplyError>;

    /// Writes a short analysis per competency from a user's answer history.
    async fn analyze(
        &self,
        competencies: &[String],
        answers: &[AnswerSummary],
    ) -> Result<BTreeMap<String, String>, SupplyError>;
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(client: Client, api_key: String, model: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Client::new(),
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.gemini_base_url.clone(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Sends one request and returns the text of the first candidate.
    async fn generate_content(&self, payload: JsonValue) -> Result<String, SupplyError> {
        let res = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(SupplyError::Generation(format!("Gemini API error {}: {}", status, text)));
        }

        let body: JsonValue = res.json().await?;
        candidate_text(&body)
            .map(str::to_string)
            .ok_or_else(|| SupplyError::Generation("Gemini reply has no candidate text".to_string()))
    }
}

/// Extracts `candidates[0].content.parts[0].text`.
fn candidate_text(body: &JsonValue) -> Option<&str> {
    body.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
}

/// Response schema every generated question must satisfy.
pub fn question_schema() -> JsonValue {
    json!({
        "type": "OBJECT",
        "properties": {
            "competency": { "type": "STRING" },
            "passage": { "type": "STRING" },
            "prompt": { "type": "STRING" },
            "options": { "type": "ARRAY", "items": { "type": "STRING" } },
            "best_answers": { "type": "ARRAY", "items": { "type": "STRING" } },
            "second_best_answers": { "type": "ARRAY", "items": { "type": "STRING" } },
            "worst_answer": { "type": "STRING" },
            "explanation": { "type": "STRING" }
        },
        "required": [
            "competency", "passage", "prompt", "options",
            "best_answers", "second_best_answers", "worst_answer", "explanation"
        ]
    })
}

fn analysis_schema(competencies: &[String]) -> JsonValue {
    let properties: serde_json::Map<String, JsonValue> = competencies
        .iter()
        .map(|c| (c.clone(), json!({ "type": "STRING" })))
        .collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": competencies,
    })
}

/// Parses generator output text into a validated question.
pub fn parse_generated(text: &str, competency: &str) -> Result<QuizQuestion, SupplyError> {
    let raw: GeneratedQuestion = serde_json::from_str(text.trim())?;
    raw.into_question(competency).map_err(SupplyError::InvalidSchema)
}

const QUESTION_INSTRUCTION: &str = "You write situational-judgement questions for a \
public transit operator's managerial competency assessment. Scenarios are realistic, \
answers follow the operator's safety-first regulations, and the difficulty is high.";

const VERIFY_INSTRUCTION: &str = "You review generated assessment content. Judge \
objectively whether the answer tiers are justified and the explanation is consistent.";

const ANALYSIS_INSTRUCTION: &str = "You are an HR competency analyst. Base every \
statement on the supplied answer data and keep the tone constructive.";

#[async_trait]
impl QuestionGenerator for GeminiGenerator {
    async fn generate(&self, competency: &str) -> Result<QuizQuestion, SupplyError> {
        let prompt = format!(
            "Write exactly one question assessing '{competency}' and put '{competency}' in the \
             competency field. The passage is a plain workplace scenario. The prompt asks for the \
             two most appropriate actions. Give five distinct options: two best, two second best \
             and one worst answer that still looks reasonable. Explain every option."
        );

        let payload = json!({
            "systemInstruction": { "parts": [{ "text": QUESTION_INSTRUCTION }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": question_schema(),
                "temperature": 0.9
            }
        });

        let text = self.generate_content(payload).await?;
        let question = parse_generated(&text, competency)?;
        tracing::debug!("Generated question {} for '{}'", question.id, competency);
        Ok(question)
    }

    async fn verify(&self, question: &QuizQuestion) -> Result<String, SupplyError> {
        let prompt = format!(
            "Competency: {}\nPassage: {}\nQuestion: {}\nBest: {}\nSecond best: {}\nWorst: {}\n\
             Explanation: {}\n\nSummarise your verification in one or two sentences.",
            question.competency,
            question.passage,
            question.prompt,
            question.best_answers.join(", "),
            question.second_best_answers.join(", "),
            question.worst_answer.as_deref().unwrap_or("-"),
            question.explanation,
        );

        let payload = json!({
            "systemInstruction": { "parts": [{ "text": VERIFY_INSTRUCTION }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.5 }
        });

        let text = self.generate_content(payload).await?;
        Ok(text.trim().to_string())
    }

    async fn analyze(
        &self,
        competencies: &[String],
        answers: &[AnswerSummary],
    ) -> Result<BTreeMap<String, String>, SupplyError> {
        let prompt = format!(
            "Answer history ({} questions):\n{}\n\nFor each competency, write two or three \
             sentences on the candidate's judgement pattern compared with typical candidates.",
            answers.len(),
            serde_json::to_string_pretty(answers)?,
        );

        let payload = json!({
            "systemInstruction": { "parts": [{ "text": ANALYSIS_INSTRUCTION }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": analysis_schema(competencies),
                "temperature": 0.7
            }
        });

        let text = self.generate_content(payload).await?;
        let analysis: BTreeMap<String, String> = serde_json::from_str(text.trim())?;

        let missing: Vec<&String> = competencies
            .iter()
            .filter(|c| !analysis.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(SupplyError::InvalidSchema(format!(
                "analysis is missing competencies: {:?}",
                missing
            )));
        }

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "competency": "Situational Response",
        "passage": "Heavy rain floods an entrance during rush hour.",
        "prompt": "Choose the two most appropriate actions.",
        "options": ["close entrance", "report to control", "wait", "ask a colleague", "post on social media"],
        "best_answers": ["close entrance", "report to control"],
        "second_best_answers": ["wait", "ask a colleague"],
        "worst_answer": "post on social media",
        "explanation": "Safety comes first."
    }"#;

    #[test]
    fn parses_valid_payload() {
        let q = parse_generated(VALID, "Situational Response").unwrap();
        assert_eq!(q.best_answers.len(), 2);
        assert_eq!(q.worst_answer.as_deref(), Some("post on social media"));
    }

    #[test]
    fn missing_field_is_schema_violation() {
        let text = VALID.replace(r#""worst_answer": "post on social media","#, "");
        assert!(matches!(
            parse_generated(&text, "Situational Response"),
            Err(SupplyError::InvalidSchema(_))
        ));
    }

    #[test]
    fn malformed_json_is_schema_violation() {
        assert!(matches!(
            parse_generated("{not json", "Situational Response"),
            Err(SupplyError::InvalidSchema(_))
        ));
    }

    #[test]
    fn extracts_candidate_text() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "hello" }] } }]
        });
        assert_eq!(candidate_text(&body), Some("hello"));
        assert_eq!(candidate_text(&json!({ "candidates": [] })), None);
    }

    #[test]
    fn analysis_schema_requires_every_competency() {
        let schema = analysis_schema(&["A".to_string(), "B".to_string()]);
        assert_eq!(schema["required"], json!(["A", "B"]));
        assert_eq!(schema["properties"]["A"]["type"], "STRING");
    }

    #[test]
    fn endpoint_includes_model() {
        let g = GeminiGenerator::new(
            Client::new(),
            "key".to_string(),
            "gemini-2.5-flash".to_string(),
            "https://example.test/".to_string(),
        );
        assert_eq!(
            g.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}

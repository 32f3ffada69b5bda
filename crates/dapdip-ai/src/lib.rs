//! Thin client for the generative-AI API used for content moderation,
//! summaries, poll analysis, and semantic-search embeddings.
//!
//! The endpoint shape is the common completions/embeddings JSON API; the
//! base URL is configurable so self-hosted gateways work too. The client is
//! optional everywhere — callers hold an `Option<AiClient>` and skip the AI
//! path when it is `None`.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

mod prompts;

pub use prompts::{ANALYSIS_SYSTEM_PROMPT, MODERATION_SYSTEM_PROMPT, SUMMARY_SYSTEM_PROMPT};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected AI response: {0}")]
    Malformed(String),
}

/// Moderation verdict for a piece of user content.
#[derive(Debug, Clone, Deserialize)]
pub struct Verdict {
    pub flagged: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// None when `DAPDIP_AI_API_KEY` is unset — AI features are disabled.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("DAPDIP_AI_API_KEY").ok()?;
        let base_url =
            std::env::var("DAPDIP_AI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let model = std::env::var("DAPDIP_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Some(Self::new(base_url, api_key, model))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Moderate user content. The model must answer with strict JSON; a
    /// response we cannot parse is an error, never a silent pass.
    pub async fn moderate(&self, content: &str) -> Result<Verdict, AiError> {
        let raw = self.chat(MODERATION_SYSTEM_PROMPT, content).await?;
        parse_verdict(&raw)
    }

    pub async fn summarize(&self, content: &str) -> Result<String, AiError> {
        self.chat(SUMMARY_SYSTEM_PROMPT, content).await
    }

    /// Natural-language read of a poll's result distribution.
    pub async fn analyze_poll(
        &self,
        question: &str,
        tallies: &[(String, i64)],
    ) -> Result<String, AiError> {
        let mut input = format!("Question: {}\nResults:\n", question);
        for (label, votes) in tallies {
            input.push_str(&format!("- {}: {} votes\n", label, votes));
        }
        self.chat(ANALYSIS_SYSTEM_PROMPT, &input).await
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": EMBEDDING_MODEL,
            "input": text,
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AiError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let parsed: EmbeddingResponse = resp.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AiError::Malformed("empty embedding data".into()))
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, AiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        debug!("AI chat request to {} ({} input chars)", url, user.len());

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AiError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| AiError::Malformed("no choices in response".into()))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Models wrap JSON in markdown fences often enough that we strip them
/// before parsing.
fn parse_verdict(raw: &str) -> Result<Verdict, AiError> {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(trimmed)
        .map_err(|e| AiError::Malformed(format!("bad verdict JSON '{}': {}", trimmed, e)))
}

/// Cosine similarity between a query vector and a stored post vector.
/// Zero-magnitude or mismatched vectors score 0 and sort last.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_parses_plain_json() {
        let v = parse_verdict(r#"{"flagged": true, "reason": "spam"}"#).unwrap();
        assert!(v.flagged);
        assert_eq!(v.reason.as_deref(), Some("spam"));
    }

    #[test]
    fn verdict_parses_fenced_json() {
        let v = parse_verdict("```json\n{\"flagged\": false}\n```").unwrap();
        assert!(!v.flagged);
        assert!(v.reason.is_none());
    }

    #[test]
    fn garbage_verdict_is_an_error_not_a_pass() {
        assert!(parse_verdict("looks fine to me!").is_err());
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, 1.0, -0.25];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = AiClient::new("http://localhost:8081/", "key", "test-model");
        assert_eq!(client.base_url, "http://localhost:8081");
    }
}

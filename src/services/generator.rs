//! External item generator: trait seam plus the LLM-backed implementation.
//!
//! The engine only ever sees `Vec<RawCandidate>`; everything the model
//! returns is untrusted input that still has to pass normalization and the
//! novelty filter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::engine::normalize::RawCandidate;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Content excerpt the items must be grounded in.
    pub content: String,
    pub count: usize,
    pub topic_hints: Vec<String>,
    /// Per-topic difficulty target on the 0-5 scale, already clamped >= 0.
    pub difficulty_targets: Vec<(String, f64)>,
    /// Bounded sample of prior stems the generator should not reuse.
    pub avoid_stems: Vec<String>,
    /// Second-chance mode: demand strict JSON with no extra keys.
    pub strict: bool,
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
}

#[async_trait]
pub trait ItemGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<RawCandidate>, GeneratorError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

/// OpenAI-compatible chat-completions client with bounded retry.
#[derive(Clone)]
pub struct LlmGenerator {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmGenerator {
    pub fn from_env() -> Self {
        let api_key = env_string("LLM_API_KEY");
        let model = env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = normalize_endpoint(
            env_string("LLM_API_ENDPOINT")
                .or_else(|| env_string("LLM_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
        );
        let timeout = Duration::from_millis(env_u64("LLM_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config: LlmConfig { api_key, model, api_endpoint, timeout },
            client,
        }
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, GeneratorError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(GeneratorError::NotConfigured("LLM_API_KEY"))?;

        let url = format!("{}/chat/completions", self.config.api_endpoint.trim_end_matches('/'));
        let messages = [
            ChatMessage { role: "system".into(), content: system.into() },
            ChatMessage { role: "user".into(), content: user.into() },
        ];
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false
        });

        let response = self.post_with_retry(&url, api_key, &payload).await?;
        response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or(GeneratorError::EmptyChoices)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<ChatResponse, GeneratorError> {
        let mut last_error: Option<GeneratorError> = None;

        for retry in 0..=MAX_RETRIES {
            match self.client.post(url).bearer_auth(api_key).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return serde_json::from_slice(&bytes).map_err(GeneratorError::Json);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = GeneratorError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        warn!(retry, ?status, "generator request failed, retrying");
                        sleep(Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = GeneratorError::Request(e);
                    if retry < MAX_RETRIES {
                        warn!(retry, "generator request error, retrying");
                        sleep(Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(GeneratorError::NotConfigured("unknown")))
    }
}

#[async_trait]
impl ItemGenerator for LlmGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<RawCandidate>, GeneratorError> {
        let system = "You are an assessment author for a study platform. \
                      You write factual multiple-choice questions grounded only in the provided content.";
        let prompt = build_prompt(request);
        let raw = self.complete(system, &prompt).await?;
        Ok(extract_candidates(&parse_json_lenient(&raw)))
    }
}

fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::new();
    if request.strict {
        prompt.push_str(
            "Return STRICT JSON only, no markdown, matching this schema exactly: \
             {\"questions\":[{\"question\":\"...\",\"options\":[\"...\",\"...\",\"...\",\"...\"],\"correctIndex\":0,\"topic\":\"...\"}]}. \
             Do not add any keys beyond 'questions', 'question', 'options', 'correctIndex', 'topic'. ",
        );
    } else {
        prompt.push_str(
            "Create a multiple-choice quiz from the CONTENT below. \
             Each question must have exactly 4 options, a single correctIndex (0..3), \
             and a short 'topic' label naming the concept it tests. \
             Output strictly valid JSON matching this schema (no extra text): \
             {\"questions\":[{\"question\":\"...\",\"options\":[\"...\",\"...\",\"...\",\"...\"],\"correctIndex\":0,\"topic\":\"...\"}]}. ",
        );
    }
    prompt.push_str(&format!("Number of questions: {}. ", request.count));

    if !request.topic_hints.is_empty() {
        prompt.push_str(&format!(
            "Cover these topics where possible: {}. ",
            request.topic_hints.join(", ")
        ));
    }
    if !request.difficulty_targets.is_empty() {
        let targets: Vec<String> = request
            .difficulty_targets
            .iter()
            .map(|(topic, target)| format!("{topic}={target:.2}"))
            .collect();
        prompt.push_str(&format!(
            "Target difficulty per topic on a 0-5 scale: {}. ",
            targets.join(", ")
        ));
    }
    if !request.avoid_stems.is_empty() {
        prompt.push_str("Do not reuse or closely paraphrase any of these existing questions:\n");
        for stem in &request.avoid_stems {
            prompt.push_str(&format!("- {stem}\n"));
        }
    }

    prompt.push_str(&format!("\nCONTENT:\n{}", request.content));
    prompt
}

/// Lenient JSON parse: a straight parse first, then the largest bracketed
/// array or object embedded in free text. Anything unparseable becomes an
/// empty object, which yields zero candidates downstream.
pub fn parse_json_lenient(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }

    let array = slice_between(raw, '[', ']');
    let object = slice_between(raw, '{', '}');
    let candidate = match (array, object) {
        (Some(a), Some(o)) => Some(if a.len() >= o.len() { a } else { o }),
        (Some(a), None) => Some(a),
        (None, Some(o)) => Some(o),
        (None, None) => None,
    };

    candidate
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .unwrap_or_else(|| Value::Object(Default::default()))
}

fn slice_between(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let end = raw.rfind(close)?;
    (end > start).then(|| &raw[start..=end])
}

/// Tolerates the known response envelopes: `questions`, `items`,
/// `quiz.questions`, or a bare array.
pub fn extract_candidates(value: &Value) -> Vec<RawCandidate> {
    let list = match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("questions")
            .and_then(Value::as_array)
            .or_else(|| map.get("items").and_then(Value::as_array))
            .or_else(|| {
                map.get("quiz")
                    .and_then(|quiz| quiz.get("questions"))
                    .and_then(Value::as_array)
            }),
        _ => None,
    };

    list.map(|items| {
        items
            .iter()
            .filter(|entry| entry.is_object())
            .filter_map(|entry| serde_json::from_value::<RawCandidate>(entry.clone()).ok())
            .collect()
    })
    .unwrap_or_default()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

//! Gemini `generateContent` client
//!
//! One blocking POST per transform. No timeout is set; the capture
//! thread waits as long as the service takes.

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Credential, Model};
use crate::transform::Generator;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{}", describe_status(.code, .message))]
    Status { code: u16, message: String },
    #[error("Prompt blocked: {0}")]
    Blocked(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
}

fn describe_status(code: &u16, message: &str) -> String {
    let kind = match *code {
        401 | 403 => "Authentication failed",
        429 => "Quota exceeded",
        _ => "API error",
    };
    if message.is_empty() {
        format!("{} (HTTP {})", kind, code)
    } else {
        format!("{} (HTTP {}): {}", kind, code, message)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Text of the first candidate, parts concatenated. An empty string means
/// the service answered without text.
fn extract_text(body: &str) -> Result<String, GenerateError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| GenerateError::Malformed(e.to_string()))?;

    let Some(candidate) = response.candidates.into_iter().next() else {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(GenerateError::Blocked(reason));
        }
        return Ok(String::new());
    };

    Ok(candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
        .unwrap_or_default())
}

fn status_error(code: u16, body: &str) -> GenerateError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_default();
    GenerateError::Status { code, message }
}

pub struct GeminiClient {
    http: Client,
    credential: Credential,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(credential: Credential, endpoint: impl Into<String>) -> Result<Self, GenerateError> {
        let http = Client::builder().timeout(None::<Duration>).build()?;
        Ok(Self {
            http,
            credential,
            endpoint: endpoint.into(),
        })
    }

    fn url(&self, model: Model) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            model
        )
    }
}

impl Generator for GeminiClient {
    fn generate(&self, model: Model, prompt: &str) -> Result<String, GenerateError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(self.url(model))
            .header("x-goog-api-key", self.credential.expose())
            .json(&body)
            .send()?;

        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }
        extract_text(&text)
    }
}

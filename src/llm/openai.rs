//! OpenAI-compatible classifier implementation

use super::{ClassifierConfig, LlmError, SpecialtyClassifier, SPECIALITY_INFERENCE_PROMPT};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Classifier backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiClassifier {
    client: Client,
    api_key: Option<String>,
    model: String,
    url: String,
}

impl OpenAiClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key: config.api_key.clone(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            url: format!("{base}/chat/completions"),
        }
    }
}

#[async_trait]
impl SpecialtyClassifier for OpenAiClassifier {
    async fn classify(&self, symptoms: &str) -> Result<String, LlmError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(LlmError::auth("no API key configured"));
        };

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SPECIALITY_INFERENCE_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: symptoms,
                },
            ],
            temperature: 0.7,
            max_tokens: 50,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::network(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = classify_status(status, &text);
            tracing::warn!(
                status = %status,
                retryable = err.kind.is_retryable(),
                "classifier request failed"
            );
            return Err(err);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::unknown(format!("malformed response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| LlmError::unknown("response contained no choices"))
    }
}

fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let message = format!("HTTP {status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::auth(message),
        StatusCode::TOO_MANY_REQUESTS => LlmError::rate_limit(message),
        StatusCode::BAD_REQUEST => LlmError::invalid_request(message),
        s if s.is_server_error() => LlmError::server_error(message),
        _ => LlmError::unknown(message),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

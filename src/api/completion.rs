//! Chat completion client
//!
//! Wraps one HTTPS POST to an OpenRouter-compatible completion endpoint,
//! optionally consuming the streamed SSE body. On provider/model
//! unavailability the same request is retried against a fixed fallback
//! model list, at most twice, before surfacing a readable error.

use crate::api::{stream, ApiError};
use crate::utils::logger;
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::{json, Value};

pub const DEFAULT_COMPLETION_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model: best balance of speed, cost and quality
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Models tried in order when the primary model's provider rejects a request
pub const FALLBACK_MODELS: [&str; 6] = [
    "anthropic/claude-3-haiku",
    "openai/gpt-4o-mini",
    "anthropic/claude-3.5-sonnet",
    "openai/gpt-4-turbo",
    "google/gemini-2.0-flash-exp:free",
    "meta-llama/llama-3.2-3b-instruct:free",
];

/// Total attempts = 1 primary + up to 2 fallback retries
const MAX_RETRIES: usize = 2;

const SYSTEM_PROMPT: &str = "You are Glimpse, an AI assistant with strong expertise in \
programming, technology and general knowledge. Write production-quality code with proper \
error handling, explain your reasoning step by step, and format answers as markdown with \
fenced code blocks for code. You can answer in English or Arabic based on the user's \
language. Be precise, thorough, and helpful.";

/// Whether a request is a normal user turn or an internal analyzer call.
///
/// Internal calls never receive the system persona prompt; the distinction
/// is an explicit parameter, never inferred from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    User,
    Internal,
}

#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub kind: RequestKind,
}

impl CompletionOptions {
    /// Streaming user-facing chat turn
    pub fn chat(model: &str) -> Self {
        Self {
            model: model.to_string(),
            temperature: 0.3,
            max_tokens: 1024,
            stream: true,
            kind: RequestKind::User,
        }
    }

    /// Low-temperature internal analyzer call
    pub fn internal(model: &str, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            temperature: 0.1,
            max_tokens,
            stream: false,
            kind: RequestKind::Internal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl CompletionClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: crate::api::http_client(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Send one completion request, returning the full response text.
    ///
    /// When `options.stream` is set and a chunk callback is supplied, text
    /// deltas are delivered through the callback as they arrive and the
    /// accumulated text is returned at completion.
    pub async fn send(
        &self,
        options: &CompletionOptions,
        turns: &[Value],
        mut on_chunk: Option<&mut dyn FnMut(&str)>,
    ) -> Result<String> {
        let messages = self.with_system_prompt(options, turns);

        for attempt in 0..=MAX_RETRIES {
            let model = if attempt == 0 {
                options.model.as_str()
            } else {
                FALLBACK_MODELS[(attempt - 1).min(FALLBACK_MODELS.len() - 1)]
            };

            let chunk_sink = on_chunk.as_deref_mut();
            match self.send_once(model, options, &messages, chunk_sink).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    let message = e.to_string();
                    if !provider_unavailable(&message) {
                        return Err(e.into());
                    }
                    if attempt < MAX_RETRIES {
                        logger::warn(&format!(
                            "model {} unavailable ({}), retrying with fallback",
                            model, message
                        ));
                        continue;
                    }
                    if message.contains("No endpoints found") {
                        return Err(anyhow!(
                            "Model not available. Please try a different model or check provider status."
                        ));
                    }
                    return Err(anyhow!(
                        "All models are temporarily unavailable. Please try again in a few moments."
                    ));
                }
            }
        }
        unreachable!("retry loop always returns")
    }

    async fn send_once(
        &self,
        model: &str,
        options: &CompletionOptions,
        messages: &[Value],
        on_chunk: Option<&mut (dyn FnMut(&str) + '_)>,
    ) -> Result<String, ApiError> {
        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": options.stream,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = extract_error_message(&text).unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("request failed")
                )
            });
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        if options.stream {
            if let Some(on_chunk) = on_chunk {
                return stream::process_stream(response, on_chunk).await;
            }
            return stream::process_stream(response, |_| {}).await;
        }

        // Shape mismatches default to empty content rather than failing
        let payload: Value = response.json().await?;
        Ok(payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// Prepend the fixed system instruction unless the request is internal
    /// or already carries a system turn.
    fn with_system_prompt(&self, options: &CompletionOptions, turns: &[Value]) -> Vec<Value> {
        let has_system = turns.iter().any(|t| t["role"] == "system");
        if options.kind == RequestKind::Internal || has_system {
            return turns.to_vec();
        }
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(json!({"role": "system", "content": SYSTEM_PROMPT}));
        messages.extend_from_slice(turns);
        messages
    }
}

/// Detect provider/model unavailability from the upstream error message
fn provider_unavailable(message: &str) -> bool {
    message.contains("Provider returned error")
        || message.contains("provider")
        || message.contains("No endpoints found")
        || message.contains("404")
}

/// Pull a readable message out of an error response body, if it is JSON
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value["error"]["message"]
        .as_str()
        .or_else(|| value["message"].as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_prepended_for_user_requests() {
        let client = CompletionClient::new("http://localhost", "key");
        let opts = CompletionOptions::chat(DEFAULT_MODEL);
        let turns = vec![json!({"role": "user", "content": "hi"})];
        let messages = client.with_system_prompt(&opts, &turns);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
    }

    #[test]
    fn test_system_prompt_skipped_for_internal_requests() {
        let client = CompletionClient::new("http://localhost", "key");
        let opts = CompletionOptions::internal(DEFAULT_MODEL, 10);
        let turns = vec![json!({"role": "user", "content": "Answer with ONLY: YES or NO"})];
        let messages = client.with_system_prompt(&opts, &turns);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_system_prompt_not_duplicated() {
        let client = CompletionClient::new("http://localhost", "key");
        let opts = CompletionOptions::chat(DEFAULT_MODEL);
        let turns = vec![
            json!({"role": "system", "content": "custom persona"}),
            json!({"role": "user", "content": "hi"}),
        ];
        let messages = client.with_system_prompt(&opts, &turns);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"], "custom persona");
    }

    #[test]
    fn test_provider_unavailable_detection() {
        assert!(provider_unavailable("Provider returned error"));
        assert!(provider_unavailable("No endpoints found for model"));
        assert!(provider_unavailable("HTTP 404: Not Found"));
        assert!(!provider_unavailable("Rate limit exceeded"));
    }

    #[test]
    fn test_extract_error_message_shapes() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"boom"}}"#).as_deref(),
            Some("boom")
        );
        assert_eq!(
            extract_error_message(r#"{"message":"flat"}"#).as_deref(),
            Some("flat")
        );
        assert_eq!(extract_error_message("not json"), None);
    }

    #[test]
    fn test_chat_options_defaults() {
        let opts = CompletionOptions::chat(DEFAULT_MODEL);
        assert!(opts.stream);
        assert_eq!(opts.kind, RequestKind::User);
        assert_eq!(opts.max_tokens, 1024);
    }
}

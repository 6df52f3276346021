//! Server-sent-event streaming for chat completion responses
//!
//! Decodes `data: <json>` frames incrementally as they arrive from an
//! OpenAI-compatible endpoint, handing each `choices[0].delta.content`
//! fragment to the caller and accumulating the full text. Frames that fail
//! to parse are skipped silently (logged at debug level); the `[DONE]`
//! marker ends the stream.

use crate::api::ApiError;
use crate::utils::logger;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Response;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Consume a streaming response body, invoking `on_delta` synchronously for
/// each text fragment as it arrives. Returns the accumulated full text.
pub async fn process_stream<F>(response: Response, mut on_delta: F) -> Result<String, ApiError>
where
    F: FnMut(&str),
{
    let mut stream = response.bytes_stream().eventsource();
    let mut accumulated = String::new();

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => return Err(ApiError::Stream(e.to_string())),
        };

        let data = event.data;
        if data == "[DONE]" {
            break;
        }
        if data.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<StreamChunk>(&data) {
            Ok(chunk) => {
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            accumulated.push_str(&content);
                            on_delta(&content);
                        }
                    }
                }
            }
            Err(_) => {
                logger::debug(&format!("skipping malformed stream frame: {:.60}", data));
            }
        }
    }

    Ok(accumulated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta_frame() {
        let json = r#"{"id":"gen-1","choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        let chunk: StreamChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
    }

    #[test]
    fn test_parse_frame_without_choices() {
        // Keep-alive style frames parse to an empty chunk rather than erroring
        let chunk: StreamChunk = serde_json::from_str(r#"{"id":"gen-1"}"#).unwrap();
        assert!(chunk.choices.is_empty());
    }

    #[test]
    fn test_parse_frame_with_null_content() {
        let json = r#"{"choices":[{"delta":{"role":"assistant","content":null}}]}"#;
        let chunk: StreamChunk = serde_json::from_str(json).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }
}

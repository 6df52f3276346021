//! Conversation and message data model
//!
//! A conversation is a titled, ordered list of messages plus the model that
//! answers it. Messages are append-only: once pushed they are never edited
//! or removed individually.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default title before the first user message names the conversation
pub const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single transcript entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Data-URL payload for user-uploaded images. Kept only for display of
    /// the original upload; never re-derived after reload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            image_url: None,
        }
    }

    pub fn user_with_image(content: impl Into<String>, data_url: String) -> Self {
        Self {
            image_url: Some(data_url),
            ..Self::user(content)
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            image_url: None,
        }
    }
}

/// A titled, ordered transcript bound to one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(model: &str) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            model: model.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message, bumping `updated_at`. The first user message also
    /// names the conversation while the title is still the default.
    pub fn push(&mut self, message: ChatMessage) {
        if self.messages.is_empty() && message.role == Role::User && self.title == DEFAULT_TITLE {
            if let Some(title) = title_from_message(&message.content) {
                self.title = title;
            }
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }
}

/// Generate an opaque unique identifier (millisecond timestamp + random tail)
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: String = (0..9)
        .map(|_| fastrand::alphanumeric().to_ascii_lowercase())
        .collect();
    format!("{}-{}", millis, suffix)
}

/// Derive a display title from the first user message.
///
/// Greetings and very short messages keep the default title. The result is
/// capped at 50 characters, cut back to a word boundary where possible.
fn title_from_message(content: &str) -> Option<String> {
    let content = content.trim();
    if content.len() < 3 {
        return None;
    }

    let greetings = ["hi", "hello", "hey", "yo", "sup"];
    if greetings.iter().any(|g| content.eq_ignore_ascii_case(g)) {
        return None;
    }

    let mut title = content
        .split_whitespace()
        .take(8)
        .collect::<Vec<_>>()
        .join(" ");
    title = title
        .trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?'))
        .to_string();

    if title.len() > 50 {
        let cut = title
            .char_indices()
            .take_while(|(i, _)| *i <= 50)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0);
        title.truncate(cut);
        if let Some(space) = title.rfind(' ') {
            title.truncate(space);
        }
    }

    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_conversation_defaults() {
        let conv = Conversation::new("openai/gpt-4o-mini");
        assert_eq!(conv.title, DEFAULT_TITLE);
        assert!(conv.messages.is_empty());
        assert_eq!(conv.model, "openai/gpt-4o-mini");
    }

    #[test]
    fn test_first_user_message_sets_title() {
        let mut conv = Conversation::new("openai/gpt-4o-mini");
        conv.push(ChatMessage::user("show me three mountain sunsets"));
        assert_eq!(conv.title, "show me three mountain sunsets");
    }

    #[test]
    fn test_greeting_keeps_default_title() {
        let mut conv = Conversation::new("openai/gpt-4o-mini");
        conv.push(ChatMessage::user("hello"));
        assert_eq!(conv.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_title_truncated_at_word_boundary() {
        let mut conv = Conversation::new("openai/gpt-4o-mini");
        conv.push(ChatMessage::user(
            "please explain the differences between borrowing and ownership in rust with examples",
        ));
        assert!(conv.title.len() <= 50);
        assert!(!conv.title.ends_with(' '));
    }

    #[test]
    fn test_push_bumps_updated_at() {
        let mut conv = Conversation::new("openai/gpt-4o-mini");
        let before = conv.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        conv.push(ChatMessage::assistant("hi"));
        assert!(conv.updated_at > before);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_message_serialization_roundtrip() {
        let msg = ChatMessage::user_with_image("look at this", "data:image/png;base64,AAAA".into());
        let json = serde_json::to_string(&msg).unwrap();
        let restored: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.role, Role::User);
        assert_eq!(restored.content, "look at this");
        assert_eq!(restored.image_url.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}

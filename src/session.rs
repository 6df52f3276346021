//! Session orchestration
//!
//! `ChatSession` owns the conversation list, the active conversation, the
//! API clients and the per-session image state (pagination and already-shown
//! photo ids). Every user-visible mutation persists the conversation list
//! before returning, so a crash loses at most the in-flight reply.

use crate::api::{CompletionClient, CompletionOptions, ImageSearchClient, Photo};
use crate::chat::{ChatMessage, Conversation, Role};
use crate::intent::{self, ImageQuery, VISION_MARKER};
use crate::storage::Storage;
use crate::utils::logger;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Fixed reply when the completion backend fails after all fallbacks
pub const MODEL_MAINTENANCE_EN: &str =
    "Sorry, the model is currently under maintenance. Please try again in a few minutes.";
pub const MODEL_MAINTENANCE_AR: &str =
    "عذراً، النموذج تحت الصيانة حالياً. يرجى المحاولة مرة أخرى بعد قليل.";

/// Fixed reply when an attachment-carrying request fails
pub const VISION_MAINTENANCE_EN: &str =
    "Sorry, image analysis is currently under maintenance. Please try again later.";
pub const VISION_MAINTENANCE_AR: &str =
    "عذراً، تحليل الصور تحت الصيانة حالياً. يرجى المحاولة لاحقاً.";

/// Fixed reply when image search fails
pub const IMAGE_MAINTENANCE_EN: &str =
    "Sorry, image search is currently under maintenance. Please try again later.";
pub const IMAGE_MAINTENANCE_AR: &str =
    "عذراً، خدمة البحث عن الصور تحت الصيانة حالياً. يرجى المحاولة لاحقاً.";

/// A user-supplied image attachment, already encoded as a data URL
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub data_url: String,
}

/// Progress notifications emitted while a message is being handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A phase change worth surfacing ("Thinking...", "Finding images...")
    Status(String),
    /// A streamed text delta of the assistant reply
    Chunk(String),
}

pub struct ChatSession {
    completion: CompletionClient,
    images: ImageSearchClient,
    storage: Storage,
    model: String,
    conversations: Vec<Conversation>,
    active_id: Option<String>,
    /// Subject -> last result page fetched for it, reset per chat
    page_by_subject: HashMap<String, u32>,
    /// Photo ids already embedded in replies, reset per chat.
    /// Accumulates for the lifetime of the active chat; never pruned.
    shown_image_ids: HashSet<u64>,
    loading: bool,
}

impl ChatSession {
    /// Build a session over existing storage, restoring saved conversations.
    /// The most recently updated conversation becomes active.
    pub fn new(
        completion: CompletionClient,
        images: ImageSearchClient,
        storage: Storage,
        model: impl Into<String>,
    ) -> Self {
        let mut conversations = storage.load();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let active_id = conversations.first().map(|c| c.id.clone());

        Self {
            completion,
            images,
            storage,
            model: model.into(),
            conversations,
            active_id,
            page_by_subject: HashMap::new(),
            shown_image_ids: HashSet::new(),
            loading: false,
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn active(&self) -> Option<&Conversation> {
        let id = self.active_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    fn active_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.active_id.clone()?;
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    /// Start a fresh conversation and make it active. Image pagination and
    /// the shown-photo set belong to the old chat and are dropped with it.
    pub fn new_chat(&mut self) -> &Conversation {
        let conv = Conversation::new(&self.model);
        self.active_id = Some(conv.id.clone());
        self.conversations.insert(0, conv);
        self.page_by_subject.clear();
        self.shown_image_ids.clear();
        self.storage.save(&self.conversations);
        self.conversations.first().expect("just inserted")
    }

    /// Switch the active conversation. Returns false for an unknown id.
    pub fn open(&mut self, id: &str) -> bool {
        if self.conversations.iter().any(|c| c.id == id) {
            self.active_id = Some(id.to_string());
            self.page_by_subject.clear();
            self.shown_image_ids.clear();
            true
        } else {
            false
        }
    }

    /// Delete a conversation. When the active one goes, the most recent
    /// survivor (if any) takes its place.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return false;
        }
        if self.active_id.as_deref() == Some(id) {
            self.active_id = self.conversations.first().map(|c| c.id.clone());
            self.page_by_subject.clear();
            self.shown_image_ids.clear();
        }
        self.storage.delete(id);
        true
    }

    /// Handle one user message end to end: append it, route it through the
    /// image or chat flow, append the assistant reply, persist.
    ///
    /// Backend failures never bubble out of here; they become a fixed
    /// maintenance reply in the transcript, localized to the user's language.
    pub async fn send_message(
        &mut self,
        text: &str,
        attachment: Option<Attachment>,
        mut notify: impl FnMut(SessionEvent),
    ) {
        if self.active_id.is_none() {
            self.new_chat();
        }

        let user_message = match &attachment {
            Some(att) => ChatMessage::user_with_image(
                format!("{}\n\n[Image: {}]", text, att.name),
                att.data_url.clone(),
            ),
            None => ChatMessage::user(text),
        };
        if let Some(conv) = self.active_mut() {
            conv.push(user_message);
        }
        self.storage.save(&self.conversations);
        self.loading = true;

        let wants_images = attachment.is_none() && self.detect_visual_intent(text).await;
        if wants_images {
            self.run_image_flow(text, &mut notify).await;
        } else {
            self.run_chat_flow(text, attachment.as_ref(), &mut notify).await;
        }

        self.loading = false;
        self.storage.save(&self.conversations);
    }

    /// Prefilter first, model classification only when the prefilter fires.
    async fn detect_visual_intent(&self, text: &str) -> bool {
        let history = self.history_before_current();
        if !intent::prefilter_matches(text, &history) {
            return false;
        }
        let verdict =
            intent::classify_visual_intent(&self.completion, &self.model, text, &history).await;
        if verdict.is_degraded() {
            logger::info("visual intent decided by degraded keyword path");
        }
        verdict.value()
    }

    async fn run_image_flow(&mut self, text: &str, notify: &mut impl FnMut(SessionEvent)) {
        notify(SessionEvent::Status("Finding images...".to_string()));
        let history = self.history_before_current();
        let query =
            intent::extract_image_query(&self.completion, &self.model, text, &history).await;

        let page = match self.page_by_subject.get(&query.subject).copied() {
            Some(current) => {
                let different = intent::wants_different_images(
                    &self.completion,
                    &self.model,
                    text,
                    &history,
                    &query.subject,
                )
                .await;
                next_page(current, different.value())
            }
            None => 1,
        };

        let arabic = intent::is_arabic(text);
        let maintenance = if arabic { IMAGE_MAINTENANCE_AR } else { IMAGE_MAINTENANCE_EN };

        // The style qualifies the reply, not the query; only the subject is
        // sent to the backend.
        let fresh: Vec<Photo> = match self.images.search(&query.subject, query.count, page).await {
            Ok(photos) => photos
                .into_iter()
                .filter(|p| !self.shown_image_ids.contains(&p.id))
                .collect(),
            Err(e) => {
                logger::error(&format!("image search failed: {}", e));
                self.push_assistant(maintenance.to_string());
                return;
            }
        };

        // A page with nothing new to show is a failed flow, same as a
        // backend error; pagination state stays untouched for the retry.
        if fresh.is_empty() {
            logger::warn(&format!(
                "no unseen photos for \"{}\" on page {}",
                query.subject, page
            ));
            self.push_assistant(maintenance.to_string());
            return;
        }

        for photo in &fresh {
            self.shown_image_ids.insert(photo.id);
        }
        self.page_by_subject.insert(query.subject.clone(), page);
        self.push_assistant(build_image_message(&query, &fresh, arabic));
    }

    async fn run_chat_flow(
        &mut self,
        text: &str,
        attachment: Option<&Attachment>,
        notify: &mut impl FnMut(SessionEvent),
    ) {
        notify(SessionEvent::Status("Thinking...".to_string()));
        let turns = self.api_turns(attachment);
        let options = CompletionOptions::chat(&self.model);

        let mut forward = |chunk: &str| notify(SessionEvent::Chunk(chunk.to_string()));
        let result = self
            .completion
            .send(&options, &turns, Some(&mut forward))
            .await;

        match result {
            Ok(reply) => self.push_assistant(reply),
            Err(e) => {
                logger::error(&format!("completion failed: {}", e));
                let reply = match (attachment.is_some(), intent::is_arabic(text)) {
                    (true, true) => VISION_MAINTENANCE_AR,
                    (true, false) => VISION_MAINTENANCE_EN,
                    (false, true) => MODEL_MAINTENANCE_AR,
                    (false, false) => MODEL_MAINTENANCE_EN,
                };
                self.push_assistant(reply.to_string());
            }
        }
    }

    fn push_assistant(&mut self, content: String) {
        if let Some(conv) = self.active_mut() {
            conv.push(ChatMessage::assistant(content));
        }
    }

    /// Transcript up to but excluding the just-pushed user message, for use
    /// as analysis context.
    fn history_before_current(&self) -> Vec<ChatMessage> {
        match self.active() {
            Some(conv) if !conv.messages.is_empty() => {
                conv.messages[..conv.messages.len() - 1].to_vec()
            }
            _ => Vec::new(),
        }
    }

    /// Convert the active transcript into API message values. The latest user
    /// message carries the attachment as multimodal content when present;
    /// display-only markers are stripped everywhere.
    fn api_turns(&self, attachment: Option<&Attachment>) -> Vec<Value> {
        let Some(conv) = self.active() else {
            return Vec::new();
        };
        let last_idx = conv.messages.len().saturating_sub(1);

        conv.messages
            .iter()
            .enumerate()
            .map(|(idx, msg)| {
                let text = strip_image_markers(&msg.content);
                match (idx == last_idx, msg.role, attachment) {
                    (true, Role::User, Some(att)) => json!({
                        "role": "user",
                        "content": [
                            {"type": "text", "text": text},
                            {"type": "image_url", "image_url": {"url": att.data_url}},
                        ],
                    }),
                    _ => json!({"role": msg.role.to_string(), "content": text}),
                }
            })
            .collect()
    }
}

/// Page selection for a repeated subject: advance for "different", restart
/// at the first page otherwise.
fn next_page(current: u32, different: bool) -> u32 {
    if different {
        current + 1
    } else {
        1
    }
}

/// Remove display-only attachment markers before text reaches the model
fn strip_image_markers(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\n*\[Image: [^\]]*\]").expect("invalid marker regex"));
    re.replace_all(text, "").trim().to_string()
}

/// Markdown reply embedding the fetched photos, with a localized footer
/// carrying the vision marker. A non-default style is noted above the
/// footer rather than sent to the search backend.
fn build_image_message(query: &ImageQuery, photos: &[Photo], arabic: bool) -> String {
    let mut out = if arabic {
        if photos.len() == 1 {
            format!("إليك صورة لـ **{}**:\n\n", query.subject)
        } else {
            format!("إليك {} صور لـ **{}**:\n\n", photos.len(), query.subject)
        }
    } else if photos.len() == 1 {
        format!("Here is a **{}** image:\n\n", query.subject)
    } else {
        format!("Here are {} **{}** images:\n\n", photos.len(), query.subject)
    };

    for photo in photos {
        let alt = if photo.alt.trim().is_empty() {
            query.subject.as_str()
        } else {
            photo.alt.as_str()
        };
        out.push_str(&format!("![{}]({})\n", alt, photo.src.large));
        out.push_str(&format!(
            "*Photo by [{}]({})*\n\n",
            photo.photographer, photo.photographer_url
        ));
    }

    if query.style != intent::DEFAULT_STYLE {
        if arabic {
            out.push_str(&format!("*النمط: {}*\n\n", query.style));
        } else {
            out.push_str(&format!("*Style: {}*\n\n", query.style));
        }
    }

    if arabic {
        out.push_str(&format!("---\n*{} · الصور من Pexels*", VISION_MARKER));
    } else {
        out.push_str(&format!("---\n*{} · Photos from Pexels*", VISION_MARKER));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::images::PhotoSrc;

    fn photo(id: u64) -> Photo {
        Photo {
            id,
            width: 1000,
            height: 800,
            url: format!("https://photos.example/{}", id),
            photographer: "Alex Doe".to_string(),
            photographer_url: "https://photos.example/alex".to_string(),
            src: PhotoSrc {
                original: format!("https://img.example/{}/original.jpg", id),
                large2x: format!("https://img.example/{}/large2x.jpg", id),
                large: format!("https://img.example/{}/large.jpg", id),
                medium: format!("https://img.example/{}/medium.jpg", id),
                small: format!("https://img.example/{}/small.jpg", id),
                portrait: format!("https://img.example/{}/portrait.jpg", id),
                landscape: format!("https://img.example/{}/landscape.jpg", id),
                tiny: format!("https://img.example/{}/tiny.jpg", id),
            },
            alt: String::new(),
        }
    }

    fn query(subject: &str, count: u8) -> ImageQuery {
        ImageQuery {
            subject: subject.to_string(),
            count,
            style: "photorealistic".to_string(),
        }
    }

    #[test]
    fn test_next_page_advances_only_for_different() {
        assert_eq!(next_page(1, true), 2);
        assert_eq!(next_page(4, true), 5);
        assert_eq!(next_page(4, false), 1);
    }

    #[test]
    fn test_image_message_notes_non_default_style() {
        let mut q = query("cats", 1);
        q.style = "vintage".to_string();
        let msg = build_image_message(&q, &[photo(1)], false);
        assert!(msg.contains("*Style: vintage*"));

        let plain = build_image_message(&query("cats", 1), &[photo(1)], false);
        assert!(!plain.contains("Style:"));
    }

    #[test]
    fn test_strip_image_markers() {
        assert_eq!(
            strip_image_markers("look at this\n\n[Image: garden.png]"),
            "look at this"
        );
        assert_eq!(strip_image_markers("plain text"), "plain text");
    }

    #[test]
    fn test_image_message_embeds_photos_and_marker() {
        let msg = build_image_message(&query("cats", 2), &[photo(1), photo(2)], false);
        assert!(msg.contains("![cats](https://img.example/1/large.jpg)"));
        assert!(msg.contains("![cats](https://img.example/2/large.jpg)"));
        assert!(msg.contains(VISION_MARKER));
        assert!(msg.contains("Photo by [Alex Doe]"));
        assert!(msg.starts_with("Here are 2 **cats** images:"));
    }

    #[test]
    fn test_image_message_localizes_to_arabic() {
        let msg = build_image_message(&query("قطط", 1), &[photo(1)], true);
        assert!(msg.contains("إليك صورة"));
        assert!(msg.contains(VISION_MARKER));
    }

    #[test]
    fn test_image_message_prefers_photo_alt() {
        let mut p = photo(7);
        p.alt = "a sleepy tabby".to_string();
        let msg = build_image_message(&query("cats", 1), &[p], false);
        assert!(msg.contains("![a sleepy tabby](https://img.example/7/large.jpg)"));
    }

    #[test]
    fn test_maintenance_messages_are_localized() {
        assert_ne!(MODEL_MAINTENANCE_EN, MODEL_MAINTENANCE_AR);
        assert!(crate::intent::is_arabic(MODEL_MAINTENANCE_AR));
        assert!(!crate::intent::is_arabic(MODEL_MAINTENANCE_EN));
    }
}

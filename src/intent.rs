//! Visual intent and image query analysis
//!
//! Three decisions, each delegated to the completion model with a
//! deterministic regex fallback used only when the call fails or returns
//! something unparseable:
//!
//! - does the user want to see images at all
//! - what subject/count/style to search for
//! - does the user want *different* results for a subject already shown
//!
//! Model replies are parsed strictly (exact YES/NO, strict JSON); anything
//! else routes to the fallback, and the verdict records which path produced
//! it so the degraded mode is never silently indistinguishable.

use crate::api::{CompletionClient, CompletionOptions};
use crate::chat::{ChatMessage, Role};
use crate::utils::logger;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;

/// Marker embedded in image-flow assistant messages; its presence in a
/// prior turn marks the conversation as having produced images.
pub const VISION_MARKER: &str = "Powered by Glimpse Vision";

/// Subject used when nothing meaningful survives stop-word stripping
const DEFAULT_SUBJECT: &str = "nature";

pub const DEFAULT_STYLE: &str = "photorealistic";

/// A boolean decision tagged with the path that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Parsed from a well-formed model reply
    Model(bool),
    /// Keyword/heuristic fallback after a failed or unparseable call
    Degraded(bool),
}

impl Verdict {
    pub fn value(self) -> bool {
        match self {
            Verdict::Model(v) | Verdict::Degraded(v) => v,
        }
    }

    pub fn is_degraded(self) -> bool {
        matches!(self, Verdict::Degraded(_))
    }
}

/// Structured image request extracted from a user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageQuery {
    pub subject: String,
    pub count: u8,
    pub style: String,
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("invalid built-in regex"))
}

/// Broad visual vocabulary, English and Arabic
fn visual_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)\b(image|images|photo|photos|picture|pictures|pic|pics|visual|view|see|show|display|look|find|search|create|generate|make|draw|design|more|another|different)\b|صورة|صور|اعرض|اجلب|انشئ|اصنع|ارسم|شوف|وريني|اريد|أريد|المزيد|غيرها|كمل|تاني|ثاني",
    )
}

fn want_to_see() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)want\s+to\s+see|wanna\s+see|اريد.*اشوف|أريد.*أشوف|بدي.*شوف|نفسي.*اشوف",
    )
}

/// "what does X look like" style appearance questions
fn appearance_question() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)what.*\blook\b|how.*\blook\b|what.*\bappear\b|how.*\bappear\b|كيف.*شكل|ما.*شكل|شو.*شكل",
    )
}

/// Continuation words meaningful only when images were already shown
fn continue_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)\b(more|another|different|else)\b|المزيد|غيرها|كمل|تاني|ثاني|غير",
    )
}

/// Narrow high-precision vocabulary for the cheap prefilter
fn obvious_image_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)\b(image|images|photo|photos|picture|pictures|pic|show\s+me|generate|create|draw)\b|صورة|صور|اعرض|انشئ|اصنع|ارسم",
    )
}

fn arabic_script() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"[\u{0600}-\u{06FF}]")
}

/// Whether the text is (partly) Arabic, used to localize responses
pub fn is_arabic(text: &str) -> bool {
    arabic_script().is_match(text)
}

/// Whether any prior assistant turn embedded images
pub fn has_recent_images(history: &[ChatMessage]) -> bool {
    history.iter().any(|m| {
        m.role == Role::Assistant && (m.content.contains("![") || m.content.contains(VISION_MARKER))
    })
}

/// Cheap recall-oriented gate run before the model-backed classifier.
///
/// Misses are possible: a visual request using none of the recognized
/// vocabulary, with no prior image context, falls through to the chat flow.
pub fn prefilter_matches(message: &str, history: &[ChatMessage]) -> bool {
    obvious_image_words().is_match(message)
        || (has_recent_images(history) && continue_words().is_match(message))
}

/// Keyword fallback for visual-intent classification (degraded path)
pub fn keyword_fallback(message: &str, history: &[ChatMessage]) -> bool {
    let lower = message.to_lowercase();
    visual_words().is_match(&lower)
        || want_to_see().is_match(&lower)
        || appearance_question().is_match(&lower)
        || (has_recent_images(history) && continue_words().is_match(&lower))
}

/// Classify whether the user wants visual content, with the last 5 turns as
/// context. A failed or unparseable model call degrades to the keyword path.
pub async fn classify_visual_intent(
    client: &CompletionClient,
    model: &str,
    message: &str,
    history: &[ChatMessage],
) -> Verdict {
    let prompt = visual_intent_prompt(message, history);
    let options = CompletionOptions::internal(model, 10);
    let turns = vec![json!({"role": "user", "content": prompt})];

    match client.send(&options, &turns, None).await {
        Ok(reply) => match parse_yes_no(&reply) {
            Some(v) => Verdict::Model(v),
            None => {
                logger::warn(&format!(
                    "intent classifier returned unparseable reply ({:.40}), using keyword fallback",
                    reply
                ));
                Verdict::Degraded(keyword_fallback(message, history))
            }
        },
        Err(e) => {
            logger::warn(&format!("intent classifier call failed ({}), using keyword fallback", e));
            Verdict::Degraded(keyword_fallback(message, history))
        }
    }
}

/// Extract {subject, count, style} for an image search, with the last 6
/// turns as context. Count is clamped to [1,6] on every path.
pub async fn extract_image_query(
    client: &CompletionClient,
    model: &str,
    message: &str,
    history: &[ChatMessage],
) -> ImageQuery {
    let prompt = query_extraction_prompt(message, history);
    let options = CompletionOptions::internal(model, 200);
    let turns = vec![json!({"role": "user", "content": prompt})];

    let mut query = match client.send(&options, &turns, None).await {
        Ok(reply) => parse_query_json(&reply).unwrap_or_else(|| fallback_query(message)),
        Err(e) => {
            logger::warn(&format!("query extraction call failed ({}), using fallback", e));
            fallback_query(message)
        }
    };
    query.count = query.count.clamp(1, 6);
    query
}

/// Decide whether the user wants different results for an already-shown
/// subject. Only called when the subject has a pagination entry.
pub async fn wants_different_images(
    client: &CompletionClient,
    model: &str,
    message: &str,
    history: &[ChatMessage],
    subject: &str,
) -> Verdict {
    let prompt = different_images_prompt(message, history, subject);
    let options = CompletionOptions::internal(model, 10);
    let turns = vec![json!({"role": "user", "content": prompt})];

    // Weak heuristic: a longer exchange suggests a follow-up request
    let degraded = history.len() >= 2;

    match client.send(&options, &turns, None).await {
        Ok(reply) => match parse_yes_no(&reply) {
            Some(v) => Verdict::Model(v),
            None => Verdict::Degraded(degraded),
        },
        Err(e) => {
            logger::warn(&format!(
                "different-images decision call failed ({}), using turn-count fallback",
                e
            ));
            Verdict::Degraded(degraded)
        }
    }
}

/// Strict YES/NO parse: trim, strip surrounding punctuation, exact match.
/// Anything else is a failure, not a weak positive.
fn parse_yes_no(reply: &str) -> Option<bool> {
    let cleaned = reply
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_uppercase();
    match cleaned.as_str() {
        "YES" => Some(true),
        "NO" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct RawQuery {
    subject: Option<String>,
    count: Option<i64>,
    style: Option<String>,
}

/// Parse the first brace-delimited substring of a model reply as a query
/// object. Returns None when no usable subject can be recovered.
fn parse_query_json(reply: &str) -> Option<ImageQuery> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    let raw: RawQuery = serde_json::from_str(&reply[start..=end]).ok()?;

    let subject = raw.subject?.trim().to_string();
    if subject.is_empty() {
        return None;
    }
    let count = raw.count.unwrap_or(1).clamp(1, 6) as u8;
    let style = raw
        .style
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_STYLE.to_string());
    Some(ImageQuery { subject, count, style })
}

/// Words carrying no subject information, English and Arabic
const STOP_WORDS: &[&str] = &[
    "show", "me", "find", "search", "for", "get", "display", "i", "want", "to", "see", "give",
    "can", "you", "fetch", "look", "create", "generate", "make", "draw", "image", "images",
    "photo", "photos", "picture", "pictures", "pic", "pics", "of", "a", "an", "the", "some",
    "at", "what", "does", "do", "how", "is", "are", "اعرض", "اجلب", "ابحث", "اريد", "أريد",
    "اعطني", "أعطني", "احضر", "وريني", "بدي", "شوف", "اشوف", "كيف", "شكل", "ما", "شو", "صورة",
    "صور", "صوره", "لي", "عن", "من", "في", "ل",
];

/// Deterministic query extraction: strip stop words, pull the first integer
/// as the count, default the subject when too little remains.
pub fn fallback_query(message: &str) -> ImageQuery {
    let lower = message.to_lowercase();

    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = regex(&NUMBER, r"\d+");
    let count = number
        .find(&lower)
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(|n| n.clamp(1, 6) as u8)
        .unwrap_or(1);

    let subject: String = lower
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .filter(|token| !STOP_WORDS.contains(token))
        .filter(|token| token.chars().all(|c| !c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ");

    let subject = if subject.trim().len() < 2 {
        DEFAULT_SUBJECT.to_string()
    } else {
        subject.trim().to_string()
    };

    ImageQuery {
        subject,
        count,
        style: DEFAULT_STYLE.to_string(),
    }
}

/// Truncate to at most `max` characters on a char boundary
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Numbered "User:/AI:" context lines from the last `turns` messages
fn context_lines(history: &[ChatMessage], turns: usize, max_chars: usize) -> String {
    let recent = &history[history.len().saturating_sub(turns)..];
    if recent.is_empty() {
        return String::new();
    }
    let mut out = String::from("\nRecent conversation:\n");
    for (idx, msg) in recent.iter().enumerate() {
        let role = match msg.role {
            Role::User => "User",
            Role::Assistant => "AI",
        };
        out.push_str(&format!(
            "{}. {}: {}\n",
            idx + 1,
            role,
            truncate_chars(&msg.content, max_chars)
        ));
    }
    out
}

fn visual_intent_prompt(message: &str, history: &[ChatMessage]) -> String {
    format!(
        "You are an intent classifier. Decide whether the user wants to SEE, VIEW, FIND or \
GENERATE visual content (images, photos, pictures).\n{context}\nUser's current message: \
\"{message}\"\n\nAnswer YES for:\n- direct requests: \"show me cats\", \"اعرض قطط\", \
\"find sunset photos\"\n- indirect requests: \"I want to see X\", \"what does X look like\", \
\"كيف شكل X\"\n- continuations of an earlier image exchange: \"more\", \"another\", \
\"different\", \"المزيد\", \"غيرها\"\n- a bare subject that is naturally viewed: \"cats\", \
\"غروب\"\n\nAnswer NO for conceptual, coding, math or factual questions that need no \
visuals.\n\nAnswer with ONLY: YES or NO",
        context = context_lines(history, 5, 150),
        message = message,
    )
}

fn query_extraction_prompt(message: &str, history: &[ChatMessage]) -> String {
    format!(
        "You analyze image requests. Using the conversation history and the current message, \
determine WHAT the user wants to see, HOW MANY images, and in WHAT STYLE.\n{context}\nCurrent \
user message: \"{message}\"\n\nRules:\n1. subject: the main visual topic in English, 2-4 \
keywords. For continuations (\"more\", \"المزيد\") reuse the previous subject from the \
history.\n2. count: an integer 1-6. Spelled-out numbers count (one=1 ... six=6, واحد=1 ... \
ستة=6). Default 1.\n3. style: a style word if given (vintage, artistic, ...), otherwise \
\"photorealistic\".\n\nExamples:\n\"cats\" -> {{\"subject\": \"cats\", \"count\": 1, \
\"style\": \"photorealistic\"}}\n\"I want to see 3 mountains\" -> {{\"subject\": \
\"mountains\", \"count\": 3, \"style\": \"photorealistic\"}}\n\"كيف شكل الغروب\" -> \
{{\"subject\": \"sunset\", \"count\": 1, \"style\": \"photorealistic\"}}\n\nReturn ONLY a \
JSON object of the form {{\"subject\": \"...\", \"count\": 1-6, \"style\": \"...\"}} and no \
other text.",
        context = context_lines(history, 6, 150),
        message = message,
    )
}

fn different_images_prompt(message: &str, history: &[ChatMessage], subject: &str) -> String {
    format!(
        "The user has ALREADY been shown {subject} images in this conversation.\n{context}\n\
Current user message: \"{message}\"\n\nDoes the user want DIFFERENT or NEW {subject} images \
rather than the ones already shown? Answer YES when they ask for variety, alternatives or \
fresh results of the same subject. Answer NO when this is a first-time request or a \
different subject entirely.\n\nAnswer with ONLY: YES or NO",
        context = context_lines(history, 4, 100),
        message = message,
        subject = subject,
    )
}

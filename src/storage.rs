//! Conversation persistence
//!
//! The full conversation list is serialized as one JSON array in a single
//! file. Saves overwrite the file wholesale; loads tolerate a missing or
//! corrupt file by returning an empty list. Storage failures are logged and
//! otherwise swallowed, so callers never see them.

use crate::chat::Conversation;
use crate::utils::logger;
use std::fs;
use std::path::{Path, PathBuf};

const CONVERSATIONS_FILE: &str = "conversations.json";
const WELCOME_FLAG_FILE: &str = "welcome_submitted";

#[derive(Debug, Clone)]
pub struct Storage {
    base_dir: PathBuf,
}

impl Storage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Default data directory: `~/.glimpse`
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".glimpse")
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn conversations_path(&self) -> PathBuf {
        self.base_dir.join(CONVERSATIONS_FILE)
    }

    /// Overwrite the stored conversation list. Failures are logged, never
    /// surfaced; the caller's in-memory list stays authoritative.
    pub fn save(&self, conversations: &[Conversation]) {
        if let Err(e) = self.try_save(conversations) {
            logger::error(&format!("failed to save conversations: {}", e));
        }
    }

    fn try_save(&self, conversations: &[Conversation]) -> anyhow::Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let json = serde_json::to_string(conversations)?;
        fs::write(self.conversations_path(), json)?;
        Ok(())
    }

    /// Load the stored list, or an empty one when the file is absent or
    /// unreadable. Corruption is logged and swallowed.
    pub fn load(&self) -> Vec<Conversation> {
        let path = self.conversations_path();
        if !path.exists() {
            return Vec::new();
        }
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|json| serde_json::from_str(&json).map_err(anyhow::Error::from))
        {
            Ok(list) => list,
            Err(e) => {
                logger::error(&format!("failed to load conversations: {}", e));
                Vec::new()
            }
        }
    }

    /// Remove one conversation from the stored list by re-reading, filtering
    /// and re-saving. Callers must drop it from their in-memory copy too;
    /// this does not touch their state.
    pub fn delete(&self, conversation_id: &str) {
        let mut conversations = self.load();
        conversations.retain(|c| c.id != conversation_id);
        self.save(&conversations);
    }

    pub fn welcome_submitted(&self) -> bool {
        fs::read_to_string(self.base_dir.join(WELCOME_FLAG_FILE))
            .map(|s| s.trim() == "true")
            .unwrap_or(false)
    }

    pub fn set_welcome_submitted(&self) {
        if let Err(e) = fs::create_dir_all(&self.base_dir)
            .map_err(anyhow::Error::from)
            .and_then(|_| {
                fs::write(self.base_dir.join(WELCOME_FLAG_FILE), "true").map_err(Into::into)
            })
        {
            logger::error(&format!("failed to persist welcome flag: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use pretty_assertions::assert_eq;

    fn sample_conversations() -> Vec<Conversation> {
        let mut first = Conversation::new("openai/gpt-4o-mini");
        first.push(ChatMessage::user("show me cats"));
        first.push(ChatMessage::assistant("![cats](https://example.com/cat.jpg)"));
        let second = Conversation::new("openai/gpt-4o-mini");
        vec![first, second]
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());

        let saved = sample_conversations();
        storage.save(&saved);
        let loaded = storage.load();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, saved[0].id);
        assert_eq!(loaded[0].title, saved[0].title);
        assert_eq!(loaded[0].messages.len(), 2);
        assert_eq!(loaded[0].messages[1].content, saved[0].messages[1].content);
    }

    #[test]
    fn test_load_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        assert!(storage.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONVERSATIONS_FILE), "{not json").unwrap();
        let storage = Storage::new(dir.path());
        assert!(storage.load().is_empty());
    }

    #[test]
    fn test_delete_removes_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());

        let saved = sample_conversations();
        storage.save(&saved);
        storage.delete(&saved[0].id);

        let remaining = storage.load();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, saved[1].id);
    }

    #[test]
    fn test_delete_unknown_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        storage.save(&sample_conversations());
        storage.delete("no-such-id");
        assert_eq!(storage.load().len(), 2);
    }

    #[test]
    fn test_welcome_flag_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        assert!(!storage.welcome_submitted());
        storage.set_welcome_submitted();
        assert!(storage.welcome_submitted());
    }
}

//! Voice input
//!
//! Transcription is delegated to an external command (for example a whisper
//! wrapper) configured via `transcribe_command` or `GLIMPSE_TRANSCRIBE_CMD`.
//! The command is expected to record from the microphone, block until the
//! utterance ends and print the transcript on stdout.

use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("no transcription backend is configured")]
    Unavailable,
    #[error("microphone access was denied")]
    Denied,
    #[error("transcription failed: {0}")]
    Failed(String),
}

pub trait Transcriber {
    fn transcribe(&self) -> Result<String, TranscribeError>;
}

/// Runs a user-configured shell command and reads the transcript from its
/// stdout.
pub struct CommandTranscriber {
    command: String,
}

impl CommandTranscriber {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// None when no command is configured; callers surface that as
    /// `TranscribeError::Unavailable`.
    pub fn from_config(command: Option<String>) -> Option<Self> {
        command.map(Self::new)
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(&self) -> Result<String, TranscribeError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .map_err(|e| TranscribeError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lowered = stderr.to_lowercase();
            if lowered.contains("denied") || lowered.contains("permission") {
                return Err(TranscribeError::Denied);
            }
            return Err(TranscribeError::Failed(stderr.trim().to_string()));
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            return Err(TranscribeError::Failed("no speech detected".to_string()));
        }
        Ok(transcript)
    }
}

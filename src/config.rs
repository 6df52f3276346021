//! User configuration
//!
//! Loaded from `config.yaml` inside the data directory. Every field has a
//! default, so a missing file yields a working config; API keys may come
//! from the file or from the environment (`OPENROUTER_API_KEY`,
//! `PEXELS_API_KEY`), with the file taking precedence.

use crate::api::{DEFAULT_COMPLETION_ENDPOINT, DEFAULT_IMAGE_ENDPOINT, DEFAULT_MODEL};
use crate::utils::logger;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model identifier sent on the first attempt of every completion
    pub model: String,
    pub completion_endpoint: String,
    pub image_endpoint: String,
    pub openrouter_api_key: Option<String>,
    pub pexels_api_key: Option<String>,
    /// Endpoint receiving the one-time onboarding form, when set
    pub onboarding_endpoint: Option<String>,
    /// External command used for voice transcription, when set
    pub transcribe_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            completion_endpoint: DEFAULT_COMPLETION_ENDPOINT.to_string(),
            image_endpoint: DEFAULT_IMAGE_ENDPOINT.to_string(),
            openrouter_api_key: None,
            pexels_api_key: None,
            onboarding_endpoint: None,
            transcribe_command: None,
        }
    }
}

impl Config {
    /// Load the config from `dir/config.yaml`. A missing file yields the
    /// defaults; an unreadable or malformed one is logged and also yields
    /// the defaults rather than blocking startup.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_yaml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    logger::warn(&format!("malformed {} ({}), using defaults", CONFIG_FILE, e));
                    Self::default()
                }
            },
            Err(e) => {
                logger::warn(&format!("cannot read {} ({}), using defaults", CONFIG_FILE, e));
                Self::default()
            }
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        let raw = serde_yaml::to_string(self).context("Failed to serialize config")?;
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, raw)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// API key for the completion backend: config value, then environment
    pub fn completion_api_key(&self) -> Option<String> {
        self.openrouter_api_key
            .clone()
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// API key for the image backend: config value, then environment
    pub fn image_api_key(&self) -> Option<String> {
        self.pexels_api_key
            .clone()
            .or_else(|| std::env::var("PEXELS_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// Transcription command: config value, then `GLIMPSE_TRANSCRIBE_CMD`
    pub fn transcribe_command(&self) -> Option<String> {
        self.transcribe_command
            .clone()
            .or_else(|| std::env::var("GLIMPSE_TRANSCRIBE_CMD").ok())
            .filter(|c| !c.trim().is_empty())
    }
}

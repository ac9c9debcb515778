use quicknotes_assistant::LLMConfig;
use std::path::PathBuf;

use crate::error::NotesResult;

/// Process-level settings, read once at startup and passed down explicitly
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub bind_addr: String,
    /// Output language for generated notes when the request names none
    pub default_language: String,
    pub llm: LLMConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/quicknotes.db"),
            bind_addr: "127.0.0.1:5001".to_string(),
            default_language: "English".to_string(),
            llm: LLMConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables
    pub fn from_env() -> NotesResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> NotesResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let llm = LLMConfig::from_lookup(&lookup)?;

        Ok(Self {
            db_path: lookup("NOTES_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            bind_addr: lookup("NOTES_BIND_ADDR").unwrap_or(defaults.bind_addr),
            default_language: lookup("NOTES_DEFAULT_LANGUAGE")
                .filter(|lang| !lang.trim().is_empty())
                .unwrap_or(defaults.default_language),
            llm,
        })
    }
}

use std::sync::Arc;
use tracing::warn;

use crate::client::{ChatMessage, CompletionClient};
use crate::error::{AssistantError, AssistantResult};

const TRANSLATOR_SYSTEM_PROMPT: &str = "You are a helpful assistant that translates text.";

/// Outcome of translating one field of a note
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTranslation {
    Translated(String),
    /// Blank source text; the model is not consulted
    Empty,
    /// The model could not produce a translation
    Unavailable { reason: String },
}

impl FieldTranslation {
    /// Translated text, with an unavailable translation read as `""`
    pub fn text_or_empty(self) -> String {
        match self {
            FieldTranslation::Translated(text) => text,
            FieldTranslation::Empty | FieldTranslation::Unavailable { .. } => String::new(),
        }
    }

    /// Translated text, with an unavailable translation surfaced as an error
    pub fn require(self) -> AssistantResult<String> {
        match self {
            FieldTranslation::Translated(text) => Ok(text),
            FieldTranslation::Empty => Ok(String::new()),
            FieldTranslation::Unavailable { reason } => Err(AssistantError::ExternalService(reason)),
        }
    }
}

pub struct Translator {
    client: Arc<dyn CompletionClient>,
}

impl Translator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn translate(&self, text: &str, target_language: &str) -> AssistantResult<String> {
        let messages = [
            ChatMessage::system(TRANSLATOR_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Translate the following text to {}:\n\n{}",
                target_language, text
            )),
        ];

        self.client.complete(&messages).await
    }

    /// Translate a single field without failing; the caller decides what an
    /// unavailable translation means for that field
    pub async fn translate_field(&self, text: &str, target_language: &str) -> FieldTranslation {
        if text.trim().is_empty() {
            return FieldTranslation::Empty;
        }

        match self.translate(text, target_language).await {
            Ok(translated) => FieldTranslation::Translated(translated),
            Err(e) => {
                warn!("Translation to {} failed: {}", target_language, e);
                let reason = match e {
                    AssistantError::ExternalService(message) => message,
                    other => other.to_string(),
                };
                FieldTranslation::Unavailable { reason }
            }
        }
    }
}

//! LLM helpers for Quicknotes.
//!
//! The completion capability is a black box reached through
//! [`CompletionClient`]; the extraction pipeline and the translator are built
//! on top of it and never touch storage.

pub mod client;
pub mod config;
pub mod error;
pub mod extraction;
pub mod translation;

pub use client::{ChatMessage, ChatRole, CompletionClient, OpenAICompatibleClient};
pub use config::LLMConfig;
pub use error::{AssistantError, AssistantResult};
pub use extraction::{parse_model_reply, NoteExtractor};
pub use translation::{FieldTranslation, Translator};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Separator used when a tag list is flattened into a single storage column
pub const TAG_SEPARATOR: char = ',';

/// Title given to extracted notes when the model did not supply one
pub const UNTITLED: &str = "Untitled";

// ============================================================================
// ID Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Note Schema
// ============================================================================

/// A persisted note as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    /// Manual display position; `None` means the note was never ordered
    pub position: Option<i64>,
    pub event_date: Option<NaiveDate>,
    pub event_time: Option<NaiveTime>,
    pub created_at: String, // RFC3339
    pub updated_at: String, // RFC3339
}

/// Fields needed to insert a note. Position is assigned by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub event_date: Option<NaiveDate>,
    pub event_time: Option<NaiveTime>,
}

/// Partial update. Outer `None` leaves a field untouched; for the event
/// fields `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub event_date: Option<Option<NaiveDate>>,
    pub event_time: Option<Option<NaiveTime>>,
}

impl NoteChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.event_date.is_none()
            && self.event_time.is_none()
    }
}

/// Candidate note produced by the extraction pipeline, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl NoteDraft {
    /// Drafts never carry event date/time
    pub fn into_new_note(self) -> NewNote {
        NewNote {
            title: self.title,
            content: self.content,
            tags: self.tags,
            event_date: None,
            event_time: None,
        }
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Tags as they arrive from clients or from model output: either a list or
/// a single comma-separated string. Anything else is carried so callers can
/// treat it as absent instead of failing the whole request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<Value>),
    Text(String),
    Other(Value),
}

impl TagsInput {
    /// Normalized tag list, or `None` when the input was of an unusable type
    pub fn into_tags(self) -> Option<Vec<String>> {
        match self {
            TagsInput::List(items) => Some(normalize_tags(
                items.iter().filter_map(|item| item.as_str()),
            )),
            TagsInput::Text(text) => Some(split_tags(&text)),
            TagsInput::Other(_) => None,
        }
    }
}

/// Trim every tag and drop the blank ones, keeping order and duplicates
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Flatten a tag list for the storage column. Empty lists are stored as NULL.
pub fn join_tags(tags: &[String]) -> Option<String> {
    let tags = normalize_tags(tags);
    if tags.is_empty() {
        None
    } else {
        Some(tags.join(&TAG_SEPARATOR.to_string()))
    }
}

/// Inverse of [`join_tags`]; also accepts hand-written comma strings
pub fn split_tags(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(TAG_SEPARATOR))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quicknotes_assistant::AssistantError;
use quicknotes_schemas::NoteId;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

pub type NotesResult<T> = Result<T, NotesError>;

#[derive(Debug, Error)]
pub enum NotesError {
    #[error("{0}")]
    Validation(String),

    #[error("Note not found: {0}")]
    NotFound(NoteId),

    /// Path segment that cannot name a note at all
    #[error("Note not found: {0}")]
    InvalidNoteId(String),

    #[error("{0}")]
    ExternalService(String),

    #[error("LLM did not return valid JSON")]
    MalformedResponse { raw: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NotesError {
    pub fn validation(message: impl Into<String>) -> Self {
        NotesError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            NotesError::Validation(_) => StatusCode::BAD_REQUEST,
            NotesError::NotFound(_) | NotesError::InvalidNoteId(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AssistantError> for NotesError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::ExternalService(message) => NotesError::ExternalService(message),
            AssistantError::MalformedResponse { raw } => NotesError::MalformedResponse { raw },
            AssistantError::Config(message) => NotesError::Config(message),
        }
    }
}

impl IntoResponse for NotesError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let body = match &self {
            NotesError::MalformedResponse { raw } => json!({
                "error": self.to_string(),
                "raw": raw,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

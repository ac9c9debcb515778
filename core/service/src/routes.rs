use axum::{
    extract::{rejection::JsonRejection, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use quicknotes_assistant::{AssistantError, CompletionClient, NoteExtractor, Translator};
use quicknotes_schemas::{NewNote, Note, NoteChanges, NoteId, TagsInput};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::database::Database;
use crate::error::{NotesError, NotesResult};
use crate::validation::{parse_optional_date, parse_optional_time, require_text};

const DEFAULT_TRANSLATION_LANGUAGE: &str = "English";

#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Database>>,
    extractor: Arc<NoteExtractor>,
    translator: Arc<Translator>,
    default_language: String,
}

impl AppState {
    pub fn new(
        db: Database,
        client: Arc<dyn CompletionClient>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            extractor: Arc::new(NoteExtractor::new(client.clone())),
            translator: Arc::new(Translator::new(client)),
            default_language: default_language.into(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // CORS layer for the browser front end
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/search", get(search_notes))
        .route("/notes/reorder", post(reorder_notes))
        .route("/notes/generate", post(generate_note))
        .route(
            "/notes/:note_id",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route("/notes/:note_id/translate", post(translate_note))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Malformed or missing JSON bodies are client errors
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> NotesResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| NotesError::validation(rejection.body_text()))
}

/// Ids that are not integers cannot name a note, so they read as not found
fn parse_note_id(raw: &str) -> NotesResult<NoteId> {
    raw.parse()
        .map(NoteId)
        .map_err(|_| NotesError::InvalidNoteId(raw.to_string()))
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`)
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "quicknotes",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ========== CRUD ==========

async fn list_notes(State(state): State<AppState>) -> NotesResult<Json<Vec<Note>>> {
    let db = state.db.lock().await;
    Ok(Json(db.list_ordered()?))
}

#[derive(Debug, Deserialize)]
struct CreateNoteRequest {
    title: Option<String>,
    content: Option<String>,
    tags: Option<TagsInput>,
    event_date: Option<String>,
    event_time: Option<String>,
}

async fn create_note(
    State(state): State<AppState>,
    payload: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> NotesResult<impl IntoResponse> {
    let request = json_body(payload)?;

    let title = require_text("title", request.title)?;
    let content = require_text("content", request.content)?;
    let new_note = NewNote {
        title,
        content,
        tags: request
            .tags
            .and_then(TagsInput::into_tags)
            .unwrap_or_default(),
        event_date: parse_optional_date(request.event_date.as_deref())?,
        event_time: parse_optional_time(request.event_time.as_deref())?,
    };

    let mut db = state.db.lock().await;
    let note = db.create_note(&new_note)?;

    info!("Created note {} at position {:?}", note.id, note.position);
    Ok((StatusCode::CREATED, Json(note)))
}

async fn get_note(
    State(state): State<AppState>,
    Path(note_id): Path<String>,
) -> NotesResult<Json<Note>> {
    let id = parse_note_id(&note_id)?;
    let db = state.db.lock().await;
    db.get_note(id)?.map(Json).ok_or(NotesError::NotFound(id))
}

#[derive(Debug, Default, Deserialize)]
struct UpdateNoteRequest {
    title: Option<String>,
    content: Option<String>,
    #[serde(default, deserialize_with = "present")]
    tags: Option<Option<TagsInput>>,
    #[serde(default, deserialize_with = "present")]
    event_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    event_time: Option<Option<String>>,
}

impl UpdateNoteRequest {
    fn into_changes(self) -> NotesResult<NoteChanges> {
        let title = self.title.map(|t| require_text("title", Some(t))).transpose()?;
        let content = self
            .content
            .map(|c| require_text("content", Some(c)))
            .transpose()?;

        // null clears the tags; an unusable type leaves them alone
        let tags = match self.tags {
            None => None,
            Some(None) => Some(Vec::new()),
            Some(Some(input)) => input.into_tags(),
        };

        let event_date = self
            .event_date
            .map(|value| parse_optional_date(value.as_deref()))
            .transpose()?;
        let event_time = self
            .event_time
            .map(|value| parse_optional_time(value.as_deref()))
            .transpose()?;

        Ok(NoteChanges {
            title,
            content,
            tags,
            event_date,
            event_time,
        })
    }
}

async fn update_note(
    State(state): State<AppState>,
    Path(note_id): Path<String>,
    payload: Result<Json<UpdateNoteRequest>, JsonRejection>,
) -> NotesResult<Json<Note>> {
    let id = parse_note_id(&note_id)?;

    // An unknown id answers 404 whatever the body holds
    let mut db = state.db.lock().await;
    if db.get_note(id)?.is_none() {
        return Err(NotesError::NotFound(id));
    }

    let changes = json_body(payload)?.into_changes()?;
    if changes.is_empty() {
        return Err(NotesError::validation("No data provided"));
    }

    let note = db.update_note(id, &changes)?;
    info!("Updated note {}", id);
    Ok(Json(note))
}

async fn delete_note(
    State(state): State<AppState>,
    Path(note_id): Path<String>,
) -> NotesResult<StatusCode> {
    let id = parse_note_id(&note_id)?;
    let mut db = state.db.lock().await;
    db.delete_note(id)?;

    info!("Deleted note {}", id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    tag: Option<String>,
}

async fn search_notes(
    State(state): State<AppState>,
    query: Option<Query<SearchQuery>>,
) -> NotesResult<Json<Vec<Note>>> {
    let params = query.map(|q| q.0).unwrap_or_default();
    let text = params.q.unwrap_or_default();
    if text.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let db = state.db.lock().await;
    let notes = db.search(&text, params.tag.as_deref())?;
    Ok(Json(notes))
}

// ========== ORDERING ==========

/// Accepts integer ids and numeric strings; anything else cannot name a note
fn note_id_from_value(value: &Value) -> Option<NoteId> {
    match value {
        Value::Number(n) => n.as_i64().map(NoteId),
        Value::String(s) => s.trim().parse().ok().map(NoteId),
        _ => None,
    }
}

async fn reorder_notes(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> NotesResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let order = body
        .get("order")
        .and_then(Value::as_array)
        .ok_or_else(|| NotesError::validation("order must be a list of note ids"))?;

    let ids: Vec<NoteId> = order.iter().filter_map(note_id_from_value).collect();

    let mut db = state.db.lock().await;
    let updated = db.reorder(&ids)?;

    info!("Reordered notes ({} positions written)", updated);
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

// ========== LLM FEATURES ==========

#[derive(Debug, Default, Deserialize)]
struct TranslateRequest {
    target_language: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Serialize)]
struct TranslationResponse {
    title: String,
    content: String,
}

async fn translate_note(
    State(state): State<AppState>,
    Path(note_id): Path<String>,
    payload: Option<Json<TranslateRequest>>,
) -> NotesResult<Json<TranslationResponse>> {
    let id = parse_note_id(&note_id)?;
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    let target = request
        .target_language
        .or(request.language)
        .filter(|lang| !lang.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TRANSLATION_LANGUAGE.to_string());

    // Release the store before calling out to the model
    let note = {
        let db = state.db.lock().await;
        db.get_note(id)?.ok_or(NotesError::NotFound(id))?
    };

    let (title, content) = tokio::join!(
        state.translator.translate_field(&note.title, &target),
        state.translator.translate_field(&note.content, &target),
    );

    // A failed title translation degrades to an empty string; content does not
    let content = content.require().map_err(|e| match e {
        AssistantError::ExternalService(reason) => {
            NotesError::ExternalService(format!("Content translation failed: {}", reason))
        }
        other => other.into(),
    })?;

    info!("Translated note {} to {}", id, target);
    Ok(Json(TranslationResponse {
        title: title.text_or_empty(),
        content,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct GenerateRequest {
    prompt: Option<String>,
    text: Option<String>,
    language: Option<String>,
    lang: Option<String>,
}

async fn generate_note(
    State(state): State<AppState>,
    payload: Option<Json<GenerateRequest>>,
) -> NotesResult<impl IntoResponse> {
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    let prompt = request
        .prompt
        .or(request.text)
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| NotesError::validation("prompt is required"))?;
    let language = request
        .language
        .or(request.lang)
        .filter(|lang| !lang.trim().is_empty())
        .unwrap_or_else(|| state.default_language.clone());

    // The note is stored only once a draft has been extracted
    let draft = state.extractor.extract(&prompt, &language).await?;

    let mut db = state.db.lock().await;
    let note = db.create_note(&draft.into_new_note())?;

    info!("Generated note {} ({:?})", note.id, note.title);
    Ok((StatusCode::CREATED, Json(note)))
}

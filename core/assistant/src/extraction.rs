use quicknotes_schemas::{NoteDraft, TagsInput, UNTITLED};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::{ChatMessage, CompletionClient};
use crate::error::{AssistantError, AssistantResult};

/// Turns free text into a [`NoteDraft`] through the completion capability.
/// Nothing is persisted here; callers store the draft only once it exists.
pub struct NoteExtractor {
    client: Arc<dyn CompletionClient>,
}

impl NoteExtractor {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn extract(&self, text: &str, language: &str) -> AssistantResult<NoteDraft> {
        let messages = [
            ChatMessage::system(build_system_prompt(language)),
            ChatMessage::user(text),
        ];

        let raw = self.client.complete(&messages).await?;
        debug!("Extraction reply ({} chars)", raw.len());

        parse_model_reply(&raw)
    }
}

/// Build extraction instructions for the requested output language
pub fn build_system_prompt(language: &str) -> String {
    format!(
        r#"Extract the user's notes into the following structured fields:
1. Title: A concise title of the notes less than 5 words
2. Notes: The notes based on user input written in full sentences.
3. Tags (A list): At most 3 Keywords or tags that categorize the content of the notes.
Output in JSON format without ```json. Output title and notes in the language: {}.
Example:
Input: "Badminton tmr 5pm @polyu".
Output:
{{
  "Title": "Badminton at PolyU",
  "Notes": "Remember to play badminton at 5pm tomorrow at PolyU.",
  "Tags": ["badminton", "sports"]
}}"#,
        language
    )
}

/// Parse a model reply into a draft, tolerating chatter around the JSON
pub fn parse_model_reply(raw: &str) -> AssistantResult<NoteDraft> {
    let object = recover_json_object(raw).ok_or_else(|| {
        warn!("Model reply contained no usable JSON object");
        AssistantError::MalformedResponse {
            raw: raw.to_string(),
        }
    })?;

    Ok(draft_from_object(&object))
}

/// Direct parse, then the first balanced `{...}` span
fn recover_json_object(raw: &str) -> Option<Map<String, Value>> {
    parse_object(raw).or_else(|| first_balanced_span(raw).and_then(parse_object))
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) if !map.is_empty() => Some(map),
        _ => None,
    }
}

/// Span from the first `{` to its matching `}`; braces inside JSON strings
/// are ignored
fn first_balanced_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Case-insensitive key lookup; an exact match wins over other spellings
fn lookup_ci<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn draft_from_object(object: &Map<String, Value>) -> NoteDraft {
    let title = lookup_ci(object, "Title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();

    let content = lookup_ci(object, "Notes")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tags = lookup_ci(object, "Tags")
        .cloned()
        .and_then(|value| serde_json::from_value::<TagsInput>(value).ok())
        .and_then(TagsInput::into_tags)
        .unwrap_or_default();

    NoteDraft {
        title,
        content,
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedClient {
        reply: AssistantResult<String>,
        seen: Mutex<Vec<ChatMessage>>,
    }

    impl CannedClient {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for CannedClient {
        async fn complete(&self, messages: &[ChatMessage]) -> AssistantResult<String> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(AssistantError::external(e.to_string())),
            }
        }
    }

    #[test]
    fn test_prompt_mentions_language_and_keys() {
        let prompt = build_system_prompt("Chinese");
        assert!(prompt.contains("in the language: Chinese."));
        assert!(prompt.contains("\"Title\": \"Badminton at PolyU\""));
        assert!(prompt.contains("At most 3"));
    }

    #[test]
    fn test_parse_reply_with_surrounding_text() {
        let raw = r#"Here you go: {"Title":"Gym","Notes":"Go to gym at 6pm.","Tags":["gym","health"]} thanks"#;
        let draft = parse_model_reply(raw).unwrap();
        assert_eq!(draft.title, "Gym");
        assert_eq!(draft.content, "Go to gym at 6pm.");
        assert_eq!(draft.tags, vec!["gym", "health"]);
    }

    #[test]
    fn test_parse_reply_without_json_is_malformed() {
        let raw = "Sorry, I cannot help with that.";
        match parse_model_reply(raw) {
            Err(AssistantError::MalformedResponse { raw: kept }) => assert_eq!(kept, raw),
            other => panic!("expected malformed response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_reply_with_broken_json_is_malformed() {
        let raw = r#"{"Title": "Gym", "Notes": }"#;
        assert!(matches!(
            parse_model_reply(raw),
            Err(AssistantError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_empty_object_is_malformed() {
        assert!(matches!(
            parse_model_reply("{}"),
            Err(AssistantError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_lowercase_keys_and_defaults() {
        let draft = parse_model_reply(r#"{"notes": "Buy milk."}"#).unwrap();
        assert_eq!(draft.title, UNTITLED);
        assert_eq!(draft.content, "Buy milk.");
        assert!(draft.tags.is_empty());

        let draft = parse_model_reply(r#"{"TITLE": "Shopping", "tags": " food , errands "}"#).unwrap();
        assert_eq!(draft.title, "Shopping");
        assert_eq!(draft.content, "");
        assert_eq!(draft.tags, vec!["food", "errands"]);
    }

    #[test]
    fn test_tags_of_other_type_are_absent() {
        let draft = parse_model_reply(r#"{"Title": "X", "Notes": "Y", "Tags": 5}"#).unwrap();
        assert!(draft.tags.is_empty());
    }

    #[test]
    fn test_braces_inside_strings_do_not_end_span() {
        let raw = r#"Result: {"Title": "Set {x}", "Notes": "Use } carefully", "Tags": []} and {more}"#;
        let draft = parse_model_reply(raw).unwrap();
        assert_eq!(draft.title, "Set {x}");
        assert_eq!(draft.content, "Use } carefully");
    }

    #[test]
    fn test_balanced_span_handles_escapes_and_trailing_braces() {
        let raw = r#"{"Title": "Say \"hi\" {", "Tags": ["a"]}}"#;
        assert_eq!(
            first_balanced_span(raw),
            Some(r#"{"Title": "Say \"hi\" {", "Tags": ["a"]}"#)
        );
        assert_eq!(first_balanced_span("no braces"), None);
        assert_eq!(first_balanced_span("{never closed"), None);
    }

    #[test]
    fn test_only_first_span_is_considered() {
        let raw = r#"note {oops} {"Title": "Later"}"#;
        assert!(matches!(
            parse_model_reply(raw),
            Err(AssistantError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_extractor_sends_prompt_and_text() {
        let client = Arc::new(CannedClient::replying(
            r#"{"Title":"Badminton","Notes":"Play at 5pm.","Tags":["sports"]}"#,
        ));
        let extractor = NoteExtractor::new(client.clone());

        let draft = extractor.extract("Badminton tmr 5pm", "English").await.unwrap();
        assert_eq!(draft.title, "Badminton");

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].content.contains("language: English"));
        assert_eq!(seen[1], ChatMessage::user("Badminton tmr 5pm"));
    }

    #[tokio::test]
    async fn test_extractor_propagates_service_errors() {
        let client = Arc::new(CannedClient {
            reply: Err(AssistantError::external("connection refused")),
            seen: Mutex::new(Vec::new()),
        });
        let extractor = NoteExtractor::new(client);

        let err = extractor.extract("anything", "English").await.unwrap_err();
        assert!(matches!(err, AssistantError::ExternalService(_)));
    }
}

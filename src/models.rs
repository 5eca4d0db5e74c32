// Wire types for the Open WebUI chat API. Field names mirror the JSON the
// server sends and expects, so most structs derive serde directly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage { role: Role::Assistant, content: content.into() }
    }
}

/// Reference to a previously uploaded file, serialized as
/// `{"type": "file", "id": "..."}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl FileRef {
    pub fn file(id: impl Into<String>) -> Self {
        FileRef { kind: "file".into(), id: id.into() }
    }
}

/// A file the server accepted. The id is opaque and owned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: String,
    pub display_name: String,
    pub local_path: PathBuf,
}

impl UploadedFile {
    pub fn file_ref(&self) -> FileRef {
        FileRef::file(self.id.clone())
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileRef>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        ChatRequest { model: model.into(), messages, files: Vec::new(), stream: false }
    }

    pub fn with_files(mut self, files: Vec<FileRef>) -> Self {
        self.files = files;
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Body of a non-streamed completion. Only the fields the client reads are
/// typed; everything else the server adds is ignored.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Completion {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CompletionMessage {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
}

/// One frame of a streamed completion.
#[derive(Deserialize, Debug, Clone)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamChunk {
    /// `choices[0].delta.content`, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.delta.content.as_deref())
    }
}

/// The server answers streamed and non-streamed requests with different
/// shapes; this enum is the single type callers deal with.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatResponse {
    Complete(Completion),
    Streamed { content: String },
}

impl ChatResponse {
    pub fn content(&self) -> Option<&str> {
        match self {
            ChatResponse::Complete(c) => c
                .choices
                .first()
                .and_then(|choice| choice.message.content.as_deref()),
            ChatResponse::Streamed { content } => Some(content),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owned_by: Option<String>,
}

/// `/api/models` returns either `{"data": [...]}` or a bare list depending
/// on the server version.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ModelList {
    Wrapped { data: Vec<ModelEntry> },
    Bare(Vec<ModelEntry>),
}

/// One listing entry. Entries that are not well-formed descriptors are
/// kept rather than failing the whole listing.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ModelEntry {
    Descriptor(ModelDescriptor),
    Name(String),
    Other(serde_json::Value),
}

impl From<ModelEntry> for ModelDescriptor {
    fn from(entry: ModelEntry) -> Self {
        let id = match entry {
            ModelEntry::Descriptor(descriptor) => return descriptor,
            ModelEntry::Name(name) => name,
            ModelEntry::Other(serde_json::Value::Object(map)) => {
                map.get("id").map(display_value).unwrap_or_default()
            }
            ModelEntry::Other(value) => display_value(&value),
        };
        ModelDescriptor { id, name: None, owned_by: None }
    }
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ModelDescriptor {
    /// Identifier to show to the user.
    pub fn label(&self) -> &str {
        if self.id.is_empty() {
            "Unknown"
        } else {
            &self.id
        }
    }
}

impl ModelList {
    pub fn into_models(self) -> Vec<ModelDescriptor> {
        let entries = match self {
            ModelList::Wrapped { data } => data,
            ModelList::Bare(entries) => entries,
        };
        entries.into_iter().map(ModelDescriptor::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_empty_files_and_false_stream() {
        let req = ChatRequest::new("m", vec![ChatMessage::user("hi")]);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]})
        );
    }

    #[test]
    fn request_carries_file_refs_when_streaming() {
        let req = ChatRequest::new("m", vec![ChatMessage::user("hi")])
            .with_files(vec![FileRef::file("abc")])
            .streaming(true);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["files"], json!([{"type": "file", "id": "abc"}]));
        assert_eq!(value["stream"], json!(true));
    }

    #[test]
    fn both_model_list_shapes_normalize_identically() {
        let models = json!([{"id": "a", "name": "A"}, {"id": "b", "extra": 1}]);
        let wrapped: ModelList = serde_json::from_value(json!({ "data": models.clone() })).unwrap();
        let bare: ModelList = serde_json::from_value(models).unwrap();
        assert_eq!(wrapped.into_models(), bare.into_models());
    }

    #[test]
    fn odd_entries_do_not_empty_the_listing() {
        let list: ModelList = serde_json::from_value(json!({
            "data": [{"id": "a"}, {"id": 7}, {"name": "no id"}, 3]
        }))
        .unwrap();
        let labels: Vec<String> = list.into_models().iter().map(|m| m.label().to_string()).collect();
        assert_eq!(labels, ["a", "7", "Unknown", "3"]);

        let names: ModelList = serde_json::from_value(json!(["a", "b"])).unwrap();
        let ids: Vec<String> = names.into_models().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn completion_content_reads_first_choice() {
        let body: Completion = serde_json::from_value(json!({
            "id": "x",
            "choices": [{"message": {"role": "assistant", "content": "hello"}}]
        }))
        .unwrap();
        assert_eq!(ChatResponse::Complete(body).content(), Some("hello"));
        assert_eq!(ChatResponse::Complete(Completion::default()).content(), None);
    }
}

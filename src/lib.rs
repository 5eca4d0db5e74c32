// Library root
// -----------
// A command-line client for an Open WebUI server: text chat, streamed
// answers, file upload and file-backed (RAG) questions.
//
// Module responsibilities:
// - `config`: resolves base URL, API key, default model and the upload
//   policy from the environment.
// - `models`: serde types for the chat API payloads.
// - `api`: blocking HTTP client for model listing, upload and completion.
// - `interrupt`: Ctrl-C flag shared by the stream reader and the loop.
// - `stream`: turns a `data: ...` event stream back into one answer.
// - `ui`: the interactive loop and the one-shot query flow.
pub mod api;
pub mod config;
pub mod interrupt;
pub mod models;
pub mod stream;
pub mod ui;

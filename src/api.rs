// API client module: a small blocking HTTP client for the Open WebUI
// endpoints this tool needs (model listing, file upload, chat completion).
//
// Every call returns a `TransportError` instead of panicking so the
// interactive session can report the failure and keep going. The
// `ChatBackend` trait is the seam the session loop talks to.

use crate::config::{Config, ConfigError};
use crate::interrupt::InterruptFlag;
use crate::models::{
    ChatRequest, ChatResponse, Completion, ModelDescriptor, ModelList, UploadedFile,
};
use crate::stream;
use anyhow::Context;
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("file does not exist: {0}")]
    FileNotFound(PathBuf),
    #[error("file type not allowed: {0}")]
    FileTypeNotAllowed(PathBuf),
    #[error("file too large: {path} ({size} bytes, limit {limit})")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("cannot parse response: {0}")]
    Decode(String),
    #[error("upload response has no file id")]
    MissingFileId,
}

impl TransportError {
    /// HTTP status code, when the server answered with an error status.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Outcome of the startup connection check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Connected,
    UnexpectedStatus(u16),
}

/// Operations the chat session needs from the server.
pub trait ChatBackend {
    fn list_models(&self) -> Result<Vec<ModelDescriptor>, TransportError>;

    fn upload_file(&self, path: &Path) -> Result<UploadedFile, TransportError>;

    /// Run a completion. For streamed requests, fragments are written to
    /// `sink` as they arrive.
    fn chat_completion(
        &self,
        request: &ChatRequest,
        sink: &mut dyn Write,
    ) -> Result<ChatResponse, TransportError>;
}

/// Blocking client bound to one Open WebUI instance and API key.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: Config,
    interrupt: InterruptFlag,
}

impl ApiClient {
    /// Build a client for the given configuration. The bearer token is
    /// installed as a default header, so an unusable key fails here rather
    /// than on the first request.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let headers = auth_headers(&config.api_key)?;
        let client = Client::builder()
            .default_headers(headers)
            .timeout(None::<Duration>)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient { client, config, interrupt: InterruptFlag::new() })
    }

    /// Stop reading streamed answers once `interrupt` is raised.
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn get_json(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).header(ACCEPT, "application/json")
    }

    /// Check that the server is reachable and accepts the key. Only a
    /// transport failure is an error; an unexpected status is reported as
    /// an outcome so the caller can warn and carry on.
    pub fn probe(&self) -> Result<ProbeOutcome, TransportError> {
        let res = self.get_json("/api/models").send()?;
        let status = res.status();
        if status.is_success() {
            info!(base_url = %self.config.base_url, "connected");
            Ok(ProbeOutcome::Connected)
        } else {
            warn!(status = status.as_u16(), "connection probe returned non-success status");
            Ok(ProbeOutcome::UnexpectedStatus(status.as_u16()))
        }
    }

    fn check_uploadable(&self, path: &Path) -> Result<u64, TransportError> {
        if !path.exists() {
            return Err(TransportError::FileNotFound(path.to_path_buf()));
        }
        if !self.config.is_file_type_allowed(path) {
            return Err(TransportError::FileTypeNotAllowed(path.to_path_buf()));
        }
        let size = std::fs::metadata(path)
            .map_err(|source| TransportError::Io { path: path.to_path_buf(), source })?
            .len();
        if size > self.config.max_file_size {
            return Err(TransportError::FileTooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.config.max_file_size,
            });
        }
        Ok(size)
    }
}

impl ChatBackend for ApiClient {
    /// GET /api/models. Accepts both the wrapped and the bare list shape;
    /// anything else is logged and treated as an empty listing.
    fn list_models(&self) -> Result<Vec<ModelDescriptor>, TransportError> {
        let res = error_for_status(self.get_json("/api/models").send()?)?;
        let body = res.text()?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;
        match serde_json::from_value::<ModelList>(value) {
            Ok(list) => Ok(list.into_models()),
            Err(e) => {
                warn!(error = %e, body = %body, "unknown model list format");
                Ok(Vec::new())
            }
        }
    }

    /// POST /api/v1/files/ as multipart with a single `file` field.
    fn upload_file(&self, path: &Path) -> Result<UploadedFile, TransportError> {
        let size = self.check_uploadable(path)?;

        let file = File::open(path)
            .map_err(|source| TransportError::Io { path: path.to_path_buf(), source })?;
        let display_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("upload")
            .to_string();
        let part = multipart::Part::reader_with_length(file, size).file_name(display_name.clone());
        let form = multipart::Form::new().part("file", part);

        debug!(path = %path.display(), size, "uploading file");
        let res = self
            .client
            .post(self.url("/api/v1/files/"))
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()?;
        let res = error_for_status(res)?;

        let body: serde_json::Value = serde_json::from_str(&res.text()?)
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
            .ok_or(TransportError::MissingFileId)?
            .to_string();

        info!(id = %id, file = %display_name, "file uploaded");
        Ok(UploadedFile { id, display_name, local_path: path.to_path_buf() })
    }

    /// POST /api/chat/completions. Streamed bodies go through the
    /// reassembler; plain bodies are decoded as a `Completion`.
    fn chat_completion(
        &self,
        request: &ChatRequest,
        sink: &mut dyn Write,
    ) -> Result<ChatResponse, TransportError> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            files = request.files.len(),
            stream = request.stream,
            "sending chat completion"
        );
        let res = self
            .client
            .post(self.url("/api/chat/completions"))
            .header(ACCEPT, "application/json")
            .json(request)
            .send()?;
        let res = error_for_status(res)?;

        if request.stream {
            let summary = stream::reassemble(BufReader::new(res), sink, &self.interrupt);
            debug!(
                frames = summary.frames,
                skipped = summary.skipped,
                finished = summary.finished,
                interrupted = summary.interrupted,
                "stream closed"
            );
            Ok(ChatResponse::Streamed { content: summary.content })
        } else {
            let completion: Completion = serde_json::from_str(&res.text()?)
                .map_err(|e| TransportError::Decode(e.to_string()))?;
            Ok(ChatResponse::Complete(completion))
        }
    }
}

/// Build the `Authorization: Bearer <key>` header map.
fn auth_headers(api_key: &str) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    let mut val = HeaderValue::from_str(&format!("Bearer {}", api_key))
        .map_err(|_| ConfigError::InvalidApiKey)?;
    val.set_sensitive(true);
    headers.insert(AUTHORIZATION, val);
    Ok(headers)
}

/// Turn a non-2xx response into `TransportError::Status`, keeping the body
/// for the diagnostic.
fn error_for_status(res: Response) -> Result<Response, TransportError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().unwrap_or_default();
    warn!(status = status.as_u16(), body = %body, "server returned error status");
    Err(TransportError::Status { status: status.as_u16(), body })
}

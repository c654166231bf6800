//! Resilient client for ADK-style agent backends.
//!
//! `manugen-client` talks to a remote multi-agent pipeline over HTTP. It
//! gets or lazily creates a conversation [`Session`], submits user input,
//! and consumes the stream of typed [`Event`]s the pipeline emits while it
//! works, reducing them to a single text answer.
//!
//! # Getting started
//!
//! ```ignore
//! use manugen_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ClientError> {
//!     let config = ClientConfig::new("http://localhost:8000/adk_api", "ai_science_writer")?;
//!     let client = AdkClient::new(config.clone())?;
//!
//!     let identity = SessionIdentity::new(&config.app_name, &config.user_id, &SystemClock);
//!     let bootstrapper = SessionBootstrapper::new(client.clone(), identity, config.session_retry);
//!
//!     let cancel = CancellationToken::new();
//!     let session = bootstrapper.session(&cancel).await?;
//!
//!     let answer = client
//!         .ask(session, "Draft an abstract for ...", &LoggingObserver, &cancel)
//!         .await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Session bootstrap:** [`SessionBootstrapper`](api::session::SessionBootstrapper)
//!   fetches an existing session or creates one under retry, once per identity.
//!   Identities come from [`SessionIdentity`](identity::SessionIdentity) and an
//!   injected [`Clock`](identity::Clock).
//! - **Streaming runs:** [`AdkClient::run_sse`] and the
//!   [`EventStream`](api::streaming::EventStream) state machine in
//!   [`api::streaming`]. Observe events as they arrive with an
//!   [`EventObserver`](observer::EventObserver).
//! - **Reducing output:** [`extract_text`](api::reduce::extract_text).
//! - **Attachments:** [`AdkClient::submit_artifact`] in [`api::artifact`].
//! - **Citations:** [`CitationCache`](api::citations::CitationCache).
//! - **Retry:** [`RetrySchedule`](api::retry::RetrySchedule) and
//!   [`retry_with_schedule`](api::retry::retry_with_schedule).
//! - **Errors:** [`ClientError`](error::ClientError).

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod observer;
pub mod prelude;

use base64::Engine;
use config::ClientConfig;
use error::ClientError;
use identity::SessionIdentity;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use url::Url;

pub use tokio_util::sync::CancellationToken;

// ── Session ────────────────────────────────────────────────────────

/// A conversation context on the backend.
///
/// Immutable once obtained. Fields beyond the identity triple (`state`,
/// `events`, `lastUpdateTime`, ...) are kept verbatim in `extra`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of a session-creation POST.
#[derive(Serialize, Debug, Default)]
struct CreateSessionRequest {
    state: serde_json::Map<String, serde_json::Value>,
}

// ── Event types ────────────────────────────────────────────────────

/// One unit of agent output within a run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<EventActions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    /// An event authored by `author` with a single text part.
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: Some(Content::model(vec![Part::text(text)])),
            ..Default::default()
        }
    }

    /// Parts of the event's content, empty when it has none.
    pub fn parts(&self) -> &[Part] {
        self.content.as_ref().map_or(&[], |c| c.parts.as_slice())
    }

    /// The agent this event hands control to, if any.
    pub fn transfer_to_agent(&self) -> Option<&str> {
        self.actions.as_ref()?.transfer_to_agent.as_deref()
    }

    /// All text parts joined with a newline.
    pub fn joined_text(&self) -> String {
        self.parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Message content: a role and an ordered list of parts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".into()),
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Some("model".into()),
            parts,
        }
    }
}

/// One piece of content: text, inline binary data, or something this client
/// does not interpret (function calls and responses end up in `extra`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn inline_data(data: InlineData) -> Self {
        Self {
            inline_data: Some(data),
            ..Default::default()
        }
    }
}

/// Base64-encoded binary payload with its MIME type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub data: String,
    pub mime_type: String,
}

/// Image types accepted as uploads, by file extension.
pub const IMAGE_MIME_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
];

impl InlineData {
    /// Encode raw bytes as an inline payload.
    pub fn from_bytes(
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        Self {
            display_name: Some(display_name.into()),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Read an image file, inferring the MIME type from its extension.
    pub fn from_path(path: &Path) -> Result<Self, ClientError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mime = mime_for_extension(&extension).ok_or_else(|| {
            ClientError::UnsupportedUpload(format!(
                "'{}' is not a supported image type",
                path.display()
            ))
        })?;
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_bytes(name, mime, &bytes))
    }
}

/// MIME type for an image file extension (without the dot), if supported.
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    IMAGE_MIME_TYPES
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
}

/// Control actions attached to an event.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Run request types ──────────────────────────────────────────────

/// The new user message submitted with a run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewMessage {
    pub role: String,
    pub parts: Vec<Part>,
}

impl NewMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Part::text(text)])
    }

    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".into(),
            parts,
        }
    }
}

/// Body of the `run` and `run_sse` endpoints.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub new_message: NewMessage,
    /// Ask the backend for token-level partial events. Only `run_sse`
    /// honours it; set through `ClientConfig::with_token_streaming`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub streaming: bool,
}

impl RunRequest {
    /// A run against `session`, reusing its identity triple unmodified.
    pub fn new(session: &Session, new_message: NewMessage) -> Self {
        Self {
            app_name: session.app_name.clone(),
            user_id: session.user_id.clone(),
            session_id: session.id.clone(),
            new_message,
            streaming: false,
        }
    }
}

// ── Transport ──────────────────────────────────────────────────────

/// Options for a single request/response exchange.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }

    /// A POST with a JSON body.
    pub fn post_json(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an ADK agent backend.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct AdkClient {
    pub(crate) http: reqwest::Client,
    pub(crate) config: ClientConfig,
}

impl AdkClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        // No overall timeout on the client: streaming bodies stay open for
        // the whole run. Non-streaming calls get one per request.
        let http = reqwest::Client::builder()
            .user_agent(concat!("manugen-client/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_http(config, http))
    }

    pub fn with_http(config: ClientConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Append path segments (percent-encoded) to the base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.config.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase)
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `{base}/apps/{app}/users/{user}/sessions/{session}`.
    pub fn session_url(&self, identity: &SessionIdentity) -> Result<Url, ClientError> {
        self.endpoint(&[
            "apps",
            &identity.app_name,
            "users",
            &identity.user_id,
            "sessions",
            &identity.session_id,
        ])
    }

    pub fn run_url(&self) -> Result<Url, ClientError> {
        self.endpoint(&["run"])
    }

    pub fn run_sse_url(&self) -> Result<Url, ClientError> {
        self.endpoint(&["run_sse"])
    }

    /// Perform one request/response exchange and decode the JSON body.
    ///
    /// No caching and no retry. Fails with [`ClientError::Transport`] when
    /// the exchange cannot complete, [`ClientError::HttpStatus`] on a
    /// non-success status, and [`ClientError::Decode`] when the body is not
    /// valid JSON for `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        url: Url,
        options: &RequestOptions,
    ) -> Result<T, ClientError> {
        debug!("{} {}", options.method, url);

        let mut builder = self
            .http
            .request(options.method.clone(), url.clone())
            .timeout(self.config.request_timeout);
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        let start = Instant::now();
        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        debug!(
            "HTTP {} from {} in {:.2}s ({} bytes)",
            status,
            url.path(),
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            warn!("Failed to parse response from {} as JSON: {e}", url.path());
            trace!("Unparseable body: {text}");
            ClientError::Decode(e)
        })
    }

    // ── Sessions ───────────────────────────────────────────────────

    /// Fetch an existing session. Read-only and safe to repeat.
    pub async fn get_session(&self, identity: &SessionIdentity) -> Result<Session, ClientError> {
        self.request(self.session_url(identity)?, &RequestOptions::get())
            .await
    }

    /// Create a session at `identity` with an empty initial state. One POST.
    pub async fn create_session(&self, identity: &SessionIdentity) -> Result<Session, ClientError> {
        let body = serde_json::to_value(CreateSessionRequest::default())?;
        self.request(
            self.session_url(identity)?,
            &RequestOptions::post_json(body).with_header("Content-Type", "application/json"),
        )
        .await
    }

    // ── Runs ───────────────────────────────────────────────────────

    /// Submit a message through the non-streaming run endpoint and return
    /// every event the run produced.
    pub async fn run(
        &self,
        session: &Session,
        message: NewMessage,
    ) -> Result<Vec<Event>, ClientError> {
        let body = serde_json::to_value(RunRequest::new(session, message))?;
        let events: Vec<Event> = self
            .request(self.run_url()?, &RequestOptions::post_json(body))
            .await?;
        debug!("Batch run returned {} event(s)", events.len());
        Ok(events)
    }
}

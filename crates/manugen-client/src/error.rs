//! Error taxonomy for every client operation.
//!
//! Transport and decode failures propagate to the immediate caller
//! unchanged. Only session bootstrap recovers locally (retry with backoff)
//! and re-raises as [`ClientError::ExhaustedRetries`]. Streaming and artifact
//! failures are never retried here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The exchange could not be completed (DNS, connect, reset, timeout).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response arrived with a non-success status.
    #[error("HTTP {status}: {status_text}")]
    HttpStatus {
        status: u16,
        status_text: String,
        body: String,
    },

    /// A response body or stream frame was not valid JSON for the expected type.
    #[error("failed to parse response as JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("couldn't create session after {attempts} tries")]
    ExhaustedRetries {
        attempts: usize,
        last_error: Option<Box<ClientError>>,
    },

    /// The event channel errored before closing normally. `received` counts
    /// events that arrived before the failure; they are not returned.
    #[error("event stream failed after {received} event(s): {reason}")]
    Stream { received: usize, reason: String },

    #[error("malformed artifact description: {source}")]
    ArtifactParse {
        text: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("citation service returned {received} record(s) for {requested} id(s)")]
    CitationMismatch { requested: usize, received: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported upload: {0}")]
    UnsupportedUpload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ClientError::ExhaustedRetries { .. } => "could not start conversation",
            ClientError::Stream { .. } => "response interrupted",
            ClientError::ArtifactParse { .. } | ClientError::UnsupportedUpload(_) => {
                "could not process attachment"
            }
            ClientError::Cancelled => "cancelled",
            ClientError::CitationMismatch { .. } => "could not look up citations",
            ClientError::Transport(_) | ClientError::HttpStatus { .. } => {
                "could not reach the server"
            }
            ClientError::Decode(_) => "unexpected response from the server",
            ClientError::InvalidUrl(_) => "invalid server address",
            ClientError::Io(_) => "could not read input",
        }
    }

    /// HTTP status code, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

//! Configuration for [`AdkClient`](crate::AdkClient).
//!
//! # Examples
//!
//! Defaults point at a local backend:
//!
//! ```ignore
//! let config = ClientConfig::default();
//! ```
//!
//! Customized with builder methods:
//!
//! ```ignore
//! let config = ClientConfig::new("https://writer.example.org/adk_api", "ai_science_writer")?
//!     .with_user_id("reviewer")
//!     .with_request_timeout(Duration::from_secs(30))
//!     .with_citation_url("https://cite.example.org/cite")?;
//! ```

use crate::api::retry::RetrySchedule;
use crate::error::ClientError;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/adk_api";

pub const DEFAULT_APP_NAME: &str = "ai_science_writer";

/// The backend has no user accounts; every session lives under this id.
pub const DEFAULT_USER_ID: &str = "user";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the agent API. Session and run paths are appended to it.
    pub api_url: Url,
    pub app_name: String,
    pub user_id: String,
    /// Delays between session-creation attempts.
    pub session_retry: RetrySchedule,
    /// Timeout for non-streaming requests. Streaming runs have none; cancel
    /// them through the run's token instead.
    pub request_timeout: Duration,
    /// Citation lookup endpoint (`POST {url}` with `{ "ids": [...] }`).
    pub citation_url: Option<Url>,
    /// Ask `run_sse` for token-level `partial` events as well as the
    /// aggregated ones.
    pub token_streaming: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("DEFAULT_API_URL is a valid URL"),
            app_name: DEFAULT_APP_NAME.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            session_retry: RetrySchedule::default(),
            request_timeout: Duration::from_secs(120),
            citation_url: None,
            token_streaming: false,
        }
    }
}

impl ClientConfig {
    /// Create a config for the given API base URL and app name.
    pub fn new(api_url: &str, app_name: impl Into<String>) -> Result<Self, ClientError> {
        Ok(Self {
            api_url: parse_base_url(api_url)?,
            app_name: app_name.into(),
            ..Default::default()
        })
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_session_retry(mut self, schedule: RetrySchedule) -> Self {
        self.session_retry = schedule;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_token_streaming(mut self, enabled: bool) -> Self {
        self.token_streaming = enabled;
        self
    }

    pub fn with_citation_url(mut self, url: &str) -> Result<Self, ClientError> {
        self.citation_url = Some(Url::parse(url)?);
        Ok(self)
    }
}

/// Parse a base URL that paths will be appended to.
///
/// Rejects URLs that cannot carry path segments (`mailto:`, `data:`).
pub fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_local_backend() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url.as_str(), "http://localhost:8000/adk_api");
        assert_eq!(config.app_name, "ai_science_writer");
        assert_eq!(config.user_id, "user");
        assert_eq!(config.session_retry.len(), 7);
        assert!(config.citation_url.is_none());
        assert!(!config.token_streaming);
    }

    #[test]
    fn builder_overrides_fields() {
        let config = ClientConfig::new("https://api.example.org/adk", "writer")
            .unwrap()
            .with_user_id("alice")
            .with_request_timeout(Duration::from_secs(5))
            .with_session_retry(RetrySchedule::from_millis([10, 20]))
            .with_token_streaming(true)
            .with_citation_url("https://cite.example.org/cite")
            .unwrap();
        assert_eq!(config.app_name, "writer");
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.session_retry.len(), 2);
        assert!(config.token_streaming);
        assert_eq!(
            config.citation_url.unwrap().as_str(),
            "https://cite.example.org/cite"
        );
    }

    #[test]
    fn rejects_unparseable_and_non_base_urls() {
        assert!(matches!(
            ClientConfig::new("not a url", "app"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_base_url("mailto:someone@example.org"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}

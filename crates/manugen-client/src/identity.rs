//! Session identity: the app/user/session triple a conversation lives under.
//!
//! The session id is derived from a [`Clock`] once, by whoever sets up the
//! process, and then threaded explicitly into the bootstrapper.

use chrono::{DateTime, TimeZone, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant. Useful for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Clock fixed at the given Unix timestamp (seconds). Out-of-range
    /// values fall back to the epoch.
    pub fn from_unix(secs: i64) -> Self {
        Self(
            Utc.timestamp_opt(secs, 0)
                .single()
                .unwrap_or(DateTime::UNIX_EPOCH),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The app/user/session triple that addresses one backend session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionIdentity {
    /// Build an identity whose session id is `session-{unix seconds}` at
    /// the clock's current time.
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: format!("session-{}", clock.now().timestamp()),
        }
    }

    /// Build an identity for a known session id.
    pub fn with_session_id(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl std::fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

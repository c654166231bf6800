//! Convenience re-exports for common `manugen-client` types.
//!
//! ```ignore
//! use manugen_client::prelude::*;
//! ```
//!
//! Covers what a typical caller needs to bootstrap a session, run a prompt,
//! and observe its events. The SSE decoder, stream state machine, and retry
//! outcome types are left out; import those from [`api`](crate::api).

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    AdkClient, CancellationToken, Content, Event, InlineData, NewMessage, Part, Session,
};
pub use crate::config::ClientConfig;
pub use crate::error::ClientError;
pub use crate::identity::{Clock, FixedClock, SessionIdentity, SystemClock};

// ── Runs ────────────────────────────────────────────────────────────
pub use crate::api::{
    ArtifactDescription, Citation, CitationCache, RetrySchedule, SessionBootstrapper,
    extract_text,
};

// ── Observers ───────────────────────────────────────────────────────
pub use crate::observer::{
    CompositeObserver, EventObserver, FnObserver, LoggingObserver, NoopObserver,
    ProgressObserver, progress_notice,
};

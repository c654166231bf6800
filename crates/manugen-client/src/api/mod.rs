//! Backend interaction layer built on [`AdkClient`](crate::AdkClient):
//!
//! - [`retry`]: finite escalating delay schedule and the generic retry
//!   driver. Empty results are retried like errors.
//! - [`session`]: [`SessionBootstrapper`](session::SessionBootstrapper), the
//!   get-or-create flow with a single in-flight attempt per identity.
//! - [`streaming`]: Server-Sent Events decoding, the per-run
//!   [`EventStream`](streaming::EventStream) state machine, and
//!   `AdkClient::run_sse`.
//! - [`reduce`]: collapse a run's events into one text answer.
//! - [`artifact`]: image submission through the batch run endpoint.
//! - [`citations`]: CSL citation lookup behind a write-once cache.

pub mod artifact;
pub mod citations;
pub mod reduce;
pub mod retry;
pub mod session;
pub mod streaming;

pub use artifact::ArtifactDescription;
pub use citations::{Citation, CitationCache, CitationSource, ManubotClient};
pub use reduce::extract_text;
pub use retry::{RetryOutcome, RetrySchedule, retry_with_schedule};
pub use session::SessionBootstrapper;
pub use streaming::{EventStream, StreamState, consume_event_stream};

//! Get-or-create session bootstrap.
//!
//! [`SessionBootstrapper`] first fetches the session at its identity. If that
//! fails for any reason it creates one under the retry schedule. The result
//! is memoized for the bootstrapper's lifetime, and concurrent callers wait
//! on the attempt already in flight instead of issuing their own creates.
//!
//! A failed bootstrap is not memoized. The next call starts over from the
//! fetch. Callers queued behind a failing attempt also start over, one at a
//! time.

use crate::api::retry::{RetryOutcome, RetrySchedule, retry_with_schedule};
use crate::error::ClientError;
use crate::identity::SessionIdentity;
use crate::{AdkClient, Session};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct SessionBootstrapper {
    client: AdkClient,
    identity: SessionIdentity,
    schedule: RetrySchedule,
    session: OnceCell<Session>,
}

impl SessionBootstrapper {
    pub fn new(client: AdkClient, identity: SessionIdentity, schedule: RetrySchedule) -> Self {
        Self {
            client,
            identity,
            schedule,
            session: OnceCell::new(),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// The session, if a bootstrap has already succeeded.
    pub fn cached(&self) -> Option<&Session> {
        self.session.get()
    }

    /// Obtain the session, bootstrapping it on first use.
    ///
    /// Fails with [`ClientError::ExhaustedRetries`] when creation never
    /// succeeded within the schedule, or [`ClientError::Cancelled`].
    pub async fn session(&self, cancel: &CancellationToken) -> Result<&Session, ClientError> {
        self.session
            .get_or_try_init(|| self.bootstrap(cancel))
            .await
    }

    async fn bootstrap(&self, cancel: &CancellationToken) -> Result<Session, ClientError> {
        let existing = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = self.client.get_session(&self.identity) => result,
        };
        match existing {
            Ok(session) => {
                debug!("Reusing existing session {}", self.identity);
                return Ok(session);
            }
            Err(e) => debug!("No existing session at {} ({e}); creating", self.identity),
        }

        debug!(
            "Creating session {} (up to {} attempt(s) over {:?})",
            self.identity,
            self.schedule.max_attempts(),
            self.schedule.total_delay()
        );
        let outcome = retry_with_schedule(&self.schedule, cancel, || async {
            // A created session without an id is not usable yet.
            self.client
                .create_session(&self.identity)
                .await
                .map(|session| (!session.id.is_empty()).then_some(session))
        })
        .await;
        debug!("Session creation ended after {} attempt(s)", outcome.attempts());

        match outcome {
            RetryOutcome::Success { value, attempts } => {
                info!("Created session {} after {attempts} attempt(s)", self.identity);
                Ok(value)
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => Err(ClientError::ExhaustedRetries {
                attempts,
                last_error: last_error.map(Box::new),
            }),
            RetryOutcome::Cancelled { .. } => Err(ClientError::Cancelled),
        }
    }
}

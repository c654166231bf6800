//! Retry on an escalating, finite delay schedule.
//!
//! [`retry_with_schedule`] invokes an operation, and on failure (an error
//! *or* a "not yet" result) waits the next scheduled delay and tries again.
//! A schedule of `n` delays allows `n + 1` attempts. The schedule is borrowed
//! read-only, so concurrent calls sharing one schedule do not interfere.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// An ordered, finite list of delays consumed front to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl Default for RetrySchedule {
    /// 100ms, 500ms, 1s, 2s, 3s, 4s, 5s.
    fn default() -> Self {
        Self::from_millis([100, 500, 1000, 2000, 3000, 4000, 5000])
    }
}

impl RetrySchedule {
    pub fn from_millis(millis: impl IntoIterator<Item = u64>) -> Self {
        Self {
            delays: millis.into_iter().map(Duration::from_millis).collect(),
        }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Total attempts this schedule allows (initial attempt plus one per delay).
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Sum of every delay; the longest a fully failing run waits.
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// How a retried operation ended.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// The operation produced a result on attempt `attempts`.
    Success { value: T, attempts: usize },
    /// Every attempt failed or came back empty. `last_error` is the most
    /// recent error, if the final attempts failed with one.
    Exhausted {
        attempts: usize,
        last_error: Option<E>,
    },
    /// The token was cancelled before a result arrived.
    Cancelled { attempts: usize },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> usize {
        match self {
            RetryOutcome::Success { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Cancelled { attempts } => *attempts,
        }
    }
}

/// Run `op` until it yields `Ok(Some(value))`, the schedule runs out, or
/// `cancel` fires.
///
/// `Ok(None)` means "not yet" (e.g. resource not found yet) and is retried
/// exactly like an error. The first success returns immediately, with no
/// further delay.
pub async fn retry_with_schedule<T, E, F, Fut>(
    schedule: &RetrySchedule,
    cancel: &CancellationToken,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: std::fmt::Display,
{
    let mut delays = schedule.delays().iter();
    let mut attempts = 0;

    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled { attempts };
        }

        attempts += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts },
            result = op() => result,
        };

        let last_error = match result {
            Ok(Some(value)) => {
                debug!("Retried operation succeeded on attempt {attempts}");
                return RetryOutcome::Success { value, attempts };
            }
            Ok(None) => {
                debug!("Attempt {attempts} returned no result");
                None
            }
            Err(e) => {
                warn!("Attempt {attempts}/{} failed: {e}", schedule.max_attempts());
                Some(e)
            }
        };

        let Some(&delay) = delays.next() else {
            return RetryOutcome::Exhausted {
                attempts,
                last_error,
            };
        };

        debug!("Retrying in {delay:?}");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts },
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn counting_op(
        calls: Arc<AtomicUsize>,
        succeed_on: usize,
    ) -> impl FnMut() -> std::future::Ready<Result<Option<String>, String>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n >= succeed_on {
                Ok(Some(format!("ok on {n}")))
            } else {
                Err(format!("fail {n}"))
            })
        }
    }

    #[test]
    fn default_schedule_escalates() {
        let schedule = RetrySchedule::default();
        assert_eq!(schedule.len(), 7);
        assert_eq!(schedule.max_attempts(), 8);
        assert!(schedule.delays().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(schedule.total_delay(), Duration::from_millis(15_600));
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_attempt_k_waits_k_minus_one_delays() {
        let schedule = RetrySchedule::from_millis([100, 500, 1000, 2000]);
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let outcome =
            retry_with_schedule(&schedule, &CancellationToken::new(), counting_op(calls.clone(), 3))
                .await;

        assert_eq!(
            outcome,
            RetryOutcome::Success {
                value: "ok on 3".to_string(),
                attempts: 3
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Only the first two delays were slept.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600), "elapsed={elapsed:?}");
        assert!(elapsed < Duration::from_millis(1600), "elapsed={elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_has_no_delay() {
        let schedule = RetrySchedule::from_millis([1000]);
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let outcome =
            retry_with_schedule(&schedule, &CancellationToken::new(), counting_op(calls.clone(), 1))
                .await;

        assert_eq!(outcome.attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn never_succeeding_makes_len_plus_one_attempts() {
        let schedule = RetrySchedule::from_millis([10, 20, 30]);
        let calls = Arc::new(AtomicUsize::new(0));

        let outcome = retry_with_schedule(
            &schedule,
            &CancellationToken::new(),
            counting_op(calls.clone(), usize::MAX),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match outcome {
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error.as_deref(), Some("fail 4"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_is_retried() {
        let schedule = RetrySchedule::from_millis([10, 10]);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();

        let outcome = retry_with_schedule(&schedule, &CancellationToken::new(), move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok::<_, String>(if n == 3 { Some(false) } else { None }))
        })
        .await;

        // A falsy-but-present value is a legitimate success.
        assert_eq!(
            outcome,
            RetryOutcome::Success {
                value: false,
                attempts: 3
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn all_empty_results_exhaust_without_error() {
        let schedule = RetrySchedule::from_millis([10]);
        let outcome: RetryOutcome<u8, String> =
            retry_with_schedule(&schedule, &CancellationToken::new(), || {
                std::future::ready(Ok(None))
            })
            .await;
        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 2,
                last_error: None
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_during_delay() {
        let schedule = RetrySchedule::from_millis([60_000]);
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let outcome =
            retry_with_schedule(&schedule, &cancel, counting_op(calls.clone(), usize::MAX)).await;

        assert_eq!(outcome, RetryOutcome::Cancelled { attempts: 1 });
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn pre_cancelled_token_makes_no_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicUsize::new(0));

        let outcome =
            retry_with_schedule(&RetrySchedule::default(), &cancel, counting_op(calls.clone(), 1))
                .await;

        assert_eq!(outcome, RetryOutcome::Cancelled { attempts: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

//! Streaming runs over the `run_sse` endpoint.
//!
//! A run's channel moves through [`StreamState`]:
//! `Connecting → Open → Closed` on success, or `Connecting | Open → Errored`.
//! Each inbound frame is decoded into an [`Event`], appended to the run's
//! buffer, and then handed to the caller's [`EventObserver`] together with
//! the buffer so far. The run resolves with the full ordered buffer only
//! when the server closes the stream. Any error, however late, rejects the
//! whole run: the partial buffer is dropped and only its length survives in
//! [`ClientError::Stream`].
//!
//! Nothing here retries. Resubmitting a run is the caller's decision.

use crate::api::reduce::extract_text;
use crate::error::ClientError;
use crate::observer::EventObserver;
use crate::{AdkClient, Event, NewMessage, RunRequest, Session};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// The accumulation buffer and lifecycle of one streaming run.
pub struct EventStream<'a> {
    state: StreamState,
    events: Vec<Event>,
    observer: &'a dyn EventObserver,
}

impl<'a> EventStream<'a> {
    pub fn new(observer: &'a dyn EventObserver) -> Self {
        Self {
            state: StreamState::Connecting,
            events: Vec::new(),
            observer,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Events received so far.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The response headers arrived; frames may follow.
    pub fn open(&mut self) {
        if self.state == StreamState::Connecting {
            trace!("Event stream open");
            self.state = StreamState::Open;
        }
    }

    /// Decode one frame's `data` payload, append it, and notify the observer.
    pub fn push_frame(&mut self, data: &str) -> Result<(), ClientError> {
        if self.state != StreamState::Open {
            return Err(self.fail(format!("received data while {:?}", self.state)));
        }
        trace!("SSE frame: {data}");
        let event: Event = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                self.fail(format!("undecodable frame: {e}"));
                return Err(ClientError::Decode(e));
            }
        };
        // The backend reports a run that blew up mid-stream as a bare
        // `{"error": "..."}` frame.
        if let Some(message) = backend_error(&event) {
            return Err(self.fail(format!("backend error: {message}")));
        }
        self.events.push(event);
        if let Some(event) = self.events.last() {
            self.observer.on_event(event, &self.events);
        }
        Ok(())
    }

    /// The server closed the channel normally. Yields the full buffer.
    pub fn close(&mut self) -> Result<Vec<Event>, ClientError> {
        if self.state != StreamState::Open {
            return Err(self.fail(format!("closed while {:?}", self.state)));
        }
        self.state = StreamState::Closed;
        debug!("Event stream closed with {} event(s)", self.events.len());
        Ok(std::mem::take(&mut self.events))
    }

    /// Move to `Errored`, discarding the buffer, and build the error to return.
    pub fn fail(&mut self, reason: impl Into<String>) -> ClientError {
        let reason = reason.into();
        let received = self.events.len();
        warn!("Event stream failed after {received} event(s): {reason}");
        self.state = StreamState::Errored;
        self.events.clear();
        ClientError::Stream { received, reason }
    }

    /// Abandon the run on cancellation.
    pub fn cancel(&mut self) -> ClientError {
        debug!("Event stream cancelled after {} event(s)", self.events.len());
        self.state = StreamState::Errored;
        self.events.clear();
        ClientError::Cancelled
    }

    /// Drive the stream to a terminal state from a channel of SSE bytes.
    ///
    /// Suspends on each frame until the channel ends, errors, or `cancel`
    /// fires. No timeout is applied here. A frame still waiting for its
    /// terminating blank line when the channel ends is dropped.
    pub async fn consume<S, B, E>(
        mut self,
        chunks: S,
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>, ClientError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        self.open();
        let mut frames = std::pin::pin!(chunks.eventsource());
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancel()),
                next = frames.next() => next,
            };
            match next {
                Some(Ok(frame)) if frame.data.is_empty() => {
                    trace!("Skipping SSE frame without data (event '{}')", frame.event);
                }
                Some(Ok(frame)) => self.push_frame(&frame.data)?,
                Some(Err(e)) => return Err(self.fail(e.to_string())),
                None => return self.close(),
            }
        }
    }
}

fn backend_error(event: &Event) -> Option<&str> {
    if !event.author.is_empty() || event.content.is_some() {
        return None;
    }
    event.extra.get("error").and_then(|e| e.as_str())
}

/// Consume a channel of SSE byte chunks into an ordered event list, calling
/// `observer` for each event as it arrives.
pub async fn consume_event_stream<S, B, E>(
    chunks: S,
    observer: &dyn EventObserver,
    cancel: &CancellationToken,
) -> Result<Vec<Event>, ClientError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    EventStream::new(observer).consume(chunks, cancel).await
}

impl AdkClient {
    /// Submit a message through `run_sse` and collect the event stream.
    ///
    /// Resolves once the server closes the stream. Connection failures,
    /// non-success statuses, and mid-stream errors all reject with
    /// [`ClientError::Stream`]; an undecodable frame rejects with
    /// [`ClientError::Decode`]; cancelling `cancel` rejects with
    /// [`ClientError::Cancelled`].
    ///
    /// With [`ClientConfig::token_streaming`](crate::config::ClientConfig::token_streaming)
    /// set, the backend also emits `partial` events carrying text deltas
    /// ahead of each aggregated event.
    pub async fn run_sse(
        &self,
        session: &Session,
        message: NewMessage,
        observer: &dyn EventObserver,
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>, ClientError> {
        let url = self.run_sse_url()?;
        let mut body = RunRequest::new(session, message);
        body.streaming = self.config.token_streaming;
        let mut stream = EventStream::new(observer);

        debug!(
            "Opening event stream for session {} (token streaming: {})",
            session.id, body.streaming
        );

        let send = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send();
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(stream.cancel()),
            resp = send => resp,
        };
        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => return Err(stream.fail(format!("request failed: {e}"))),
        };

        let status = resp.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(stream.cancel()),
                body = resp.text() => body,
            };
            let reason = match body {
                Ok(text) => format!("HTTP {status}: {text}"),
                Err(e) => format!("HTTP {status} (failed to read body: {e})"),
            };
            return Err(stream.fail(reason));
        }

        stream.consume(resp.bytes_stream(), cancel).await
    }

    /// Stream a text message and reduce the run to its final answer.
    pub async fn ask(
        &self,
        session: &Session,
        input: &str,
        observer: &dyn EventObserver,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError> {
        let events = self
            .run_sse(session, NewMessage::user_text(input), observer, cancel)
            .await?;
        Ok(extract_text(&events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{FnObserver, NoopObserver};
    use std::sync::{Arc, Mutex};

    fn frame(event: &Event) -> Result<Vec<u8>, String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(event).unwrap()).into_bytes())
    }

    fn recording_observer() -> (
        FnObserver<impl Fn(&Event, &[Event]) + Send + Sync>,
        Arc<Mutex<Vec<(Event, Vec<Event>)>>>,
    ) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let observer = FnObserver::new(move |e: &Event, so_far: &[Event]| {
            sink.lock().unwrap().push((e.clone(), so_far.to_vec()));
        });
        (observer, calls)
    }

    #[tokio::test]
    async fn observer_sees_each_event_with_growing_snapshot() {
        let e1 = Event::text("a", "one");
        let e2 = Event::text("b", "two");
        let e3 = Event::text("c", "three");
        let chunks = futures::stream::iter(vec![frame(&e1), frame(&e2), frame(&e3)]);
        let (observer, calls) = recording_observer();

        let events = consume_event_stream(chunks, &observer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(events, vec![e1.clone(), e2.clone(), e3.clone()]);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], (e1.clone(), vec![e1.clone()]));
        assert_eq!(calls[1], (e2.clone(), vec![e1.clone(), e2.clone()]));
        assert_eq!(calls[2], (e3.clone(), vec![e1, e2, e3]));
    }

    #[tokio::test]
    async fn error_after_first_event_rejects_run() {
        let e1 = Event::text("a", "one");
        let chunks = futures::stream::iter(vec![frame(&e1), Err("connection reset".to_string())]);
        let (observer, calls) = recording_observer();

        let result = consume_event_stream(chunks, &observer, &CancellationToken::new()).await;

        match result {
            Err(ClientError::Stream { received, reason }) => {
                assert_eq!(received, 1);
                assert!(reason.contains("connection reset"), "reason={reason}");
            }
            other => panic!("expected stream failure, got {other:?}"),
        }
        // The observer still saw the event that arrived before the failure.
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn frames_split_across_chunks_decode_once() {
        let e1 = Event::text("a", "hello");
        let bytes = frame(&e1).unwrap();
        let (head, tail) = bytes.split_at(10);
        let chunks = futures::stream::iter(vec![
            Ok::<_, String>(head.to_vec()),
            Ok(tail.to_vec()),
        ]);

        let events = consume_event_stream(chunks, &NoopObserver, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(events, vec![e1]);
    }

    #[tokio::test]
    async fn crlf_comments_and_named_events() {
        let body = concat!(
            ": keep-alive\r\n\r\n",
            "event: message\r\n",
            "id: 7\r\n",
            "data: {\"author\":\"a\"}\r\n\r\n",
            "data:{\"author\":\"b\"}\n\n",
        );
        let chunks = futures::stream::iter(vec![Ok::<_, String>(body.as_bytes().to_vec())]);
        let events = consume_event_stream(chunks, &NoopObserver, &CancellationToken::new())
            .await
            .unwrap();
        let authors: Vec<_> = events.iter().map(|e| e.author.as_str()).collect();
        assert_eq!(authors, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn multi_line_data_is_one_event() {
        let body = "data: {\"author\":\ndata: \"joined\"}\n\n";
        let chunks = futures::stream::iter(vec![Ok::<_, String>(body.as_bytes().to_vec())]);
        let events = consume_event_stream(chunks, &NoopObserver, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].author, "joined");
    }

    #[tokio::test]
    async fn empty_stream_resolves_empty() {
        let chunks = futures::stream::iter(Vec::<Result<Vec<u8>, String>>::new());
        let events = consume_event_stream(chunks, &NoopObserver, &CancellationToken::new())
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn undecodable_frame_is_decode_failure() {
        let chunks = futures::stream::iter(vec![Ok::<_, String>(b"data: not json\n\n".to_vec())]);
        let result = consume_event_stream(chunks, &NoopObserver, &CancellationToken::new()).await;
        assert!(matches!(result, Err(ClientError::Decode(_))));
    }

    #[tokio::test]
    async fn backend_error_frame_fails_stream() {
        let chunks = futures::stream::iter(vec![
            frame(&Event::text("a", "one")),
            Ok(b"data: {\"error\": \"model overloaded\"}\n\n".to_vec()),
        ]);
        let result = consume_event_stream(chunks, &NoopObserver, &CancellationToken::new()).await;
        match result {
            Err(ClientError::Stream { received, reason }) => {
                assert_eq!(received, 1);
                assert!(reason.contains("model overloaded"));
            }
            other => panic!("expected stream failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_rejects_pending_stream() {
        let cancel = CancellationToken::new();
        let e1 = Event::text("a", "one");
        // One frame, then a channel that never yields again.
        let chunks = futures::stream::iter(vec![frame(&e1)]).chain(futures::stream::pending());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = consume_event_stream(chunks, &NoopObserver, &cancel).await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }

    #[test]
    fn state_transitions() {
        let observer = NoopObserver;
        let mut stream = EventStream::new(&observer);
        assert_eq!(stream.state(), StreamState::Connecting);

        stream.open();
        assert_eq!(stream.state(), StreamState::Open);

        let data = serde_json::to_string(&Event::text("a", "x")).unwrap();
        stream.push_frame(&data).unwrap();
        assert_eq!(stream.events().len(), 1);

        let events = stream.close().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(stream.state(), StreamState::Closed);

        // Data after close is an error, not a silent append.
        assert!(stream.push_frame(&data).is_err());
        assert_eq!(stream.state(), StreamState::Errored);
    }

    #[test]
    fn failure_while_connecting_reports_zero_received() {
        let observer = NoopObserver;
        let mut stream = EventStream::new(&observer);
        let err = stream.fail("HTTP 502 Bad Gateway");
        assert_eq!(stream.state(), StreamState::Errored);
        assert!(matches!(err, ClientError::Stream { received: 0, .. }));
    }
}

//! Per-event observers for streaming runs.
//!
//! The streaming consumer calls [`EventObserver::on_event`] synchronously,
//! once per decoded event, right after the event is appended to the run's
//! buffer. The observer sees the event and a snapshot of every event
//! received so far, in receipt order.
//!
//! # Choosing an observer
//!
//! | Observer | Use case |
//! |----------|----------|
//! | [`NoopObserver`] | Tests or runs where only the final result matters |
//! | [`LoggingObserver`] | Structured logging via `tracing` |
//! | [`FnObserver`] | Quick closures |
//! | [`ProgressObserver`] | Human-readable progress notices ("X produced text") |
//! | [`CompositeObserver`] | Fan out to several observers in order |
//!
//! Observers cannot fail. A panic inside an observer unwinds through the
//! run like any other panic; it is not caught or converted.

use crate::Event;
use tracing::{debug, info, trace};

pub trait EventObserver: Send + Sync {
    /// Called for each event, after it has been appended to `events`.
    /// `events.last()` is always `event`.
    fn on_event(&self, event: &Event, events: &[Event]) {
        let _ = (event, events);
    }
}

pub struct NoopObserver;
impl EventObserver for NoopObserver {}

/// An observer backed by a closure.
///
/// ```ignore
/// let observer = FnObserver::new(|event, so_far| {
///     println!("#{} from {}", so_far.len(), event.author);
/// });
/// ```
pub struct FnObserver<F>(F)
where
    F: Fn(&Event, &[Event]) + Send + Sync;

impl<F> FnObserver<F>
where
    F: Fn(&Event, &[Event]) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventObserver for FnObserver<F>
where
    F: Fn(&Event, &[Event]) + Send + Sync,
{
    fn on_event(&self, event: &Event, events: &[Event]) {
        (self.0)(event, events)
    }
}

/// Dispatches every event to each inner observer in registration order.
///
/// ```ignore
/// let observer = CompositeObserver::new()
///     .with(LoggingObserver)
///     .with(ProgressObserver::new(|notice| eprintln!("{notice}")));
/// ```
pub struct CompositeObserver {
    observers: Vec<Box<dyn EventObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn with(mut self, observer: impl EventObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Conditionally add an observer without breaking the builder chain.
    pub fn with_if(self, condition: bool, observer: impl EventObserver + 'static) -> Self {
        if condition { self.with(observer) } else { self }
    }
}

impl Default for CompositeObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl EventObserver for CompositeObserver {
    fn on_event(&self, event: &Event, events: &[Event]) {
        for observer in &self.observers {
            observer.on_event(event, events);
        }
    }
}

/// Logs each event through `tracing`.
pub struct LoggingObserver;

impl EventObserver for LoggingObserver {
    fn on_event(&self, event: &Event, events: &[Event]) {
        if let Some(agent) = event.transfer_to_agent() {
            info!("[{}] {} transferred to {agent}", events.len(), event.author);
            return;
        }
        let text = event.joined_text();
        if text.trim().is_empty() {
            debug!(
                "[{}] {}: {} non-text part(s)",
                events.len(),
                event.author,
                event.parts().len()
            );
        } else {
            let preview: String = text.chars().take(200).collect();
            debug!(
                "[{}] {}: {preview}{}",
                events.len(),
                event.author,
                if text.chars().count() > 200 { "..." } else { "" }
            );
        }
        trace!("Event: {event:?}");
    }
}

/// A short human-readable notice describing an event, if it is worth one.
///
/// Transfers read `"{author} transferred to {agent}"`; events whose first
/// part carries text read `"{author} produced text"`. Anything else (tool
/// calls, empty parts, token-level partial events) has no notice.
pub fn progress_notice(event: &Event) -> Option<String> {
    if event.partial == Some(true) {
        return None;
    }
    if let Some(agent) = event.transfer_to_agent() {
        return Some(format!("{} transferred to {agent}", event.author));
    }
    match event.parts().first().and_then(|p| p.text.as_deref()) {
        Some(text) if !text.is_empty() => Some(format!("{} produced text", event.author)),
        _ => None,
    }
}

/// Forwards [`progress_notice`]s to a closure.
pub struct ProgressObserver<F>(F)
where
    F: Fn(&str) + Send + Sync;

impl<F> ProgressObserver<F>
where
    F: Fn(&str) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventObserver for ProgressObserver<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn on_event(&self, event: &Event, _events: &[Event]) {
        if let Some(notice) = progress_notice(event) {
            (self.0)(&notice);
        }
    }
}

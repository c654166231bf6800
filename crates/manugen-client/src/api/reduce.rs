//! Reduce a run's events to one answer.

use crate::Event;

/// The text of the last event that said anything.
///
/// Each event's text parts are joined with `\n`; events whose joined text is
/// empty or whitespace-only are skipped. Returns an empty string when no
/// event carries text.
pub fn extract_text(events: &[Event]) -> String {
    events
        .iter()
        .rev()
        .map(Event::joined_text)
        .find(|text| !text.trim().is_empty())
        .unwrap_or_default()
}

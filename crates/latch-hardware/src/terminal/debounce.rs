//! Tag presentation de-duplication.

use std::time::Duration;

use tokio::time::Instant;

/// Collapses repeated reads of a tag held against the reader.
///
/// A read of the same tag within `window` of the previous read is part of
/// the same presentation and refreshes the window. A different tag always
/// counts as a new presentation.
#[derive(Debug)]
pub struct TagDebouncer {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl TagDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Record a read at `now`. Returns `true` for a new presentation.
    pub fn accept(&mut self, tag: &str, now: Instant) -> bool {
        if let Some((previous, seen_at)) = self.last.as_mut()
            && previous == tag
            && now.saturating_duration_since(*seen_at) < self.window
        {
            *seen_at = now;
            return false;
        }

        self.last = Some((tag.to_string(), now));
        true
    }
}

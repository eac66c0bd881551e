//! Duplicate error log suppression.

use std::fmt::Display;

/// Remembers the last logged error message so an outage that fails the
/// same way every retry logs once instead of once per retry.
#[derive(Debug, Default)]
pub struct LogOnce {
    last: Option<String>,
}

impl LogOnce {
    /// Create an empty latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error`. Returns `true` when its message differs from the
    /// previous one and should be logged.
    pub fn check(&mut self, error: &impl Display) -> bool {
        let message = error.to_string();
        if self.last.as_deref() == Some(message.as_str()) {
            return false;
        }
        self.last = Some(message);
        true
    }

    /// Forget the last error after a successful exchange.
    pub fn clear(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_error_logged_once() {
        let mut latch = LogOnce::new();
        assert!(latch.check(&"No such device"));
        assert!(!latch.check(&"No such device"));
        assert!(!latch.check(&"No such device"));
    }

    #[test]
    fn test_changed_error_logged_again() {
        let mut latch = LogOnce::new();
        assert!(latch.check(&"No such device"));
        assert!(latch.check(&"Permission denied"));
        assert!(latch.check(&"No such device"));
    }

    #[test]
    fn test_clear_rearms() {
        let mut latch = LogOnce::new();
        assert!(latch.check(&"timeout"));
        latch.clear();
        assert!(latch.check(&"timeout"));
    }
}

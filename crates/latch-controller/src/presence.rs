//! Debounced presence tracking.
//!
//! Someone is considered present while the lights are on or the door is
//! open. Becoming present commits immediately; becoming absent only after
//! the leave delay passes without presence being asserted again.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Committed presence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Presence {
    /// Nothing observed since startup.
    #[default]
    Unknown,
    Present,
    Absent,
}

impl Presence {
    fn from_observed(present: bool) -> Self {
        if present { Self::Present } else { Self::Absent }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// Presence state machine with a single cancelable commit timer.
///
/// The tracker does not sleep itself; the owner waits until
/// [`deadline`](Self::deadline) and then calls [`commit_due`](Self::commit_due).
#[derive(Debug)]
pub struct PresenceTracker {
    leave_delay: Duration,
    committed: Presence,
    pending: Option<(bool, Instant)>,
}

impl PresenceTracker {
    pub fn new(leave_delay: Duration) -> Self {
        Self {
            leave_delay,
            committed: Presence::Unknown,
            pending: None,
        }
    }

    pub fn current(&self) -> Presence {
        self.committed
    }

    pub fn is_present(&self) -> bool {
        self.committed == Presence::Present
    }

    /// Record the observed presence at `now`.
    ///
    /// Any pending commit is dropped. A new one is armed if the observation
    /// differs from the committed state.
    pub fn observe(&mut self, present: bool, now: Instant) {
        self.pending = None;

        let target = Presence::from_observed(present);
        if target == self.committed {
            return;
        }

        let delay = if self.committed == Presence::Unknown || present {
            Duration::ZERO
        } else {
            self.leave_delay
        };
        self.pending = Some((present, now + delay));
    }

    /// When the pending commit fires, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, at)| at)
    }

    /// Commit the pending change if its deadline has passed.
    ///
    /// Returns the newly committed state.
    pub fn commit_due(&mut self, now: Instant) -> Option<Presence> {
        match self.pending {
            Some((present, at)) if at <= now => {
                self.pending = None;
                self.committed = Presence::from_observed(present);
                Some(self.committed)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAVE: Duration = Duration::from_secs(600);

    #[test]
    fn test_first_observation_commits_immediately() {
        let now = Instant::now();
        let mut tracker = PresenceTracker::new(LEAVE);
        assert_eq!(tracker.current(), Presence::Unknown);

        tracker.observe(false, now);
        assert_eq!(tracker.deadline(), Some(now));
        assert_eq!(tracker.commit_due(now), Some(Presence::Absent));
        assert_eq!(tracker.deadline(), None);
    }

    #[test]
    fn test_arrival_is_immediate() {
        let now = Instant::now();
        let mut tracker = PresenceTracker::new(LEAVE);
        tracker.observe(false, now);
        tracker.commit_due(now);

        tracker.observe(true, now);
        assert_eq!(tracker.commit_due(now), Some(Presence::Present));
        assert!(tracker.is_present());
    }

    #[test]
    fn test_leaving_waits_for_delay() {
        let now = Instant::now();
        let mut tracker = PresenceTracker::new(LEAVE);
        tracker.observe(true, now);
        tracker.commit_due(now);

        tracker.observe(false, now);
        assert_eq!(tracker.deadline(), Some(now + LEAVE));
        assert_eq!(tracker.commit_due(now + LEAVE - Duration::from_millis(1)), None);
        assert!(tracker.is_present());
        assert_eq!(tracker.commit_due(now + LEAVE), Some(Presence::Absent));
    }

    #[test]
    fn test_reassertion_cancels_leave() {
        let now = Instant::now();
        let mut tracker = PresenceTracker::new(LEAVE);
        tracker.observe(true, now);
        tracker.commit_due(now);

        tracker.observe(false, now);
        tracker.observe(true, now + Duration::from_secs(60));
        assert_eq!(tracker.deadline(), None);
        assert_eq!(tracker.commit_due(now + LEAVE * 2), None);
        assert_eq!(tracker.current(), Presence::Present);
    }

    #[test]
    fn test_unchanged_observation_arms_nothing() {
        let now = Instant::now();
        let mut tracker = PresenceTracker::new(LEAVE);
        tracker.observe(true, now);
        tracker.commit_due(now);

        tracker.observe(true, now);
        assert_eq!(tracker.deadline(), None);
    }
}

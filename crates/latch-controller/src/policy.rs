//! Membership-based access policy.

use latch_core::settings::MembershipSettings;

/// Outcome of checking a member's remaining membership days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Active, nothing to tell.
    Granted,

    /// Active but running out; `days_left` is announced on the next open.
    Expiring { days_left: i64 },

    /// Expired but inside the grace period.
    Grace { grace_days_left: i64 },

    /// Expired past the grace period.
    Denied,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        !matches!(self, Self::Denied)
    }

    /// Admitted although the membership has ended.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Grace { .. })
    }

    /// Notice to deliver when the door next opens.
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Expiring { days_left } => Some(format!("Days remaining: {days_left}")),
            Self::Grace { grace_days_left } => Some(format!(
                "Membership expired. Days of grace period remaining: {grace_days_left}"
            )),
            Self::Granted | Self::Denied => None,
        }
    }
}

/// Grace and warning thresholds.
///
/// # Examples
///
/// ```
/// use latch_controller::{AccessDecision, AccessPolicy};
///
/// let policy = AccessPolicy::new(3, 7);
/// assert_eq!(policy.decide(30), AccessDecision::Granted);
/// assert_eq!(policy.decide(5), AccessDecision::Expiring { days_left: 5 });
/// assert_eq!(policy.decide(-1), AccessDecision::Grace { grace_days_left: 2 });
/// assert_eq!(policy.decide(-3), AccessDecision::Denied);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessPolicy {
    /// Days an expired member is still admitted. `0` disables grace.
    pub grace_period_days: u32,

    /// Warn when at most this many days remain. `0` disables the warning.
    pub remaining_message_days: u32,

    /// Treat `days_left == 0` as expired instead of as the last active day.
    pub day_zero_is_expired: bool,
}

impl AccessPolicy {
    pub fn new(grace_period_days: u32, remaining_message_days: u32) -> Self {
        Self {
            grace_period_days,
            remaining_message_days,
            day_zero_is_expired: false,
        }
    }

    pub fn with_day_zero_expired(mut self, expired: bool) -> Self {
        self.day_zero_is_expired = expired;
        self
    }

    /// Decide on a member with `days_left` as computed by
    /// [`Member::days_until_expiration`](latch_core::Member::days_until_expiration).
    pub fn decide(&self, days_left: i64) -> AccessDecision {
        let expired = if self.day_zero_is_expired {
            days_left <= 0
        } else {
            days_left < 0
        };

        let grace = i64::from(self.grace_period_days);
        if expired {
            if -days_left < grace {
                AccessDecision::Grace {
                    grace_days_left: grace + days_left,
                }
            } else {
                AccessDecision::Denied
            }
        } else if self.remaining_message_days > 0
            && days_left <= i64::from(self.remaining_message_days)
        {
            AccessDecision::Expiring { days_left }
        } else {
            AccessDecision::Granted
        }
    }
}

impl From<&MembershipSettings> for AccessPolicy {
    fn from(settings: &MembershipSettings) -> Self {
        Self::new(settings.grace_period_days, settings.remaining_message_days)
            .with_day_zero_expired(settings.day_zero_is_expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, AccessDecision::Expiring { days_left: 0 })]
    #[case(-1, AccessDecision::Grace { grace_days_left: 2 })]
    #[case(-2, AccessDecision::Grace { grace_days_left: 1 })]
    #[case(-3, AccessDecision::Denied)]
    #[case(-30, AccessDecision::Denied)]
    fn test_grace_boundaries(#[case] days_left: i64, #[case] expected: AccessDecision) {
        let policy = AccessPolicy::new(3, 7);
        assert_eq!(policy.decide(days_left), expected);
    }

    #[rstest]
    #[case(8, AccessDecision::Granted)]
    #[case(7, AccessDecision::Expiring { days_left: 7 })]
    #[case(1, AccessDecision::Expiring { days_left: 1 })]
    fn test_warning_threshold(#[case] days_left: i64, #[case] expected: AccessDecision) {
        let policy = AccessPolicy::new(3, 7);
        assert_eq!(policy.decide(days_left), expected);
    }

    #[test]
    fn test_zero_grace_denies_any_expiry() {
        let policy = AccessPolicy::new(0, 0);
        assert_eq!(policy.decide(-1), AccessDecision::Denied);
        assert_eq!(policy.decide(0), AccessDecision::Granted);
    }

    #[test]
    fn test_zero_warning_days_never_warns() {
        let policy = AccessPolicy::new(3, 0);
        assert_eq!(policy.decide(1), AccessDecision::Granted);
    }

    #[rstest]
    #[case(false, 0, AccessDecision::Granted)]
    #[case(true, 0, AccessDecision::Grace { grace_days_left: 3 })]
    #[case(true, -3, AccessDecision::Denied)]
    fn test_day_zero_boundary(
        #[case] day_zero_is_expired: bool,
        #[case] days_left: i64,
        #[case] expected: AccessDecision,
    ) {
        let policy = AccessPolicy::new(3, 0).with_day_zero_expired(day_zero_is_expired);
        assert_eq!(policy.decide(days_left), expected);
    }

    #[test]
    fn test_notice_text() {
        assert_eq!(
            AccessDecision::Expiring { days_left: 5 }.notice().as_deref(),
            Some("Days remaining: 5")
        );
        assert_eq!(
            AccessDecision::Grace { grace_days_left: 2 }.notice().as_deref(),
            Some("Membership expired. Days of grace period remaining: 2")
        );
        assert_eq!(AccessDecision::Granted.notice(), None);
        assert!(!AccessDecision::Denied.is_granted());
        assert!(AccessDecision::Grace { grace_days_left: 1 }.is_expired());
    }
}

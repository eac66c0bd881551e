use crate::constants::SECONDS_PER_DAY;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fallback shown publicly for members without a public name.
pub const ANONYMOUS_PUBLIC_NAME: &str = "A member";

/// A roster entry.
///
/// Members are immutable snapshots owned by the roster. The orchestrator
/// fetches a fresh one for every authorization attempt and never caches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Roster identifier.
    pub id: u32,

    /// Full name, used in the audit trail.
    pub name: String,

    /// Name safe to show on the terminal and in outward notifications.
    pub public_name: Option<String>,

    /// Phone number in international format (`+358...`).
    pub phone_number: String,

    /// Normalized RFID tag identifiers (lowercase hex).
    pub tag_ids: Vec<String>,

    /// End of the paid membership.
    pub active_until: DateTime<Utc>,
}

impl Member {
    /// Days until the membership expires, counting today as one.
    ///
    /// `floor((active_until - now) / 1 day) + 1`, so a membership ending
    /// later today reports `1`, one that ended earlier today reports `0`,
    /// and one that ended yesterday reports `-1`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use latch_core::Member;
    ///
    /// let now = Utc::now();
    /// let member = Member {
    ///     id: 1,
    ///     name: "Ada".to_string(),
    ///     public_name: None,
    ///     phone_number: "+3584001".to_string(),
    ///     tag_ids: vec![],
    ///     active_until: now + Duration::hours(4 * 24 + 12),
    /// };
    /// assert_eq!(member.days_until_expiration(now), 5);
    /// ```
    pub fn days_until_expiration(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.active_until - now).num_milliseconds();
        millis.div_euclid(SECONDS_PER_DAY * 1000) + 1
    }

    /// Name used in the audit trail: `"<name> (#<id>)"`.
    pub fn display_name(&self) -> String {
        format!("{} (#{})", self.name, self.id)
    }

    /// Name used outward, falling back to [`ANONYMOUS_PUBLIC_NAME`].
    pub fn public_name(&self) -> &str {
        match self.public_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => ANONYMOUS_PUBLIC_NAME,
        }
    }

    /// Name rendered on the terminal display.
    pub fn screen_name(&self) -> &str {
        match self.public_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.name,
        }
    }

    /// Check whether a (normalized) tag belongs to this member.
    pub fn has_tag(&self, tag_id: &str) -> bool {
        !tag_id.is_empty() && self.tag_ids.iter().any(|t| t == tag_id)
    }
}

/// Normalize a tag identifier: whitespace removed, lowercase.
pub fn normalize_tag_id(tag_id: &str) -> String {
    tag_id
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Parse a `;`-separated tag list as found in roster exports.
///
/// ```
/// use latch_core::parse_tag_list;
///
/// assert_eq!(parse_tag_list("04AB12CD; 0badf00d;"), vec!["04ab12cd", "0badf00d"]);
/// ```
pub fn parse_tag_list(tags: &str) -> Vec<String> {
    tags.split(';')
        .map(normalize_tag_id)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Physical door state as reported by the lock actuator.
///
/// `is_unlocked` only returns to `false` through an explicit relock (pulse
/// finished or forced), never because the door closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorState {
    /// Door switch reports the door open.
    pub is_open: bool,

    /// Lock relay is energized.
    pub is_unlocked: bool,
}

/// How an authorization attempt was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    /// Member called the door phone number.
    Phone,

    /// Member presented an RFID tag.
    Tag,
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phone => write!(f, "phone"),
            Self::Tag => write!(f, "tag"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn member_expiring_in(now: DateTime<Utc>, delta: Duration) -> Member {
        Member {
            id: 7,
            name: "Grace Hopper".to_string(),
            public_name: Some("Grace".to_string()),
            phone_number: "+358401234567".to_string(),
            tag_ids: vec!["04ab12cd".to_string()],
            active_until: now + delta,
        }
    }

    #[rstest]
    #[case(Duration::hours(36), 2)]
    #[case(Duration::hours(12), 1)]
    #[case(Duration::seconds(1), 1)]
    #[case(Duration::zero(), 1)]
    #[case(Duration::milliseconds(-500), 0)]
    #[case(Duration::hours(-12), 0)]
    #[case(Duration::hours(-24), 0)]
    #[case(Duration::hours(-25), -1)]
    #[case(Duration::days(-8), -7)]
    fn test_days_until_expiration(#[case] delta: Duration, #[case] expected: i64) {
        let now = Utc::now();
        let member = member_expiring_in(now, delta);
        assert_eq!(member.days_until_expiration(now), expected);
    }

    #[test]
    fn test_display_name() {
        let member = member_expiring_in(Utc::now(), Duration::days(1));
        assert_eq!(member.display_name(), "Grace Hopper (#7)");
    }

    #[test]
    fn test_public_name_fallback() {
        let mut member = member_expiring_in(Utc::now(), Duration::days(1));
        assert_eq!(member.public_name(), "Grace");

        member.public_name = Some(String::new());
        assert_eq!(member.public_name(), ANONYMOUS_PUBLIC_NAME);
        assert_eq!(member.screen_name(), "Grace Hopper");

        member.public_name = None;
        assert_eq!(member.public_name(), ANONYMOUS_PUBLIC_NAME);
    }

    #[test]
    fn test_has_tag() {
        let member = member_expiring_in(Utc::now(), Duration::days(1));
        assert!(member.has_tag("04ab12cd"));
        assert!(!member.has_tag("04AB12CD"));
        assert!(!member.has_tag(""));
    }

    #[rstest]
    #[case("04AB12CD", "04ab12cd")]
    #[case(" 04 ab 12 cd ", "04ab12cd")]
    #[case("", "")]
    fn test_normalize_tag_id(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_tag_id(input), expected);
    }

    #[test]
    fn test_parse_tag_list_skips_empty() {
        assert!(parse_tag_list("").is_empty());
        assert!(parse_tag_list(" ; ;").is_empty());
        assert_eq!(parse_tag_list("aa;BB"), vec!["aa", "bb"]);
    }

    #[test]
    fn test_access_method_display() {
        assert_eq!(AccessMethod::Phone.to_string(), "phone");
        assert_eq!(AccessMethod::Tag.to_string(), "tag");
    }

    #[test]
    fn test_door_state_default_is_closed_and_locked() {
        let state = DoorState::default();
        assert!(!state.is_open);
        assert!(!state.is_unlocked);
    }
}

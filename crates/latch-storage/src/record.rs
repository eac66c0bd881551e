//! On-disk member record.
//!
//! ```json
//! {
//!   "id": 7,
//!   "name": "Grace Hopper",
//!   "phone_number": "+358401234567",
//!   "active_until": "2026-12-31",
//!   "public_name": "Grace",
//!   "tag_ids": ["04ab12cd"]
//! }
//! ```
//!
//! `tag_ids` may also be a `;`-separated string, as exported by the
//! membership register.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use latch_core::{Member, normalize_tag_id, parse_tag_list};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Tag list in either accepted shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagIds {
    List(Vec<String>),
    Joined(String),
}

impl Default for TagIds {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl TagIds {
    fn normalized(&self) -> Vec<String> {
        match self {
            Self::List(tags) => tags
                .iter()
                .map(|t| normalize_tag_id(t))
                .filter(|t| !t.is_empty())
                .collect(),
            Self::Joined(tags) => parse_tag_list(tags),
        }
    }
}

/// One roster entry as stored in the JSON cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: u32,
    pub name: String,
    pub phone_number: String,

    /// Last day of membership, `YYYY-MM-DD`.
    pub active_until: String,

    #[serde(default)]
    pub public_name: Option<String>,

    #[serde(default)]
    pub tag_ids: TagIds,
}

impl MemberRecord {
    /// Convert into a [`Member`].
    ///
    /// The expiry date is read as local midnight starting that day.
    pub fn into_member(self) -> StorageResult<Member> {
        let active_until = parse_date(&self.active_until).ok_or_else(|| {
            StorageError::invalid_record(self.id, format!("bad date {:?}", self.active_until))
        })?;

        Ok(Member {
            id: self.id,
            tag_ids: self.tag_ids.normalized(),
            name: self.name,
            public_name: self.public_name.filter(|name| !name.is_empty()),
            phone_number: self.phone_number,
            active_until,
        })
    }
}

impl From<&Member> for MemberRecord {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id,
            name: member.name.clone(),
            phone_number: member.phone_number.clone(),
            active_until: member
                .active_until
                .with_timezone(&Local)
                .format(DATE_FORMAT)
                .to_string(),
            public_name: member.public_name.clone(),
            tag_ids: TagIds::List(member.tag_ids.clone()),
        }
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    let local = Local.from_local_datetime(&midnight).earliest()?;
    Some(local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(json: &str) -> MemberRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_tag_list_forms() {
        let listed = record(
            r#"{"id":1,"name":"A","phone_number":"+3581","active_until":"2030-01-01","tag_ids":["04AB12CD"," "]}"#,
        );
        let joined = record(
            r#"{"id":1,"name":"A","phone_number":"+3581","active_until":"2030-01-01","tag_ids":"04AB 12CD;0badf00d;"}"#,
        );

        assert_eq!(listed.into_member().unwrap().tag_ids, vec!["04ab12cd"]);
        assert_eq!(
            joined.into_member().unwrap().tag_ids,
            vec!["04ab12cd", "0badf00d"]
        );
    }

    #[test]
    fn test_optional_fields_default() {
        let member = record(r#"{"id":2,"name":"B","phone_number":"+3582","active_until":"2030-01-01"}"#)
            .into_member()
            .unwrap();
        assert!(member.tag_ids.is_empty());
        assert_eq!(member.public_name, None);
    }

    #[test]
    fn test_empty_public_name_is_none() {
        let member = record(
            r#"{"id":2,"name":"B","phone_number":"+3582","active_until":"2030-01-01","public_name":""}"#,
        )
        .into_member()
        .unwrap();
        assert_eq!(member.public_name, None);
    }

    #[rstest]
    #[case("2030-02-30")]
    #[case("01.01.2030")]
    #[case("")]
    fn test_bad_date_rejected(#[case] date: &str) {
        let record = MemberRecord {
            id: 9,
            name: "C".to_string(),
            phone_number: "+3583".to_string(),
            active_until: date.to_string(),
            public_name: None,
            tag_ids: TagIds::default(),
        };
        assert!(matches!(
            record.into_member(),
            Err(StorageError::InvalidRecord { id: 9, .. })
        ));
    }

    #[test]
    fn test_date_survives_conversion() {
        let member = record(
            r#"{"id":3,"name":"D","phone_number":"+3584","active_until":"2031-06-15","tag_ids":[]}"#,
        )
        .into_member()
        .unwrap();
        assert_eq!(MemberRecord::from(&member).active_until, "2031-06-15");
    }
}

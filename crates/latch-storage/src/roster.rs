//! In-memory roster snapshot backed by the JSON cache file.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use latch_controller::Roster;
use latch_core::{Member, normalize_tag_id};
use tracing::{debug, info, warn};

use crate::error::StorageResult;
use crate::record::MemberRecord;

/// Roster held in memory.
///
/// # Examples
///
/// ```
/// use latch_controller::Roster;
/// use latch_storage::MemoryRoster;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> latch_storage::StorageResult<()> {
/// let roster = MemoryRoster::from_json(
///     r#"[{"id": 1, "name": "Grace Hopper", "phone_number": "+358401234567",
///          "active_until": "2030-01-01", "tag_ids": "04AB12CD"}]"#,
/// )?;
///
/// assert!(roster.lookup_by_tag("04ab12cd").await.is_some());
/// assert!(roster.lookup_by_phone("+358409999999").await.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryRoster {
    members: RwLock<Vec<Member>>,
}

impl MemoryRoster {
    pub fn new(members: Vec<Member>) -> Self {
        Self {
            members: RwLock::new(members),
        }
    }

    /// Parse the JSON cache format.
    pub fn from_json(json: &str) -> StorageResult<Self> {
        Ok(Self::new(parse_members(json)?))
    }

    /// Load the cache file.
    pub fn load(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let roster = Self::from_json(&fs::read_to_string(path)?)?;
        info!(path = %path.display(), members = roster.len(), "Roster loaded");
        Ok(roster)
    }

    /// Load the cache file, starting empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        match Self::load(path.as_ref()) {
            Err(crate::StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.as_ref().display(), "No roster file, starting with an empty roster");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Write the cache file, replacing it atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        let records: Vec<MemberRecord> = self.snapshot().iter().map(MemberRecord::from).collect();
        let json = serde_json::to_string_pretty(&records)?;

        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        fs::write(&temp, json)?;
        fs::rename(&temp, path)?;

        debug!(path = %path.display(), members = records.len(), "Roster saved");
        Ok(())
    }

    /// Swap in a new snapshot. Returns whether anything changed.
    pub fn replace(&self, members: Vec<Member>) -> bool {
        let mut current = self.members.write().unwrap_or_else(PoisonError::into_inner);
        if *current == members {
            return false;
        }
        info!(members = members.len(), "Roster updated");
        *current = members;
        true
    }

    pub fn snapshot(&self) -> Vec<Member> {
        self.members.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.members.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, predicate: impl Fn(&Member) -> bool) -> Option<Member> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| predicate(*m))
            .cloned()
    }
}

impl Roster for MemoryRoster {
    async fn lookup_by_phone(&self, number: &str) -> Option<Member> {
        if number.is_empty() {
            return None;
        }
        self.find(|m| m.phone_number == number)
    }

    async fn lookup_by_tag(&self, tag_id: &str) -> Option<Member> {
        let tag_id = normalize_tag_id(tag_id);
        if tag_id.is_empty() {
            return None;
        }
        self.find(|m| m.has_tag(&tag_id))
    }
}

fn parse_members(json: &str) -> StorageResult<Vec<Member>> {
    let records: Vec<MemberRecord> = serde_json::from_str(json)?;
    records.into_iter().map(MemberRecord::into_member).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = r#"[
        {"id": 1, "name": "Grace Hopper", "phone_number": "+358401234567",
         "active_until": "2030-01-01", "public_name": "Grace", "tag_ids": ["04ab12cd"]},
        {"id": 2, "name": "No Phone", "phone_number": "",
         "active_until": "2030-01-01", "tag_ids": []}
    ]"#;

    #[tokio::test]
    async fn test_lookup_by_phone() {
        let roster = MemoryRoster::from_json(ROSTER).unwrap();
        let member = roster.lookup_by_phone("+358401234567").await.unwrap();
        assert_eq!(member.id, 1);
        assert!(roster.lookup_by_phone("+358400000000").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_keys_never_match() {
        let roster = MemoryRoster::from_json(ROSTER).unwrap();
        assert!(roster.lookup_by_phone("").await.is_none());
        assert!(roster.lookup_by_tag("").await.is_none());
        assert!(roster.lookup_by_tag("  ").await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_tag_normalizes() {
        let roster = MemoryRoster::from_json(ROSTER).unwrap();
        assert_eq!(roster.lookup_by_tag("04 AB 12 CD").await.map(|m| m.id), Some(1));
    }

    #[test]
    fn test_replace_reports_change() {
        let roster = MemoryRoster::from_json(ROSTER).unwrap();
        let same = roster.snapshot();
        assert!(!roster.replace(same));
        assert!(roster.replace(Vec::new()));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_one_bad_record_rejects_snapshot() {
        let json = r#"[
            {"id": 1, "name": "A", "phone_number": "+3581", "active_until": "2030-01-01"},
            {"id": 2, "name": "B", "phone_number": "+3582", "active_until": "soon"}
        ]"#;
        assert!(MemoryRoster::from_json(json).is_err());
    }
}

//! Append-only, versioned log of content-hash changes for one resource.
//!
//! Versions start at 1 and increase by exactly one per record. Records are
//! never mutated or removed once appended.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::UniquenessScope;
use crate::error::Violation;
use crate::types::{Address, ChangeType, DataHash};

/// An immutable entry in a resource's change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Position in the log, starting at 1
    pub version: u64,
    /// Content digest supplied by the author
    pub data_hash: DataHash,
    /// Kind of change
    pub change_type: ChangeType,
    /// Admin that registered the change
    pub author: Address,
    /// Registry commit sequence of the registering call
    pub sequence: u64,
    /// Wall-clock time the change was registered
    pub recorded_at: DateTime<Utc>,
}

/// Change log for a single resource.
#[derive(Debug, Clone, Default)]
pub struct HashLog {
    records: Vec<ChangeRecord>,
    /// Every hash ever appended, for history-scoped uniqueness
    seen: HashSet<DataHash>,
}

impl HashLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from previously exported records, checking that the
    /// versions are gapless from 1.
    pub fn from_records(records: Vec<ChangeRecord>) -> Result<Self, Violation> {
        for (expected, record) in (1u64..).zip(&records) {
            if record.version != expected {
                return Err(Violation::VersionGap {
                    expected,
                    found: record.version,
                });
            }
        }
        let seen = records.iter().map(|r| r.data_hash).collect();
        Ok(Self { records, seen })
    }

    /// Number of records, equal to the latest version.
    pub fn version_count(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent record.
    pub fn latest(&self) -> Option<&ChangeRecord> {
        self.records.last()
    }

    /// Record with the given version.
    pub fn get(&self, version: u64) -> Option<&ChangeRecord> {
        let index = usize::try_from(version.checked_sub(1)?).ok()?;
        self.records.get(index)
    }

    /// Records with versions `start + 1 ..= start + count`, clipped to what
    /// exists. Offsets past the end yield an empty slice.
    pub fn range(&self, start: u64, count: u64) -> &[ChangeRecord] {
        let len = self.records.len();
        let from = usize::try_from(start).unwrap_or(usize::MAX).min(len);
        let to = usize::try_from(start.saturating_add(count))
            .unwrap_or(usize::MAX)
            .min(len);
        &self.records[from..to]
    }

    /// All records in version order.
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Versions whose hash equals `hash`, ascending.
    pub fn versions_with_hash(&self, hash: &DataHash) -> Vec<u64> {
        if !self.seen.contains(hash) {
            return Vec::new();
        }
        self.records
            .iter()
            .filter(|r| &r.data_hash == hash)
            .map(|r| r.version)
            .collect()
    }

    /// Whether appending `hash` would repeat an earlier record under `scope`.
    pub fn is_duplicate(&self, hash: &DataHash, scope: UniquenessScope) -> bool {
        match scope {
            UniquenessScope::Latest => self.latest().is_some_and(|r| &r.data_hash == hash),
            UniquenessScope::History => self.seen.contains(hash),
        }
    }

    /// Append a record at the next version.
    pub(crate) fn append(
        &mut self,
        data_hash: DataHash,
        change_type: ChangeType,
        author: Address,
        sequence: u64,
    ) -> &ChangeRecord {
        let record = ChangeRecord {
            version: self.version_count() + 1,
            data_hash,
            change_type,
            author,
            sequence,
            recorded_at: Utc::now(),
        };
        self.seen.insert(data_hash);
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> Address {
        Address::from_bytes([1; 20])
    }

    fn log_with(hashes: &[&str]) -> HashLog {
        let mut log = HashLog::new();
        for (seq, payload) in hashes.iter().enumerate() {
            log.append(DataHash::digest(payload), ChangeType::Update, author(), seq as u64);
        }
        log
    }

    #[test]
    fn test_versions_are_gapless() {
        let log = log_with(&["a", "b", "c"]);
        let versions: Vec<u64> = log.records().iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(log.version_count(), 3);
        assert_eq!(log.latest().map(|r| r.version), Some(3));
    }

    #[test]
    fn test_range_clips() {
        let log = log_with(&["a", "b", "c"]);

        let window = log.range(1, 5);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].version, 2);

        assert!(log.range(3, 1).is_empty());
        assert!(log.range(10, 5).is_empty());
        assert!(log.range(0, 0).is_empty());
        assert_eq!(log.range(0, u64::MAX).len(), 3);
        assert!(log.range(u64::MAX, u64::MAX).is_empty());
    }

    #[test]
    fn test_get_by_version() {
        let log = log_with(&["a", "b"]);
        assert!(log.get(0).is_none());
        assert_eq!(log.get(2).map(|r| r.data_hash), Some(DataHash::digest("b")));
        assert!(log.get(3).is_none());
    }

    #[test]
    fn test_duplicate_scopes() {
        let log = log_with(&["a", "b"]);
        let a = DataHash::digest("a");
        let b = DataHash::digest("b");

        assert!(log.is_duplicate(&b, UniquenessScope::Latest));
        assert!(!log.is_duplicate(&a, UniquenessScope::Latest));
        assert!(log.is_duplicate(&a, UniquenessScope::History));
        assert!(!HashLog::new().is_duplicate(&a, UniquenessScope::Latest));
    }

    #[test]
    fn test_versions_with_hash() {
        let log = log_with(&["a", "b", "a"]);
        assert_eq!(log.versions_with_hash(&DataHash::digest("a")), vec![1, 3]);
        assert!(log.versions_with_hash(&DataHash::digest("z")).is_empty());
    }

    #[test]
    fn test_from_records_rejects_gap() {
        let mut records = log_with(&["a", "b"]).records().to_vec();
        records[1].version = 3;
        assert_eq!(
            HashLog::from_records(records).unwrap_err(),
            Violation::VersionGap {
                expected: 2,
                found: 3
            }
        );
    }
}

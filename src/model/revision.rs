//! Revision metadata types.

/// Metadata of one revision as reported by the provider.
///
/// Author, message and commit date can all be absent in real histories;
/// they are explicit options here rather than defaulted strings. A revision
/// without a commit date cannot be placed on the activity timeline and is
/// skipped by ingestion.
#[derive(Debug, Clone)]
pub struct RevisionInfo {
    pub revno: i64,
    pub commit_ts: Option<i64>,
    pub author: Option<String>,
    pub message: Option<String>,
}

impl RevisionInfo {
    /// A revision log entry is usable only if it carries a commit date.
    pub fn is_valid(&self) -> bool {
        self.commit_ts.is_some()
    }
}

/// Per-revision file counts, finalized at commit time once directory
/// reconciliation has expanded directory-level operations.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct RevisionCounts {
    pub added: i64,
    pub changed: i64,
    pub deleted: i64,
}

impl RevisionCounts {
    pub fn total(&self) -> i64 {
        self.added + self.changed + self.deleted
    }
}

//! Change-record domain types.
//!
//! These types form the data contract between the classifier, the
//! reconciliation engine and the persistence layer. Kind fields round-trip
//! through the database as single-letter codes, which are part of the
//! stored schema contract.

/// How a path changed in a revision.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Replaced,
}

impl ChangeKind {
    pub fn as_code(self) -> &'static str {
        match self {
            ChangeKind::Added => "A",
            ChangeKind::Modified => "M",
            ChangeKind::Deleted => "D",
            ChangeKind::Replaced => "R",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(ChangeKind::Added),
            "M" => Some(ChangeKind::Modified),
            "D" => Some(ChangeKind::Deleted),
            "R" => Some(ChangeKind::Replaced),
            _ => None,
        }
    }
}

/// Whether a changed path is a file or a directory.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PathKind {
    File,
    Directory,
}

impl PathKind {
    pub fn as_code(self) -> &'static str {
        match self {
            PathKind::File => "F",
            PathKind::Directory => "D",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "F" => Some(PathKind::File),
            "D" => Some(PathKind::Directory),
            _ => None,
        }
    }

    pub fn is_directory(self) -> bool {
        matches!(self, PathKind::Directory)
    }
}

/// Real records come straight from the provider log; Dummy records are
/// synthesized by directory reconciliation to cover files implicitly
/// affected by a directory-level copy or delete.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EntryKind {
    Real,
    Dummy,
}

impl EntryKind {
    pub fn as_code(self) -> &'static str {
        match self {
            EntryKind::Real => "R",
            EntryKind::Dummy => "D",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "R" => Some(EntryKind::Real),
            "D" => Some(EntryKind::Dummy),
            _ => None,
        }
    }
}

/// Lines added and deleted by one change.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct LineDelta {
    pub added: i64,
    pub deleted: i64,
}

impl LineDelta {
    pub fn new(added: i64, deleted: i64) -> Self {
        Self { added, deleted }
    }

    pub fn net(self) -> i64 {
        self.added - self.deleted
    }
}

/// One fully classified change, built once the classifier has every derived
/// field. Immutable afterwards; there is no partially-populated state.
#[derive(Debug, Clone)]
pub struct ChangeEntry {
    /// Normalized path; trailing `/` iff `path_kind` is `Directory`.
    pub path: String,
    pub kind: ChangeKind,
    pub path_kind: PathKind,
    /// Copy provenance: (normalized source path, source revno).
    pub copy_from: Option<(String, i64)>,
    pub lines: LineDelta,
    /// False when line counting was skipped and the counts await backfill.
    pub lc_updated: bool,
}

/// A change entry tagged with its provenance, ready to persist.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub entry: ChangeEntry,
    pub entry_kind: EntryKind,
}

impl ChangeRecord {
    pub fn real(entry: ChangeEntry) -> Self {
        Self { entry, entry_kind: EntryKind::Real }
    }

    pub fn dummy(entry: ChangeEntry) -> Self {
        Self { entry, entry_kind: EntryKind::Dummy }
    }
}

//! Log provider adapter.
//!
//! The version-control server is an external collaborator behind the
//! [`LogProvider`] trait. Calls are synchronous and may fail transiently;
//! production use wraps a provider in [`Retrying`] so every call gets a
//! bounded retry before the error escalates.

mod fixture;
pub mod memory;
mod retry;

pub use fixture::load_history;
pub use memory::{MemoryProvider, MemoryProviderBuilder};
pub use retry::Retrying;

use thiserror::Error;

/// Errors surfaced by a log provider.
///
/// Transient failures (network, timeout) are worth retrying with identical
/// parameters; terminal failures are not.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("provider failure: {0}")]
    Terminal(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Action reported by the provider for one changed path.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RawAction {
    Added,
    Modified,
    Deleted,
    Replaced,
}

impl RawAction {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(RawAction::Added),
            "M" => Some(RawAction::Modified),
            "D" => Some(RawAction::Deleted),
            "R" => Some(RawAction::Replaced),
            _ => None,
        }
    }
}

/// One changed path in a revision's log entry, exactly as reported.
///
/// Directory-level operations arrive as a single entry for the directory
/// path; expanding them to per-file records is the reconciliation engine's
/// job, not the provider's.
#[derive(Debug, Clone)]
pub struct RawChange {
    pub path: String,
    pub action: RawAction,
    pub copyfrom_path: Option<String>,
    pub copyfrom_rev: Option<i64>,
}

/// One raw revision from the provider log.
#[derive(Debug, Clone)]
pub struct RawRevision {
    pub revno: i64,
    pub commit_ts: Option<i64>,
    pub author: Option<String>,
    pub message: Option<String>,
    /// Empty unless the log was fetched with `detailed = true`.
    pub changes: Vec<RawChange>,
}

/// Result of a path-info lookup.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PathInfo {
    pub is_directory: bool,
}

/// Contract of the version-control log source.
///
/// `log_range` returns revisions ordered by revno; `diff` with an empty
/// path diffs the whole tree between two revisions. Every call may fail
/// with a transient error.
pub trait LogProvider {
    /// Current head revision number.
    fn head_revision(&self) -> ProviderResult<i64>;

    /// Ordered revisions in `[start, end]`, change lists included when
    /// `detailed` is set.
    fn log_range(&self, start: i64, end: i64, detailed: bool) -> ProviderResult<Vec<RawRevision>>;

    /// Unified-diff text for `path` between two revisions. An empty path
    /// means the repository root.
    fn diff(&self, path: &str, rev1: i64, rev2: i64) -> ProviderResult<String>;

    /// Node kind of `path` as of `revno`.
    fn path_info(&self, path: &str, revno: i64) -> ProviderResult<PathInfo>;

    /// Full file content of `path` as of `revno`.
    fn read_full_content(&self, path: &str, revno: i64) -> ProviderResult<Vec<u8>>;

    /// Explicit content-type property of `path` as of `revno`, if any.
    fn content_type_property(&self, path: &str, revno: i64) -> ProviderResult<Option<String>>;
}

impl<P: LogProvider + ?Sized> LogProvider for &P {
    fn head_revision(&self) -> ProviderResult<i64> {
        (**self).head_revision()
    }

    fn log_range(&self, start: i64, end: i64, detailed: bool) -> ProviderResult<Vec<RawRevision>> {
        (**self).log_range(start, end, detailed)
    }

    fn diff(&self, path: &str, rev1: i64, rev2: i64) -> ProviderResult<String> {
        (**self).diff(path, rev1, rev2)
    }

    fn path_info(&self, path: &str, revno: i64) -> ProviderResult<PathInfo> {
        (**self).path_info(path, revno)
    }

    fn read_full_content(&self, path: &str, revno: i64) -> ProviderResult<Vec<u8>> {
        (**self).read_full_content(path, revno)
    }

    fn content_type_property(&self, path: &str, revno: i64) -> ProviderResult<Option<String>> {
        (**self).content_type_property(path, revno)
    }
}

//! Ingest store trait for persistence abstraction
//!
//! Decouples the ingestion loop and the reconciliation engine from the
//! database implementation details.

use anyhow::Result;

use crate::model::temperature::TemperatureParams;
use crate::model::{ChangeKind, ChangeRecord, LineDelta, PathKind, RevisionCounts, RevisionInfo};
use crate::repository::PathRegistry;

/// Persistence operations the ingestion engine needs.
///
/// Reads serve the reconciliation replay over already committed history;
/// the single write commits one revision atomically.
#[allow(async_fn_in_trait)]
pub trait IngestStore {
    /// Highest fully committed revision; 0 for an empty store. A run
    /// resumes at the next revision and never revisits committed rows.
    async fn last_committed_revno(&self) -> Result<i64>;

    /// Distinct (path, revno) pairs of files Added or Replaced under a
    /// directory prefix at or below `up_to`.
    async fn files_added_under(&self, prefix: &str, up_to: i64) -> Result<Vec<(String, i64)>>;

    /// Distinct (path, revno) pairs of files Deleted under a directory
    /// prefix at or below `up_to`.
    async fn files_deleted_under(&self, prefix: &str, up_to: i64) -> Result<Vec<(String, i64)>>;

    /// Net line count accumulated by one path's history at or below
    /// `up_to`; zero for unknown paths.
    async fn net_line_count(&self, path: &str, up_to: i64) -> Result<LineDelta>;

    /// Commit one revision: revision row, change records, path registry
    /// rows and temperature checkpoints, all-or-nothing.
    async fn commit_revision(
        &self,
        info: &RevisionInfo,
        counts: RevisionCounts,
        records: &[ChangeRecord],
        registry: &mut PathRegistry,
        temp: &TemperatureParams,
    ) -> Result<()>;

    /// Records whose line counts still await backfill.
    async fn records_pending_line_count(
        &self,
    ) -> Result<Vec<(i64, String, ChangeKind, PathKind)>>;

    /// Backfill one record's line counts and clear its pending flag.
    async fn update_line_count(&self, revno: i64, path: &str, lines: LineDelta) -> Result<()>;
}

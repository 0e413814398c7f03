//! Database implementation of IngestStore

use anyhow::Result;

use crate::model::temperature::TemperatureParams;
use crate::model::{ChangeKind, ChangeRecord, LineDelta, PathKind, RevisionCounts, RevisionInfo};
use crate::repository::{Database, PathRegistry};

use super::store::IngestStore;

impl IngestStore for Database {
    async fn last_committed_revno(&self) -> Result<i64> {
        Database::last_committed_revno(self).await
    }

    async fn files_added_under(&self, prefix: &str, up_to: i64) -> Result<Vec<(String, i64)>> {
        Database::files_added_under(self, prefix, up_to).await
    }

    async fn files_deleted_under(&self, prefix: &str, up_to: i64) -> Result<Vec<(String, i64)>> {
        Database::files_deleted_under(self, prefix, up_to).await
    }

    async fn net_line_count(&self, path: &str, up_to: i64) -> Result<LineDelta> {
        Database::net_line_count(self, path, up_to).await
    }

    async fn commit_revision(
        &self,
        info: &RevisionInfo,
        counts: RevisionCounts,
        records: &[ChangeRecord],
        registry: &mut PathRegistry,
        temp: &TemperatureParams,
    ) -> Result<()> {
        Database::commit_revision(self, info, counts, records, registry, temp).await
    }

    async fn records_pending_line_count(
        &self,
    ) -> Result<Vec<(i64, String, ChangeKind, PathKind)>> {
        Database::records_pending_line_count(self).await
    }

    async fn update_line_count(&self, revno: i64, path: &str, lines: LineDelta) -> Result<()> {
        Database::update_line_count(self, revno, path, lines).await
    }
}

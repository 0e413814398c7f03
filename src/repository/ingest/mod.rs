//! History ingestion engine.
//!
//! Pulls revisions from a log provider and commits them to the store, one
//! atomic transaction per revision, strictly in increasing revno order.
//!
//! # Architecture
//!
//! The engine is organized into layers:
//!
//! - **pager**: paged revision iteration over the provider log
//! - **classifier**: per-path change kind, node kind, binary status and
//!   line-count deltas
//! - **diff**: unified-diff line counting
//! - **reconcile**: expansion of directory-level copies/deletes into
//!   per-file Dummy records
//! - **store**: persistence layer trait
//! - **db_store**: database implementation of IngestStore
//! - **progress**: progress reporting abstraction

mod classifier;
mod db_store;
mod diff;
mod pager;
mod progress;
mod reconcile;
mod store;

pub use classifier::Classifier;
pub use diff::diff_line_counts;
pub use pager::RevisionPager;
pub use progress::{NoopProgress, ProgressHandle, ProgressReporter, VerboseProgress};
pub use reconcile::{ReconcileOutcome, expand_directory_ops};
pub use store::IngestStore;

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use tracing::{info, warn};

use crate::model::temperature::TemperatureParams;
use crate::model::{ChangeKind, ChangeRecord, PathKind, RevisionCounts, RevisionInfo};
use crate::provider::{LogProvider, Retrying};

use super::PathRegistry;

/// Extensions treated as binary without asking the provider.
const DEFAULT_BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "bmp", "tif", "zip", "gz", "bz2", "7z", "jar", "war",
    "exe", "dll", "so", "dylib", "pdf", "doc", "xls", "ppt", "class", "o", "a", "lib", "bin",
];

/// Tuning knobs for an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Revisions fetched per provider round trip.
    pub page_window: usize,
    /// Attempts per provider call before the error escalates.
    pub max_attempts: u32,
    /// When false, records are stored with zero counts and flagged for a
    /// later backfill pass.
    pub update_line_counts: bool,
    /// Extensions that short-circuit binary detection.
    pub binary_extensions: FxHashSet<String>,
    pub temperature: TemperatureParams,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            page_window: 50,
            max_attempts: 3,
            update_line_counts: true,
            binary_extensions: DEFAULT_BINARY_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            temperature: TemperatureParams::default(),
        }
    }
}

/// What one ingestion run accomplished.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestSummary {
    pub revisions: u64,
    pub records: u64,
    pub anomalies: u32,
    pub last_revno: i64,
}

/// History ingestion orchestrator.
pub struct Ingestor<P: LogProvider> {
    provider: Retrying<P>,
    config: IngestConfig,
    verbose: bool,
}

impl<P: LogProvider> Ingestor<P> {
    pub fn new(provider: P, config: IngestConfig) -> Self {
        let provider = Retrying::new(provider, config.max_attempts);
        Self { provider, config, verbose: true }
    }

    /// Create a quiet ingestor (no progress output, used by tests and
    /// benchmarks)
    pub fn quiet(provider: P, config: IngestConfig) -> Self {
        let mut ingestor = Self::new(provider, config);
        ingestor.verbose = false;
        ingestor
    }

    /// Ingest everything after the store's resume point, up to the current
    /// head.
    pub async fn run(&self, store: &impl IngestStore) -> Result<IngestSummary> {
        self.run_range(store, 0, 0).await
    }

    /// Ingest revisions in `[start, end]`. A zero `start` resumes after the
    /// last committed revision; a zero `end` means the current head.
    pub async fn run_range(
        &self,
        store: &impl IngestStore,
        start: i64,
        end: i64,
    ) -> Result<IngestSummary> {
        let progress = VerboseProgress::new(self.verbose);

        // Phase 1: resolve the range. The head is read once; revisions
        // landing after this point belong to the next run.
        let last_committed = store.last_committed_revno().await?;
        let start = if start == 0 { last_committed + 1 } else { start };
        let mut pager = RevisionPager::new(&self.provider, start, end, self.config.page_window)
            .context("failed to resolve the revision range")?;
        let end = pager.end_revno();

        if end < start {
            info!(last_committed, "store is up to date");
            return Ok(IngestSummary { last_revno: last_committed, ..Default::default() });
        }
        info!(start, end, "ingesting revisions");

        // Phase 2: walk the range, one atomic commit per revision.
        let pb = progress.start("Ingesting", (end - start + 1) as u64);
        let mut classifier = Classifier::new(&self.provider, &self.config);
        let mut registry = PathRegistry::new();
        let mut summary = IngestSummary { last_revno: last_committed, ..Default::default() };

        loop {
            let raw = pager.next_revision().context("revision page fetch failed")?;
            let Some(raw) = raw else { break };
            let info = RevisionInfo {
                revno: raw.revno,
                commit_ts: raw.commit_ts,
                author: raw.author.clone(),
                message: raw.message.clone(),
            };
            if !info.is_valid() {
                warn!(revno = raw.revno, "revision has no commit date, skipping");
                pb.inc(1);
                continue;
            }

            let entries = classifier
                .classify_revision(&raw)
                .with_context(|| format!("failed to classify revision {}", raw.revno))?;
            let mut records: Vec<ChangeRecord> =
                entries.into_iter().map(ChangeRecord::real).collect();

            let outcome = expand_directory_ops(store, raw.revno, &records)
                .await
                .with_context(|| format!("reconciliation failed for revision {}", raw.revno))?;
            summary.anomalies += outcome.anomalies;
            records.extend(outcome.dummies);

            let counts = file_counts(&records);
            if let Err(err) = store
                .commit_revision(&info, counts, &records, &mut registry, &self.config.temperature)
                .await
            {
                // The transaction rolled back; ids cached during it may not
                // exist in the paths table.
                registry.clear();
                return Err(err.context(format!("failed to commit revision {}", raw.revno)));
            }

            summary.revisions += 1;
            summary.records += records.len() as u64;
            summary.last_revno = raw.revno;
            pb.inc(1);
        }

        pb.finish();
        info!(
            revisions = summary.revisions,
            records = summary.records,
            anomalies = summary.anomalies,
            "ingestion run complete"
        );
        Ok(summary)
    }

    /// Backfill line counts for records ingested with
    /// `update_line_counts = false`. Returns the number of records updated.
    ///
    /// This is the one sanctioned rewrite of historic rows; everything else
    /// about a committed revision is immutable.
    pub async fn backfill_line_counts(&self, store: &impl IngestStore) -> Result<u64> {
        let pending = store.records_pending_line_count().await?;
        if pending.is_empty() {
            return Ok(0);
        }
        info!(records = pending.len(), "backfilling line counts");

        let progress = VerboseProgress::new(self.verbose);
        let pb = progress.start("Backfilling", pending.len() as u64);
        let classifier = Classifier::new(&self.provider, &self.config);
        let mut updated = 0u64;
        for (revno, path, kind, path_kind) in pending {
            let lines = classifier
                .line_delta_for(revno, &path, kind, path_kind)
                .with_context(|| format!("failed to count lines for {} at r{}", path, revno))?;
            store.update_line_count(revno, &path, lines).await?;
            updated += 1;
            pb.inc(1);
        }
        pb.finish();
        Ok(updated)
    }
}

/// Final per-revision file counts; directories do not count, synthesized
/// records do.
fn file_counts(records: &[ChangeRecord]) -> RevisionCounts {
    let mut counts = RevisionCounts::default();
    for record in records {
        if record.entry.path_kind != PathKind::File {
            continue;
        }
        match record.entry.kind {
            ChangeKind::Added => counts.added += 1,
            ChangeKind::Modified | ChangeKind::Replaced => counts.changed += 1,
            ChangeKind::Deleted => counts.deleted += 1,
        }
    }
    counts
}

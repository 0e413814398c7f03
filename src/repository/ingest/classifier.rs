//! Change classification.
//!
//! Turns the raw changed paths of one revision into fully populated,
//! immutable [`ChangeEntry`] values: path kind, normalized path, copy
//! provenance and line-count deltas.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::model::{ChangeEntry, ChangeKind, LineDelta, PathKind};
use crate::provider::{LogProvider, ProviderResult, RawAction, RawChange, RawRevision};
use crate::util::path as upath;

use super::IngestConfig;
use super::diff::diff_line_counts;

pub struct Classifier<'a, P: LogProvider> {
    provider: &'a P,
    config: &'a IngestConfig,
    /// Path-kind lookups already answered for the revision being
    /// classified; avoids duplicate provider round-trips.
    kind_cache: FxHashMap<(i64, String), PathKind>,
}

impl<'a, P: LogProvider> Classifier<'a, P> {
    pub fn new(provider: &'a P, config: &'a IngestConfig) -> Self {
        Self { provider, config, kind_cache: FxHashMap::default() }
    }

    /// Classify every changed path of one revision.
    pub fn classify_revision(&mut self, rev: &RawRevision) -> ProviderResult<Vec<ChangeEntry>> {
        self.kind_cache.clear();

        // One whole-revision diff up front; per-file diffs only as fallback
        // for paths the batch parse did not cover.
        let batch = if self.config.update_line_counts && !rev.changes.is_empty() {
            diff_line_counts(&self.provider.diff("", rev.revno - 1, rev.revno)?)
        } else {
            FxHashMap::default()
        };

        rev.changes
            .iter()
            .map(|change| self.classify_change(rev.revno, change, &batch))
            .collect()
    }

    fn classify_change(
        &mut self,
        revno: i64,
        raw: &RawChange,
        batch: &FxHashMap<String, LineDelta>,
    ) -> ProviderResult<ChangeEntry> {
        let kind = change_kind(raw.action);
        let path_kind = self.path_kind(revno, &raw.path, kind)?;
        let path = match path_kind {
            PathKind::Directory => upath::normalize_dir(&raw.path),
            PathKind::File => upath::normalize(&raw.path),
        };

        let copy_from = match (&raw.copyfrom_path, raw.copyfrom_rev) {
            (Some(source), Some(source_rev)) if source_rev < revno => {
                let source = match path_kind {
                    PathKind::Directory => upath::normalize_dir(source),
                    PathKind::File => upath::normalize(source),
                };
                Some((source, source_rev))
            }
            (Some(source), Some(source_rev)) => {
                warn!(revno, %source, source_rev, "copy source not older than revision, dropping provenance");
                None
            }
            _ => None,
        };

        let (lines, lc_updated) = if self.config.update_line_counts {
            (self.line_delta(revno, &raw.path, &path, kind, path_kind, batch)?, true)
        } else {
            (LineDelta::default(), false)
        };

        debug!(revno, path = %path, kind = kind.as_code(), added = lines.added, deleted = lines.deleted, "classified change");
        Ok(ChangeEntry { path, kind, path_kind, copy_from, lines, lc_updated })
    }

    /// Line delta for a single already-stored record, computed without the
    /// whole-revision batch diff. Used by the deferred backfill pass.
    pub fn line_delta_for(
        &self,
        revno: i64,
        path: &str,
        kind: ChangeKind,
        path_kind: PathKind,
    ) -> ProviderResult<LineDelta> {
        self.line_delta(revno, path, path, kind, path_kind, &FxHashMap::default())
    }

    /// Node kind of a changed path, answered from the per-revision cache
    /// when possible. A deleted path no longer exists at `revno`, so its
    /// kind is looked up at `revno - 1`, its last-existing revision.
    fn path_kind(&mut self, revno: i64, path: &str, kind: ChangeKind) -> ProviderResult<PathKind> {
        let key = (revno, path.to_string());
        if let Some(kind) = self.kind_cache.get(&key) {
            return Ok(*kind);
        }
        let lookup_rev = match kind {
            ChangeKind::Deleted => revno - 1,
            _ => revno,
        };
        let info = self.provider.path_info(path, lookup_rev)?;
        let path_kind = if info.is_directory { PathKind::Directory } else { PathKind::File };
        self.kind_cache.insert(key, path_kind);
        Ok(path_kind)
    }

    fn line_delta(
        &self,
        revno: i64,
        raw_path: &str,
        path: &str,
        kind: ChangeKind,
        path_kind: PathKind,
        batch: &FxHashMap<String, LineDelta>,
    ) -> ProviderResult<LineDelta> {
        if path_kind.is_directory() {
            return Ok(LineDelta::default());
        }
        match kind {
            ChangeKind::Modified | ChangeKind::Replaced => {
                if let Some(delta) = batch.get(path) {
                    return Ok(*delta);
                }
                // Not in the batch parse; diff the single file. A path
                // still absent afterwards had a property-only change.
                let diff = self.provider.diff(raw_path, revno - 1, revno)?;
                Ok(diff_line_counts(&diff).get(path).copied().unwrap_or_default())
            }
            ChangeKind::Added => {
                if self.is_binary(raw_path, revno)? {
                    Ok(LineDelta::default())
                } else {
                    Ok(LineDelta::new(self.line_count(raw_path, revno)?, 0))
                }
            }
            ChangeKind::Deleted => {
                // The file's content exists only at its last revision.
                if self.is_binary(raw_path, revno - 1)? {
                    Ok(LineDelta::default())
                } else {
                    Ok(LineDelta::new(0, self.line_count(raw_path, revno - 1)?))
                }
            }
        }
    }

    /// Binary detection: a configured extension answers without a round
    /// trip; otherwise the content-type property decides. No property, or
    /// a textual one, means text.
    fn is_binary(&self, path: &str, revno: i64) -> ProviderResult<bool> {
        if let Some(ext) = upath::extension(path) {
            if self.config.binary_extensions.contains(&ext) {
                return Ok(true);
            }
        }
        match self.provider.content_type_property(path, revno)? {
            None => Ok(false),
            Some(mime) => Ok(!mime.contains("text")),
        }
    }

    fn line_count(&self, path: &str, revno: i64) -> ProviderResult<i64> {
        let content = self.provider.read_full_content(path, revno)?;
        Ok(count_lines(&content))
    }
}

fn change_kind(action: RawAction) -> ChangeKind {
    match action {
        RawAction::Added => ChangeKind::Added,
        RawAction::Modified => ChangeKind::Modified,
        RawAction::Deleted => ChangeKind::Deleted,
        RawAction::Replaced => ChangeKind::Replaced,
    }
}

/// Number of lines in a file body; an unterminated trailing line counts.
fn count_lines(content: &[u8]) -> i64 {
    if content.is_empty() {
        return 0;
    }
    let mut lines = content.iter().filter(|&&b| b == b'\n').count() as i64;
    if content.last() != Some(&b'\n') {
        lines += 1;
    }
    lines
}

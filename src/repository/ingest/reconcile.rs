//! Directory reconciliation.
//!
//! A directory-level copy or delete implicitly affects every file beneath
//! the directory, but the provider reports only the directory entry. This
//! module expands those operations into per-file Dummy records by replaying
//! already ingested history, never by listing the provider's tree.
//!
//! All intermediate file sets are owned values scoped to one revision's
//! reconciliation call.

use std::collections::hash_map::Entry;

use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::model::{ChangeEntry, ChangeKind, ChangeRecord, LineDelta, PathKind};
use crate::util::path as upath;

use super::store::IngestStore;

/// Synthetic records for one revision, plus the count of corrected
/// anomalies (negative derived line counts).
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub dummies: Vec<ChangeRecord>,
    pub anomalies: u32,
}

/// A file implied at a copy destination: where it came from and the
/// revision whose Added/Replaced record put it there.
#[derive(Debug, Clone)]
struct CopyCandidate {
    add_revno: i64,
    source_path: String,
    source_rev: i64,
}

/// Expand the directory-level copies and deletes among `real` into per-file
/// Dummy records for `revno`. Real records always win: a candidate whose
/// exact (revno, path) is already covered is dropped.
pub async fn expand_directory_ops(
    store: &impl IngestStore,
    revno: i64,
    real: &[ChangeRecord],
) -> Result<ReconcileOutcome> {
    let copied_dirs: Vec<(&str, &str, i64)> = real
        .iter()
        .filter_map(|record| {
            let entry = &record.entry;
            if entry.path_kind.is_directory()
                && matches!(entry.kind, ChangeKind::Added | ChangeKind::Replaced)
            {
                entry
                    .copy_from
                    .as_ref()
                    .map(|(source, source_rev)| (entry.path.as_str(), source.as_str(), *source_rev))
            } else {
                None
            }
        })
        .collect();
    let deleted_dirs: Vec<&str> = real
        .iter()
        .filter(|record| {
            record.entry.path_kind.is_directory() && record.entry.kind == ChangeKind::Deleted
        })
        .map(|record| record.entry.path.as_str())
        .collect();

    if copied_dirs.is_empty() && deleted_dirs.is_empty() {
        return Ok(ReconcileOutcome::default());
    }

    let real_files: FxHashSet<&str> = real
        .iter()
        .filter(|record| record.entry.path_kind == PathKind::File)
        .map(|record| record.entry.path.as_str())
        .collect();

    // Files implied at each copy destination: replay the source prefix as
    // of the copy revision, then rewrite the prefix. When several copies
    // land on the same destination path, the newest addition wins.
    let mut candidates: FxHashMap<String, CopyCandidate> = FxHashMap::default();
    for (dest, source, source_rev) in &copied_dirs {
        let added = store.files_added_under(source, *source_rev).await?;
        let deleted = store.files_deleted_under(source, *source_rev).await?;
        for (source_file, add_revno) in replay_survivors(added, &deleted) {
            let Some(dest_file) = upath::rewrite_prefix(&source_file, source, dest) else {
                continue;
            };
            let candidate = CopyCandidate {
                add_revno,
                source_path: source_file,
                source_rev: *source_rev,
            };
            match candidates.entry(dest_file) {
                Entry::Occupied(mut existing) => {
                    if existing.get().add_revno < candidate.add_revno {
                        existing.insert(candidate);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
            }
        }
    }

    // A Real record for the exact (revno, path) suppresses the synthetic one.
    candidates.retain(|path, _| !real_files.contains(path.as_str()));

    // A deleted directory whose subtree was re-landed by a copy in this
    // same revision is a move: drop those candidates and skip the
    // deletion expansion for it.
    let mut expand_deletes: Vec<&str> = Vec::new();
    for &dir in &deleted_dirs {
        let before = candidates.len();
        candidates.retain(|path, _| !path.starts_with(dir));
        if candidates.len() == before {
            expand_deletes.push(dir);
        }
    }

    let mut outcome = ReconcileOutcome::default();

    let mut copy_dummies: Vec<(String, CopyCandidate)> = candidates.into_iter().collect();
    copy_dummies.sort_by(|a, b| a.0.cmp(&b.0));
    for (dest_file, candidate) in copy_dummies {
        // Derived, not diffed: the source file's accumulated net line count
        // as of the copy point.
        let net = store.net_line_count(&candidate.source_path, candidate.source_rev).await?;
        let lines_added = clamp_net(net, &candidate.source_path, revno, &mut outcome.anomalies);
        outcome.dummies.push(ChangeRecord::dummy(ChangeEntry {
            path: dest_file,
            kind: ChangeKind::Added,
            path_kind: PathKind::File,
            copy_from: Some((candidate.source_path, candidate.source_rev)),
            lines: LineDelta::new(lines_added, 0),
            lc_updated: true,
        }));
    }

    for dir in expand_deletes {
        // The file set that existed immediately before this revision.
        let added = store.files_added_under(dir, revno - 1).await?;
        let deleted = store.files_deleted_under(dir, revno - 1).await?;
        let mut files: Vec<String> = replay_survivors(added, &deleted).into_keys().collect();
        files.sort();
        debug!(revno, dir, files = files.len(), "expanding directory delete");
        for path in files {
            if real_files.contains(path.as_str()) {
                continue;
            }
            let net = store.net_line_count(&path, revno).await?;
            let lines_deleted = clamp_net(net, &path, revno, &mut outcome.anomalies);
            outcome.dummies.push(ChangeRecord::dummy(ChangeEntry {
                path,
                kind: ChangeKind::Deleted,
                path_kind: PathKind::File,
                copy_from: None,
                lines: LineDelta::new(0, lines_deleted),
                lc_updated: true,
            }));
        }
    }

    Ok(outcome)
}

/// Replay Added/Replaced records against later Deleted records: a delete at
/// revision D removes additions older than D. Returns each surviving file
/// with its newest surviving addition revision.
fn replay_survivors(
    added: Vec<(String, i64)>,
    deleted: &[(String, i64)],
) -> FxHashMap<String, i64> {
    let mut last_delete: FxHashMap<&str, i64> = FxHashMap::default();
    for (path, del_revno) in deleted {
        last_delete
            .entry(path.as_str())
            .and_modify(|existing| *existing = (*existing).max(*del_revno))
            .or_insert(*del_revno);
    }

    let mut survivors: FxHashMap<String, i64> = FxHashMap::default();
    for (path, add_revno) in added {
        if last_delete.get(path.as_str()).is_some_and(|&del| add_revno < del) {
            continue;
        }
        survivors
            .entry(path)
            .and_modify(|existing| *existing = (*existing).max(add_revno))
            .or_insert(add_revno);
    }
    survivors
}

fn clamp_net(net: LineDelta, path: &str, revno: i64, anomalies: &mut u32) -> i64 {
    let value = net.net();
    if value < 0 {
        warn!(path, revno, value, "negative derived line count, clamping to zero");
        *anomalies += 1;
        return 0;
    }
    value
}

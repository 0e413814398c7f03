//! Diff line-count extraction.
//!
//! Parses unified-diff text into per-path (added, deleted) line counts by
//! scanning line by line; no hunk reconstruction is needed for counting.

use rustc_hash::FxHashMap;

use crate::model::LineDelta;

/// Marker starting the diff of the next path.
const FILE_HEADER: &str = "Index: ";

/// Marker starting a property-only diff section; nothing in it is counted.
const PROP_HEADER: &str = "Property changes on: ";

/// Count added/deleted lines per path in unified-diff text.
///
/// A `FILE_HEADER` line flushes the running counters and starts tracking a
/// new path; a `PROP_HEADER` line flushes and stops tracking. Header paths
/// are reported relative, so a leading `/` is restored to match the names
/// in revision change lists. Lines beginning with `---`, `+++`, `@@` or
/// `===` are diff metadata; any other line beginning with `-` or `+` counts
/// toward the current path.
pub fn diff_line_counts(diff_text: &str) -> FxHashMap<String, LineDelta> {
    let mut counts = FxHashMap::default();
    let mut current: Option<String> = None;
    let mut delta = LineDelta::default();

    for line in diff_text.lines() {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix(FILE_HEADER) {
            if let Some(path) = current.take() {
                counts.insert(path, delta);
            }
            delta = LineDelta::default();
            current = Some(format!("/{}", rest));
        } else if line.starts_with(PROP_HEADER) {
            if let Some(path) = current.take() {
                counts.insert(path, delta);
            }
            delta = LineDelta::default();
        } else if line.starts_with("---")
            || line.starts_with("+++")
            || line.starts_with("@@")
            || line.starts_with("===")
        {
            continue;
        } else if line.starts_with('-') {
            delta.deleted += 1;
        } else if line.starts_with('+') {
            delta.added += 1;
        }
    }

    if let Some(path) = current {
        counts.insert(path, delta);
    }
    counts
}

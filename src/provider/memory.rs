//! In-memory log provider.
//!
//! A complete [`LogProvider`] over a scripted history, used by tests,
//! benches and the fixture-driven CLI. The builder applies file operations
//! revision by revision and keeps a full tree snapshot per revision, from
//! which path-info, content and unified-diff answers are derived.
//!
//! Directory-level operations record only the directory entry in the raw
//! change list, exactly as a real server reports them; the per-file
//! expansion is left to the reconciliation engine under test.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    LogProvider, PathInfo, ProviderError, ProviderResult, RawAction, RawChange, RawRevision,
};

#[derive(Debug, Clone)]
struct FileState {
    content: Vec<u8>,
    mime: Option<String>,
}

impl FileState {
    fn is_text(&self) -> bool {
        match &self.mime {
            None => true,
            Some(mime) => mime.contains("text"),
        }
    }
}

/// Full tree state as of one revision. File paths carry a leading `/`;
/// directory paths are stored without the trailing `/`.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    files: BTreeMap<String, FileState>,
    dirs: BTreeSet<String>,
}

/// In-memory provider over a pre-built history.
pub struct MemoryProvider {
    head: i64,
    revisions: BTreeMap<i64, RawRevision>,
    snapshots: BTreeMap<i64, Snapshot>,
    log_calls: AtomicU64,
    diff_calls: AtomicU64,
    info_calls: AtomicU64,
    content_calls: AtomicU64,
    prop_calls: AtomicU64,
}

impl MemoryProvider {
    pub fn builder() -> MemoryProviderBuilder {
        MemoryProviderBuilder::new()
    }

    /// Number of `log_range` calls served so far.
    pub fn log_calls(&self) -> u64 {
        self.log_calls.load(Ordering::SeqCst)
    }

    /// Number of `path_info` calls served so far.
    pub fn info_calls(&self) -> u64 {
        self.info_calls.load(Ordering::SeqCst)
    }

    /// Number of `content_type_property` calls served so far.
    pub fn prop_calls(&self) -> u64 {
        self.prop_calls.load(Ordering::SeqCst)
    }

    /// Number of `diff` calls served so far.
    pub fn diff_calls(&self) -> u64 {
        self.diff_calls.load(Ordering::SeqCst)
    }

    /// Tree state as of `revno`: the snapshot of the highest revision at or
    /// below it. Below the first revision the tree is empty.
    fn snapshot_at(&self, revno: i64) -> Snapshot {
        self.snapshots
            .range(..=revno)
            .next_back()
            .map(|(_, snap)| snap.clone())
            .unwrap_or_default()
    }
}

fn in_scope(file_path: &str, scope: &str) -> bool {
    scope.is_empty()
        || file_path == scope
        || (file_path.starts_with(scope) && file_path.as_bytes()[scope.len()] == b'/')
}

/// Emit one file section in the shape of `svn diff` output: an `Index:`
/// header (path without the leading `/`), a `===` separator, `---`/`+++`
/// metadata, then the full old content as `-` lines and the full new
/// content as `+` lines.
fn push_diff_section(
    out: &mut String,
    path: &str,
    old: Option<&FileState>,
    new: Option<&FileState>,
    rev1: i64,
    rev2: i64,
) {
    let rel = path.trim_start_matches('/');
    out.push_str(&format!("Index: {}\n", rel));
    out.push_str("===================================================================\n");
    let binary = old.map(|f| !f.is_text()).unwrap_or(false)
        || new.map(|f| !f.is_text()).unwrap_or(false);
    if binary {
        out.push_str("Cannot display: file marked as a binary type.\n");
        return;
    }
    out.push_str(&format!("--- {}\t(revision {})\n", rel, rev1));
    out.push_str(&format!("+++ {}\t(revision {})\n", rel, rev2));
    out.push_str("@@ @@\n");
    if let Some(old) = old {
        for line in String::from_utf8_lossy(&old.content).lines() {
            out.push_str(&format!("-{}\n", line));
        }
    }
    if let Some(new) = new {
        for line in String::from_utf8_lossy(&new.content).lines() {
            out.push_str(&format!("+{}\n", line));
        }
    }
}

impl LogProvider for MemoryProvider {
    fn head_revision(&self) -> ProviderResult<i64> {
        Ok(self.head)
    }

    fn log_range(&self, start: i64, end: i64, detailed: bool) -> ProviderResult<Vec<RawRevision>> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .revisions
            .range(start..=end)
            .map(|(_, rev)| {
                let mut rev = rev.clone();
                if !detailed {
                    rev.changes.clear();
                }
                rev
            })
            .collect())
    }

    fn diff(&self, path: &str, rev1: i64, rev2: i64) -> ProviderResult<String> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        let scope = path.trim_end_matches('/');
        let old = self.snapshot_at(rev1);
        let new = self.snapshot_at(rev2);

        let mut paths: BTreeSet<&String> = BTreeSet::new();
        paths.extend(old.files.keys().filter(|p| in_scope(p, scope)));
        paths.extend(new.files.keys().filter(|p| in_scope(p, scope)));

        let mut out = String::new();
        for path in paths {
            let before = old.files.get(path);
            let after = new.files.get(path);
            let changed = match (before, after) {
                (Some(a), Some(b)) => a.content != b.content,
                (None, None) => false,
                _ => true,
            };
            if changed {
                push_diff_section(&mut out, path, before, after, rev1, rev2);
            }
        }
        Ok(out)
    }

    fn path_info(&self, path: &str, revno: i64) -> ProviderResult<PathInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Ok(PathInfo { is_directory: true });
        }
        let snap = self.snapshot_at(revno);
        if snap.dirs.contains(path) {
            Ok(PathInfo { is_directory: true })
        } else if snap.files.contains_key(path) {
            Ok(PathInfo { is_directory: false })
        } else {
            Err(ProviderError::Terminal(format!("no such path {} at r{}", path, revno)))
        }
    }

    fn read_full_content(&self, path: &str, revno: i64) -> ProviderResult<Vec<u8>> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        self.snapshot_at(revno)
            .files
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| ProviderError::Terminal(format!("no such file {} at r{}", path, revno)))
    }

    fn content_type_property(&self, path: &str, revno: i64) -> ProviderResult<Option<String>> {
        self.prop_calls.fetch_add(1, Ordering::SeqCst);
        self.snapshot_at(revno)
            .files
            .get(path)
            .map(|f| f.mime.clone())
            .ok_or_else(|| ProviderError::Terminal(format!("no such file {} at r{}", path, revno)))
    }
}

/// Builds a [`MemoryProvider`] one revision at a time.
///
/// Operations between `begin` and `commit` accumulate raw changes and
/// mutate the working snapshot; `commit` freezes the snapshot for that
/// revision.
pub struct MemoryProviderBuilder {
    snapshot: Snapshot,
    pending: Option<RawRevision>,
    revisions: BTreeMap<i64, RawRevision>,
    snapshots: BTreeMap<i64, Snapshot>,
}

impl MemoryProviderBuilder {
    pub fn new() -> Self {
        Self {
            snapshot: Snapshot::default(),
            pending: None,
            revisions: BTreeMap::new(),
            snapshots: BTreeMap::new(),
        }
    }

    /// Start a revision with full metadata.
    pub fn begin(&mut self, revno: i64, ts: i64, author: &str, message: &str) -> &mut Self {
        self.begin_raw(revno, Some(ts), Some(author), Some(message))
    }

    /// Start a revision with explicitly optional metadata (histories do
    /// contain authorless and even dateless revisions).
    pub fn begin_raw(
        &mut self,
        revno: i64,
        ts: Option<i64>,
        author: Option<&str>,
        message: Option<&str>,
    ) -> &mut Self {
        assert!(self.pending.is_none(), "previous revision not committed");
        if let Some((&last, _)) = self.revisions.iter().next_back() {
            assert!(revno > last, "revisions must be added in increasing order");
        }
        self.pending = Some(RawRevision {
            revno,
            commit_ts: ts,
            author: author.map(str::to_string),
            message: message.map(str::to_string),
            changes: Vec::new(),
        });
        self
    }

    /// Freeze the pending revision and its snapshot.
    pub fn commit(&mut self) -> &mut Self {
        let rev = self.pending.take().expect("no revision in progress");
        self.snapshots.insert(rev.revno, self.snapshot.clone());
        self.revisions.insert(rev.revno, rev);
        self
    }

    pub fn build(self) -> MemoryProvider {
        assert!(self.pending.is_none(), "last revision not committed");
        let head = self.revisions.keys().next_back().copied().unwrap_or(0);
        MemoryProvider {
            head,
            revisions: self.revisions,
            snapshots: self.snapshots,
            log_calls: AtomicU64::new(0),
            diff_calls: AtomicU64::new(0),
            info_calls: AtomicU64::new(0),
            content_calls: AtomicU64::new(0),
            prop_calls: AtomicU64::new(0),
        }
    }

    pub fn add_file(&mut self, path: &str, content: &str) -> &mut Self {
        self.record(path, RawAction::Added, None);
        self.put_file(path, content.as_bytes().to_vec(), None);
        self
    }

    pub fn add_binary_file(&mut self, path: &str, content: &[u8], mime: &str) -> &mut Self {
        self.record(path, RawAction::Added, None);
        self.put_file(path, content.to_vec(), Some(mime.to_string()));
        self
    }

    pub fn modify_file(&mut self, path: &str, content: &str) -> &mut Self {
        self.record(path, RawAction::Modified, None);
        self.set_content(path, content.as_bytes().to_vec());
        self
    }

    /// Replace a file (delete + add at the same path in one revision,
    /// reported as a single `R` action).
    pub fn replace_file(&mut self, path: &str, content: &str) -> &mut Self {
        self.record(path, RawAction::Replaced, None);
        self.set_content(path, content.as_bytes().to_vec());
        self
    }

    pub fn delete_file(&mut self, path: &str) -> &mut Self {
        self.record(path, RawAction::Deleted, None);
        self.snapshot.files.remove(path);
        self
    }

    pub fn copy_file(&mut self, from: &str, from_rev: i64, to: &str) -> &mut Self {
        let state = self
            .source_snapshot(from_rev)
            .files
            .get(from)
            .unwrap_or_else(|| panic!("copy source {} missing at r{}", from, from_rev))
            .clone();
        self.record_copy(to, RawAction::Added, from, from_rev);
        self.put_file(to, state.content, state.mime);
        self
    }

    pub fn add_dir(&mut self, path: &str) -> &mut Self {
        self.record(path, RawAction::Added, None);
        self.snapshot.dirs.insert(path.trim_end_matches('/').to_string());
        self
    }

    /// Copy a whole directory. The raw change list gets only the
    /// directory-level entry; the snapshot gets the full subtree.
    pub fn copy_dir(&mut self, from: &str, from_rev: i64, to: &str) -> &mut Self {
        let from = from.trim_end_matches('/').to_string();
        let to = to.trim_end_matches('/').to_string();
        let source = self.source_snapshot(from_rev).clone();
        self.record_copy(&to, RawAction::Added, &from, from_rev);
        self.snapshot.dirs.insert(to.clone());
        let file_moves: Vec<(String, FileState)> = source
            .files
            .iter()
            .filter(|(p, _)| in_scope(p, &from))
            .map(|(p, state)| (format!("{}{}", to, &p[from.len()..]), state.clone()))
            .collect();
        for (path, state) in file_moves {
            self.put_file(&path, state.content, state.mime);
        }
        let dir_moves: Vec<String> = source
            .dirs
            .iter()
            .filter(|d| in_scope(d, &from))
            .map(|d| format!("{}{}", to, &d[from.len()..]))
            .collect();
        self.snapshot.dirs.extend(dir_moves);
        self
    }

    /// Delete a whole directory; only the directory-level entry is
    /// recorded.
    pub fn delete_dir(&mut self, path: &str) -> &mut Self {
        let path = path.trim_end_matches('/').to_string();
        self.record(&path, RawAction::Deleted, None);
        self.snapshot.files.retain(|p, _| !in_scope(p, &path));
        self.snapshot.dirs.retain(|d| !in_scope(d, &path));
        self
    }

    /// Tree state as of `revno` among the revisions committed so far.
    fn source_snapshot(&self, revno: i64) -> &Snapshot {
        self.snapshots
            .range(..=revno)
            .next_back()
            .map(|(_, snap)| snap)
            .unwrap_or_else(|| panic!("no snapshot at or below r{}", revno))
    }

    fn record(&mut self, path: &str, action: RawAction, copy: Option<(&str, i64)>) {
        let rev = self.pending.as_mut().expect("no revision in progress");
        rev.changes.push(RawChange {
            path: path.trim_end_matches('/').to_string(),
            action,
            copyfrom_path: copy.map(|(p, _)| p.to_string()),
            copyfrom_rev: copy.map(|(_, r)| r),
        });
    }

    fn record_copy(&mut self, path: &str, action: RawAction, from: &str, from_rev: i64) {
        self.record(path, action, Some((from, from_rev)));
    }

    fn put_file(&mut self, path: &str, content: Vec<u8>, mime: Option<String>) {
        // Ancestor directories exist implicitly, as on a real server.
        let mut idx = 0;
        while let Some(pos) = path[idx + 1..].find('/') {
            idx += 1 + pos;
            self.snapshot.dirs.insert(path[..idx].to_string());
        }
        self.snapshot.files.insert(path.to_string(), FileState { content, mime });
    }

    fn set_content(&mut self, path: &str, content: Vec<u8>) {
        let file = self
            .snapshot
            .files
            .get_mut(path)
            .unwrap_or_else(|| panic!("modify of unknown file {}", path));
        file.content = content;
    }
}

impl Default for MemoryProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_rev_history() -> MemoryProvider {
        let mut b = MemoryProvider::builder();
        b.begin(1, 1_000, "alice", "add trunk")
            .add_dir("/trunk")
            .add_file("/trunk/a.txt", "one\ntwo\n")
            .commit();
        b.begin(2, 2_000, "bob", "edit a")
            .modify_file("/trunk/a.txt", "one\ntwo\nthree\n")
            .commit();
        b.build()
    }

    #[test]
    fn test_head_and_log_range() {
        let p = two_rev_history();
        assert_eq!(p.head_revision().unwrap(), 2);
        let revs = p.log_range(1, 2, true).unwrap();
        assert_eq!(revs.len(), 2);
        assert_eq!(revs[0].changes.len(), 2);
        let brief = p.log_range(1, 1, false).unwrap();
        assert!(brief[0].changes.is_empty());
    }

    #[test]
    fn test_snapshot_content_and_info() {
        let p = two_rev_history();
        assert_eq!(p.read_full_content("/trunk/a.txt", 1).unwrap(), b"one\ntwo\n");
        assert_eq!(p.read_full_content("/trunk/a.txt", 2).unwrap(), b"one\ntwo\nthree\n");
        assert!(p.path_info("/trunk", 1).unwrap().is_directory);
        assert!(!p.path_info("/trunk/a.txt", 1).unwrap().is_directory);
        assert!(p.path_info("/trunk/missing", 1).is_err());
    }

    #[test]
    fn test_diff_shape() {
        let p = two_rev_history();
        let diff = p.diff("", 1, 2).unwrap();
        assert!(diff.starts_with("Index: trunk/a.txt\n"));
        // Full-replacement diff: two old lines out, three new lines in.
        let minus = diff.lines().filter(|l| l.starts_with('-') && !l.starts_with("---")).count();
        let plus = diff.lines().filter(|l| l.starts_with('+') && !l.starts_with("+++")).count();
        assert_eq!(minus, 2);
        assert_eq!(plus, 3);
    }

    #[test]
    fn test_copy_dir_snapshot_expands_but_log_does_not() {
        let mut b = MemoryProvider::builder();
        b.begin(1, 1_000, "alice", "add")
            .add_dir("/trunk")
            .add_file("/trunk/a.txt", "x\n")
            .add_file("/trunk/sub/b.txt", "y\n")
            .commit();
        b.begin(2, 2_000, "alice", "branch").copy_dir("/trunk", 1, "/branches/b1").commit();
        let p = b.build();

        let revs = p.log_range(2, 2, true).unwrap();
        assert_eq!(revs[0].changes.len(), 1, "only the directory-level entry is reported");
        assert_eq!(revs[0].changes[0].copyfrom_path.as_deref(), Some("/trunk"));

        assert_eq!(p.read_full_content("/branches/b1/a.txt", 2).unwrap(), b"x\n");
        assert!(p.path_info("/branches/b1/sub", 2).unwrap().is_directory);
    }
}

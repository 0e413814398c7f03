// End-to-end ingestion tests: provider -> classifier -> reconciliation ->
// store, through the public Ingestor API.

mod common;

use revsink::model::temperature::TemperatureParams;
use revsink::model::{ChangeKind, EntryKind, LineDelta, PathKind};
use revsink::provider::{
    LogProvider, MemoryProvider, PathInfo, ProviderError, ProviderResult, RawRevision,
};
use revsink::repository::ingest::{IngestConfig, Ingestor};
use revsink::repository::{Database, StoredChangeRecord};

async fn records(db: &Database, revno: i64) -> Vec<StoredChangeRecord> {
    db.records_for_revision(revno).await.unwrap()
}

#[tokio::test]
async fn test_simple_history_ingests_line_counts() {
    let db = common::create_test_db().await;
    let summary = common::ingest(&db, common::branching_history()).await;

    assert_eq!(summary.revisions, 5);
    assert_eq!(summary.last_revno, 5);
    assert_eq!(summary.anomalies, 0);

    let r1 = records(&db, 1).await;
    assert_eq!(r1.len(), 2);
    assert_eq!(r1[0].path, "/trunk/");
    assert_eq!(r1[0].path_kind, PathKind::Directory);
    assert_eq!(r1[0].lines, LineDelta::default());
    assert_eq!(r1[1].path, "/trunk/a.txt");
    assert_eq!(r1[1].lines, LineDelta::new(3, 0));

    // Modification counted from the whole-revision diff.
    let r2 = records(&db, 2).await;
    assert_eq!(r2.len(), 1);
    assert_eq!(r2[0].change_kind, ChangeKind::Modified);
    assert_eq!(r2[0].lines, LineDelta::new(5, 3));

    let stored = db.revision(1).await.unwrap().unwrap();
    assert_eq!(stored.counts.added, 1, "directories do not count as files");
}

#[tokio::test]
async fn test_directory_copy_expands_to_dummy_records() {
    let db = common::create_test_db().await;
    common::ingest(&db, common::branching_history()).await;

    let r4 = records(&db, 4).await;
    assert_eq!(r4.len(), 3);

    let dir = &r4[r4.iter().position(|r| r.path == "/branches/b1/").unwrap()];
    assert_eq!(dir.entry_kind, EntryKind::Real);
    assert_eq!(dir.copy_from, Some(("/trunk/".to_string(), 3)));

    let a = &r4[r4.iter().position(|r| r.path == "/branches/b1/a.txt").unwrap()];
    assert_eq!(a.entry_kind, EntryKind::Dummy);
    assert_eq!(a.change_kind, ChangeKind::Added);
    // Derived from the source file's net history: 3 added, then +5/-3.
    assert_eq!(a.lines, LineDelta::new(5, 0));
    assert_eq!(a.copy_from, Some(("/trunk/a.txt".to_string(), 3)));

    let b = &r4[r4.iter().position(|r| r.path == "/branches/b1/sub/b.txt").unwrap()];
    assert_eq!(b.lines, LineDelta::new(4, 0));

    let stored = db.revision(4).await.unwrap().unwrap();
    assert_eq!(stored.counts.added, 2, "dummy file additions are counted");
}

#[tokio::test]
async fn test_directory_delete_expands_to_dummy_records() {
    let db = common::create_test_db().await;
    common::ingest(&db, common::branching_history()).await;

    let r5 = records(&db, 5).await;
    assert_eq!(r5.len(), 2);
    assert_eq!(r5[0].path, "/trunk/sub/");
    assert_eq!(r5[0].entry_kind, EntryKind::Real);
    assert_eq!(r5[0].path_kind, PathKind::Directory);

    assert_eq!(r5[1].path, "/trunk/sub/b.txt");
    assert_eq!(r5[1].entry_kind, EntryKind::Dummy);
    assert_eq!(r5[1].change_kind, ChangeKind::Deleted);
    assert_eq!(r5[1].lines, LineDelta::new(0, 4));
}

#[tokio::test]
async fn test_copy_scenario_with_sparse_revision_numbers() {
    // Revision 5 adds /trunk/a.txt (3 lines); revision 9 copies /trunk to
    // /branches/b1: exactly one Dummy Added record with lines (3, 0).
    let mut b = MemoryProvider::builder();
    b.begin(5, 5_000, "alice", "add trunk")
        .add_dir("/trunk")
        .add_file("/trunk/a.txt", "one\ntwo\nthree\n")
        .commit();
    b.begin(9, 9_000, "alice", "branch").copy_dir("/trunk", 5, "/branches/b1").commit();

    let db = common::create_test_db().await;
    let summary = common::ingest(&db, b.build()).await;
    assert_eq!(summary.revisions, 2);

    let dummies: Vec<StoredChangeRecord> = records(&db, 9)
        .await
        .into_iter()
        .filter(|r| r.entry_kind == EntryKind::Dummy)
        .collect();
    assert_eq!(dummies.len(), 1);
    assert_eq!(dummies[0].path, "/branches/b1/a.txt");
    assert_eq!(dummies[0].change_kind, ChangeKind::Added);
    assert_eq!(dummies[0].lines, LineDelta::new(3, 0));
}

#[tokio::test]
async fn test_delete_scenario_net_line_counts() {
    // Revision 12 deletes a directory holding two files with net line
    // counts 10 and 4: two Dummy Deleted records with those counts.
    let mut b = MemoryProvider::builder();
    b.begin(3, 3_000, "alice", "add files")
        .add_dir("/trunk/sub")
        .add_file("/trunk/sub/big.txt", &"x\n".repeat(12))
        .add_file("/trunk/sub/small.txt", &"y\n".repeat(4))
        .commit();
    b.begin(4, 4_000, "alice", "trim big")
        .modify_file("/trunk/sub/big.txt", &"x\n".repeat(10))
        .commit();
    b.begin(12, 12_000, "bob", "drop sub").delete_dir("/trunk/sub").commit();

    let db = common::create_test_db().await;
    common::ingest(&db, b.build()).await;

    let mut dummies: Vec<StoredChangeRecord> = records(&db, 12)
        .await
        .into_iter()
        .filter(|r| r.entry_kind == EntryKind::Dummy)
        .collect();
    dummies.sort_by(|a, b| a.path.cmp(&b.path));
    assert_eq!(dummies.len(), 2);
    assert_eq!(dummies[0].path, "/trunk/sub/big.txt");
    assert_eq!(dummies[0].lines, LineDelta::new(0, 10));
    assert_eq!(dummies[1].path, "/trunk/sub/small.txt");
    assert_eq!(dummies[1].lines, LineDelta::new(0, 4));
}

#[tokio::test]
async fn test_real_record_suppresses_dummy() {
    // A directory copy plus an explicit change to one file underneath in
    // the same revision: that path keeps exactly one record, the Real one.
    let mut b = MemoryProvider::builder();
    b.begin(1, 1_000, "alice", "add trunk")
        .add_dir("/trunk")
        .add_file("/trunk/a.txt", "one\ntwo\n")
        .add_file("/trunk/c.txt", "c\n")
        .commit();
    b.begin(2, 2_000, "alice", "branch and tweak")
        .copy_dir("/trunk", 1, "/branches/b1")
        .modify_file("/branches/b1/a.txt", "one\ntwo\nthree\n")
        .commit();

    let db = common::create_test_db().await;
    common::ingest(&db, b.build()).await;

    let r2 = records(&db, 2).await;
    let for_a: Vec<&StoredChangeRecord> =
        r2.iter().filter(|r| r.path == "/branches/b1/a.txt").collect();
    assert_eq!(for_a.len(), 1, "exactly one record per (revno, path)");
    assert_eq!(for_a[0].entry_kind, EntryKind::Real);

    // The untouched file still gets its dummy.
    let for_c: Vec<&StoredChangeRecord> =
        r2.iter().filter(|r| r.path == "/branches/b1/c.txt").collect();
    assert_eq!(for_c.len(), 1);
    assert_eq!(for_c[0].entry_kind, EntryKind::Dummy);
}

#[tokio::test]
async fn test_moved_directory_expands_both_sides() {
    // Copy to a new location plus delete of the source in one revision is
    // a move: dummy adds at the destination, dummy deletes at the source.
    let mut b = MemoryProvider::builder();
    b.begin(1, 1_000, "alice", "add")
        .add_dir("/old")
        .add_file("/old/a.txt", "x\ny\n")
        .commit();
    b.begin(2, 2_000, "alice", "move")
        .copy_dir("/old", 1, "/new")
        .delete_dir("/old")
        .commit();

    let db = common::create_test_db().await;
    common::ingest(&db, b.build()).await;

    let r2 = records(&db, 2).await;
    let dummy_adds: Vec<&StoredChangeRecord> = r2
        .iter()
        .filter(|r| r.entry_kind == EntryKind::Dummy && r.change_kind == ChangeKind::Added)
        .collect();
    assert_eq!(dummy_adds.len(), 1);
    assert_eq!(dummy_adds[0].path, "/new/a.txt");

    let dummy_deletes: Vec<&StoredChangeRecord> = r2
        .iter()
        .filter(|r| r.entry_kind == EntryKind::Dummy && r.change_kind == ChangeKind::Deleted)
        .collect();
    assert_eq!(dummy_deletes.len(), 1);
    assert_eq!(dummy_deletes[0].path, "/old/a.txt");
}

#[tokio::test]
async fn test_copy_then_prune_in_same_revision() {
    // A subtree copied and partially deleted in one revision: the pruned
    // part contributes neither dummy adds nor dummy deletes.
    use revsink::model::{ChangeEntry, ChangeRecord};
    use revsink::repository::ingest::expand_directory_ops;

    let mut b = MemoryProvider::builder();
    b.begin(1, 1_000, "alice", "add archive")
        .add_dir("/archive")
        .add_file("/archive/keep.txt", "k\nk\n")
        .add_file("/archive/drop/tmp.txt", "t\nt\nt\n")
        .commit();

    let db = common::create_test_db().await;
    common::ingest(&db, b.build()).await;

    let dir_record = |path: &str, kind, copy_from| {
        ChangeRecord::real(ChangeEntry {
            path: String::from(path),
            kind,
            path_kind: PathKind::Directory,
            copy_from,
            lines: LineDelta::default(),
            lc_updated: true,
        })
    };
    let real = vec![
        dir_record("/staging/", ChangeKind::Added, Some(("/archive/".to_string(), 1))),
        dir_record("/staging/drop/", ChangeKind::Deleted, None),
    ];

    let outcome = expand_directory_ops(&db, 2, &real).await.unwrap();
    assert_eq!(outcome.anomalies, 0);
    assert_eq!(outcome.dummies.len(), 1);
    assert_eq!(outcome.dummies[0].entry.path, "/staging/keep.txt");
    assert_eq!(outcome.dummies[0].entry.kind, ChangeKind::Added);
    assert_eq!(outcome.dummies[0].entry.lines, LineDelta::new(2, 0));
}

#[tokio::test]
async fn test_chained_directory_copies_carry_line_counts() {
    // /trunk is branched, then the branch is branched again; the second
    // copy only has dummy history to replay from.
    let mut b = MemoryProvider::builder();
    b.begin(1, 1_000, "alice", "add")
        .add_dir("/trunk")
        .add_file("/trunk/a.txt", "1\n2\n3\n4\n5\n6\n")
        .commit();
    b.begin(2, 2_000, "alice", "branch once").copy_dir("/trunk", 1, "/b1").commit();
    b.begin(3, 3_000, "alice", "branch twice").copy_dir("/b1", 2, "/b2").commit();

    let db = common::create_test_db().await;
    common::ingest(&db, b.build()).await;

    let r3 = records(&db, 3).await;
    let a = r3.iter().find(|r| r.path == "/b2/a.txt").expect("chained dummy exists");
    assert_eq!(a.entry_kind, EntryKind::Dummy);
    assert_eq!(a.lines, LineDelta::new(6, 0));
}

#[tokio::test]
async fn test_binary_files_contribute_nothing() {
    let mut b = MemoryProvider::builder();
    b.begin(1, 1_000, "alice", "add blob")
        .add_binary_file("/trunk/blob.dat", &[0, 1, 2, 10, 10, 4], "application/octet-stream")
        .commit();

    let db = common::create_test_db().await;
    common::ingest(&db, b.build()).await;

    let r1 = records(&db, 1).await;
    assert_eq!(r1[0].lines, LineDelta::default());
    assert!(r1[0].lc_updated);
}

#[tokio::test]
async fn test_idempotent_resume_adds_nothing() {
    let db = common::create_test_db().await;
    common::ingest(&db, common::branching_history()).await;
    let before = db.count_change_records().await.unwrap();

    let summary = common::ingest(&db, common::branching_history()).await;
    assert_eq!(summary.revisions, 0);
    assert_eq!(db.count_change_records().await.unwrap(), before);
    assert_eq!(summary.last_revno, 5);
}

#[tokio::test]
async fn test_resume_from_disk_continues_where_it_stopped() {
    fn first_three() -> MemoryProvider {
        let mut b = MemoryProvider::builder();
        b.begin(1, 1_000, "alice", "add")
            .add_dir("/trunk")
            .add_file("/trunk/a.txt", "a\n")
            .commit();
        b.begin(2, 2_000, "alice", "more").add_file("/trunk/b.txt", "b\n").commit();
        b.begin(3, 3_000, "bob", "edit").modify_file("/trunk/a.txt", "a\na\n").commit();
        b.build()
    }
    fn extended() -> MemoryProvider {
        let mut b = MemoryProvider::builder();
        b.begin(1, 1_000, "alice", "add")
            .add_dir("/trunk")
            .add_file("/trunk/a.txt", "a\n")
            .commit();
        b.begin(2, 2_000, "alice", "more").add_file("/trunk/b.txt", "b\n").commit();
        b.begin(3, 3_000, "bob", "edit").modify_file("/trunk/a.txt", "a\na\n").commit();
        b.begin(4, 4_000, "bob", "drop").delete_file("/trunk/b.txt").commit();
        b.begin(5, 5_000, "alice", "more").add_file("/trunk/c.txt", "c\n").commit();
        b.build()
    }

    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("history.db");
    let db_path = db_path.to_str().unwrap();

    {
        let db = Database::new(db_path).await.unwrap();
        db.init_schema().await.unwrap();
        let summary = common::ingest(&db, first_three()).await;
        assert_eq!(summary.revisions, 3);
    }

    // A fresh process against the same store picks up at revision 4.
    let db = Database::new(db_path).await.unwrap();
    assert!(!db.init_schema().await.unwrap(), "schema version unchanged");
    assert_eq!(db.last_committed_revno().await.unwrap(), 3);
    let summary = common::ingest(&db, extended()).await;
    assert_eq!(summary.revisions, 2);
    assert_eq!(summary.last_revno, 5);
}

#[tokio::test]
async fn test_dateless_revision_skipped_without_breaking_the_run() {
    let mut b = MemoryProvider::builder();
    b.begin(1, 1_000, "alice", "add").add_file("/a.txt", "a\n").commit();
    b.begin_raw(2, None, Some("ghost"), Some("no date")).add_file("/b.txt", "b\n").commit();
    b.begin(3, 3_000, "alice", "more").add_file("/c.txt", "c\n").commit();

    let db = common::create_test_db().await;
    let summary = common::ingest(&db, b.build()).await;

    assert_eq!(summary.revisions, 2);
    assert!(db.revision(2).await.unwrap().is_none());
    assert!(db.revision(3).await.unwrap().is_some());
}

/// Provider wrapper whose `log_range` fails transiently past a cutoff
/// revision, simulating a server that goes away mid-run.
struct FlakyPages {
    inner: MemoryProvider,
    fail_from: i64,
}

impl LogProvider for FlakyPages {
    fn head_revision(&self) -> ProviderResult<i64> {
        self.inner.head_revision()
    }

    fn log_range(&self, start: i64, end: i64, detailed: bool) -> ProviderResult<Vec<RawRevision>> {
        if start >= self.fail_from {
            return Err(ProviderError::Transient("connection reset by peer".into()));
        }
        self.inner.log_range(start, end, detailed)
    }

    fn diff(&self, path: &str, rev1: i64, rev2: i64) -> ProviderResult<String> {
        self.inner.diff(path, rev1, rev2)
    }

    fn path_info(&self, path: &str, revno: i64) -> ProviderResult<PathInfo> {
        self.inner.path_info(path, revno)
    }

    fn read_full_content(&self, path: &str, revno: i64) -> ProviderResult<Vec<u8>> {
        self.inner.read_full_content(path, revno)
    }

    fn content_type_property(&self, path: &str, revno: i64) -> ProviderResult<Option<String>> {
        self.inner.content_type_property(path, revno)
    }
}

#[tokio::test]
async fn test_retry_exhaustion_keeps_committed_prefix() {
    let mut b = MemoryProvider::builder();
    for revno in 1..=4 {
        b.begin(revno, revno * 1_000, "alice", "change")
            .add_file(&format!("/f{}.txt", revno), "x\n")
            .commit();
    }
    let provider = FlakyPages { inner: b.build(), fail_from: 3 };

    let db = common::create_test_db().await;
    let config = IngestConfig { page_window: 2, ..Default::default() };
    let result = Ingestor::quiet(provider, config).run(&db).await;

    assert!(result.is_err());
    // The first page committed revision by revision; the failed page
    // contributed nothing, leaving a clean resume point.
    assert_eq!(db.last_committed_revno().await.unwrap(), 2);
    assert_eq!(db.count_change_records().await.unwrap(), 2);
}

#[tokio::test]
async fn test_deferred_line_counts_backfilled_later() {
    let mut b = MemoryProvider::builder();
    b.begin(1, 1_000, "alice", "add").add_file("/trunk/a.txt", "1\n2\n3\n").commit();
    b.begin(2, 2_000, "alice", "edit").modify_file("/trunk/a.txt", "1\n2\n3\n4\n").commit();
    b.begin(3, 3_000, "bob", "drop").delete_file("/trunk/a.txt").commit();
    let provider = b.build();

    let db = common::create_test_db().await;
    let config = IngestConfig { update_line_counts: false, ..Default::default() };
    let ingestor = Ingestor::quiet(provider, config);
    ingestor.run(&db).await.unwrap();

    // Everything committed with zeroed counts and a pending flag.
    for revno in 1..=3 {
        let recs = records(&db, revno).await;
        assert_eq!(recs[0].lines, LineDelta::default());
        assert!(!recs[0].lc_updated);
    }

    let updated = ingestor.backfill_line_counts(&db).await.unwrap();
    assert_eq!(updated, 3);

    assert_eq!(records(&db, 1).await[0].lines, LineDelta::new(3, 0));
    assert_eq!(records(&db, 2).await[0].lines, LineDelta::new(4, 3));
    assert_eq!(records(&db, 3).await[0].lines, LineDelta::new(0, 4));
    assert!(records(&db, 3).await[0].lc_updated);

    // Nothing left pending; a second pass is a no-op.
    assert_eq!(ingestor.backfill_line_counts(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_line_count_series_over_branched_history() {
    let db = common::create_test_db().await;
    common::ingest(&db, common::branching_history()).await;

    let series = db.line_count_series("/trunk/").await.unwrap();
    assert_eq!(series, vec![(1_000, 3), (2_000, 5), (3_000, 9), (5_000, 5)]);
}

#[tokio::test]
async fn test_hotness_after_ingest() {
    let db = common::create_test_db().await;
    common::ingest(&db, common::branching_history()).await;
    let params = TemperatureParams::default();

    // /trunk/sub/b.txt was heated at r3 and again by its deletion dummy at
    // r5, making it the hottest file at the end of the history.
    let hot = db.top_hot_files(1, 5_000, &params).await.unwrap();
    assert_eq!(hot[0].0, "/trunk/sub/b.txt");
    let expected = 10.0 + 10.0 * (-(0.06f64 / 24.0) * (2_000.0 / 3_600.0)).exp();
    assert!((hot[0].1 - expected).abs() < 1e-9);

    let authors = db.top_hot_authors(2, 5_000, &params).await.unwrap();
    assert_eq!(authors.len(), 2);
    assert!(authors.iter().any(|(author, _)| author == "alice"));
    assert!(authors.iter().all(|(_, temperature)| *temperature >= 0.0));
}

// Shared benchmark helpers
// Functions here are used across different benchmark files
#![allow(dead_code)]

use revsink::provider::MemoryProvider;
use revsink::repository::Database;

/// Generate a synthetic history: one add-everything revision, then
/// modify-heavy revisions over a small directory fan-out.
pub fn generate_history(revisions: i64, files_per_rev: usize) -> MemoryProvider {
    let mut b = MemoryProvider::builder();
    for revno in 1..=revisions {
        b.begin(revno, revno * 600, "bench", "synthetic change");
        for i in 0..files_per_rev {
            let path = format!("/trunk/dir{}/file{}.rs", i % 5, i);
            if revno == 1 {
                b.add_file(&path, "line\nline\nline\n");
            } else {
                let body = "line\n".repeat(3 + (revno as usize % 4));
                b.modify_file(&path, &body);
            }
        }
        b.commit();
    }
    b.build()
}

/// History ending in a directory copy of every tracked file, to exercise
/// the reconciliation replay.
pub fn generate_branching_history(files: usize) -> MemoryProvider {
    let mut b = MemoryProvider::builder();
    b.begin(1, 600, "bench", "seed trunk").add_dir("/trunk");
    for i in 0..files {
        b.add_file(&format!("/trunk/dir{}/file{}.rs", i % 8, i), "a\nb\nc\nd\n");
    }
    b.commit();
    b.begin(2, 1_200, "bench", "branch").copy_dir("/trunk", 1, "/branches/b1").commit();
    b.build()
}

pub async fn setup_bench_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}

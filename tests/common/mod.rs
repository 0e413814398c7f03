// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use revsink::provider::MemoryProvider;
use revsink::repository::Database;
use revsink::repository::ingest::{IngestConfig, IngestSummary, Ingestor};

/// Create an in-memory test database
pub async fn create_test_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}

/// Ingest a provider's full history into the database, quietly.
pub async fn ingest(db: &Database, provider: MemoryProvider) -> IngestSummary {
    Ingestor::quiet(provider, IngestConfig::default()).run(db).await.unwrap()
}

/// A small history with a trunk, a branch copy and a directory delete:
///
/// - r1: add `/trunk`, `/trunk/a.txt` (3 lines)
/// - r2: modify `/trunk/a.txt` (now 5 lines)
/// - r3: add `/trunk/sub`, `/trunk/sub/b.txt` (4 lines)
/// - r4: copy `/trunk` to `/branches/b1`
/// - r5: delete `/trunk/sub`
pub fn branching_history() -> MemoryProvider {
    let mut b = MemoryProvider::builder();
    b.begin(1, 1_000, "alice", "create trunk")
        .add_dir("/trunk")
        .add_file("/trunk/a.txt", "one\ntwo\nthree\n")
        .commit();
    b.begin(2, 2_000, "bob", "extend a")
        .modify_file("/trunk/a.txt", "one\ntwo\nthree\nfour\nfive\n")
        .commit();
    b.begin(3, 3_000, "alice", "add sub")
        .add_dir("/trunk/sub")
        .add_file("/trunk/sub/b.txt", "p\nq\nr\ns\n")
        .commit();
    b.begin(4, 4_000, "alice", "branch").copy_dir("/trunk", 3, "/branches/b1").commit();
    b.begin(5, 5_000, "bob", "drop sub").delete_dir("/trunk/sub").commit();
    b.build()
}

mod database;
pub mod ingest;
mod paths;

pub use database::{Database, StoredChangeRecord, StoredRevision};
pub use paths::PathRegistry;

// Re-export the schema version for callers who need it
pub const SCHEMA_VERSION: &str = "1";

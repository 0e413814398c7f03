mod change;
mod revision;
pub mod temperature;

pub use change::{ChangeEntry, ChangeKind, ChangeRecord, EntryKind, LineDelta, PathKind};
pub use revision::{RevisionCounts, RevisionInfo};

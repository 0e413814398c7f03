//! JSON history fixtures.
//!
//! The CLI ingests an exported history document instead of talking to a
//! live server (transports are out of scope). Paths with a trailing `/`
//! denote directories; file contents are carried inline.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use super::{MemoryProvider, RawAction};

#[derive(Debug, Deserialize)]
struct HistoryDoc {
    revisions: Vec<RevisionDoc>,
}

#[derive(Debug, Deserialize)]
struct RevisionDoc {
    revno: i64,
    date: Option<i64>,
    author: Option<String>,
    message: Option<String>,
    #[serde(default)]
    changes: Vec<ChangeDoc>,
}

#[derive(Debug, Deserialize)]
struct ChangeDoc {
    path: String,
    action: String,
    #[serde(default)]
    copyfrom_path: Option<String>,
    #[serde(default)]
    copyfrom_rev: Option<i64>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    mime: Option<String>,
}

/// Load a JSON history document into a [`MemoryProvider`].
pub fn load_history(path: &Path) -> Result<MemoryProvider> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read history file {}", path.display()))?;
    let doc: HistoryDoc = serde_json::from_str(&text)
        .with_context(|| format!("invalid history document {}", path.display()))?;

    let mut builder = MemoryProvider::builder();
    for rev in &doc.revisions {
        builder.begin_raw(
            rev.revno,
            rev.date,
            rev.author.as_deref(),
            rev.message.as_deref(),
        );
        for change in &rev.changes {
            apply_change(&mut builder, rev.revno, change)?;
        }
        builder.commit();
    }
    Ok(builder.build())
}

fn apply_change(
    builder: &mut super::MemoryProviderBuilder,
    revno: i64,
    change: &ChangeDoc,
) -> Result<()> {
    let action = RawAction::from_code(&change.action)
        .with_context(|| format!("r{}: unknown action {:?}", revno, change.action))?;
    let is_dir = change.path.ends_with('/');
    let path = change.path.trim_end_matches('/');

    if is_dir {
        match action {
            RawAction::Added => match (&change.copyfrom_path, change.copyfrom_rev) {
                (Some(from), Some(from_rev)) => {
                    builder.copy_dir(from.trim_end_matches('/'), from_rev, path);
                }
                (None, None) => {
                    builder.add_dir(path);
                }
                _ => bail!("r{}: directory copy needs both copyfrom fields", revno),
            },
            RawAction::Deleted => {
                builder.delete_dir(path);
            }
            _ => bail!("r{}: unsupported directory action {:?} on {}", revno, action, path),
        }
        return Ok(());
    }

    let content = || {
        change
            .content
            .clone()
            .with_context(|| format!("r{}: {} needs file content", revno, path))
    };
    match action {
        RawAction::Added => match (&change.copyfrom_path, change.copyfrom_rev) {
            (Some(from), Some(from_rev)) => {
                builder.copy_file(from, from_rev, path);
            }
            _ => {
                if let Some(mime) = &change.mime {
                    builder.add_binary_file(path, content()?.as_bytes(), mime);
                } else {
                    builder.add_file(path, &content()?);
                }
            }
        },
        RawAction::Modified => {
            builder.modify_file(path, &content()?);
        }
        RawAction::Replaced => {
            builder.replace_file(path, &content()?);
        }
        RawAction::Deleted => {
            builder.delete_file(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LogProvider;
    use std::io::Write;

    #[test]
    fn test_load_round_trip() {
        let doc = r#"{
            "revisions": [
                {"revno": 1, "date": 1000, "author": "alice", "message": "add",
                 "changes": [
                    {"path": "/trunk/", "action": "A"},
                    {"path": "/trunk/a.txt", "action": "A", "content": "one\ntwo\n"}
                 ]},
                {"revno": 2, "date": 2000, "author": "bob", "message": "branch",
                 "changes": [
                    {"path": "/branches/b1/", "action": "A",
                     "copyfrom_path": "/trunk/", "copyfrom_rev": 1}
                 ]}
            ]
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(doc.as_bytes()).unwrap();

        let provider = load_history(file.path()).unwrap();
        assert_eq!(provider.head_revision().unwrap(), 2);
        assert_eq!(provider.read_full_content("/branches/b1/a.txt", 2).unwrap(), b"one\ntwo\n");
        let revs = provider.log_range(2, 2, true).unwrap();
        assert_eq!(revs[0].changes[0].copyfrom_rev, Some(1));
    }

    #[test]
    fn test_rejects_unknown_action() {
        let doc = r#"{"revisions": [{"revno": 1, "date": 1,
            "changes": [{"path": "/a", "action": "Q"}]}]}"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(doc.as_bytes()).unwrap();
        assert!(load_history(file.path()).is_err());
    }
}

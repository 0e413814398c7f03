//! Repository path normalization.
//!
//! Stored paths follow one canonical form: a single leading `/`, no empty or
//! `.` segments, and a trailing `/` if and only if the path is a directory.

/// Normalize a repository path to canonical form.
///
/// Collapses `//`, drops `.` segments and ensures exactly one leading `/`.
/// A trailing `/` is preserved so directory paths stay marked as such.
pub fn normalize(path: &str) -> String {
    let trailing_slash = path.len() > 1 && path.ends_with('/');
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() || trailing_slash {
        out.push('/');
    }
    out
}

/// Normalize a path and force the directory form (trailing `/`).
pub fn normalize_dir(path: &str) -> String {
    let mut out = normalize(path);
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Rewrite `path`'s `from` directory prefix to `to`.
///
/// Both prefixes must be in directory form. Returns `None` when `path` does
/// not live under `from`.
pub fn rewrite_prefix(path: &str, from: &str, to: &str) -> Option<String> {
    debug_assert!(from.ends_with('/') && to.ends_with('/'));
    path.strip_prefix(from).map(|rest| format!("{}{}", to, rest))
}

/// Lowercased file extension, without the dot.
///
/// Used by the binary-extension fast path. Extensions longer than 10
/// characters are not considered extensions, and dot-files have none.
pub fn extension(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next()?;
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && ext.len() <= 10 => {
            Some(ext.to_ascii_lowercase())
        }
        _ => None,
    }
}

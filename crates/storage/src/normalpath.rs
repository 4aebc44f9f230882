//! Normalized bucket paths: relative, forward-slashed, no `.` or `..`
//! components. The root of a bucket is `.`.

use crate::error::{Result, StorageError};

/// Clean a path lexically. Never fails; `..` that would climb above the
/// root is kept as a leading `..` component.
pub fn normalize(path: &str) -> String {
    let raw = path.replace('\\', "/");
    let absolute = raw.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Normalize and require a relative path that stays inside the bucket.
pub fn normalize_and_validate(path: &str) -> Result<String> {
    let normalized = normalize(path);
    if normalized.starts_with('/') {
        return Err(StorageError::InvalidPath {
            path: path.to_string(),
            reason: "expected a relative path",
        });
    }
    if normalized == ".." || normalized.starts_with("../") {
        return Err(StorageError::InvalidPath {
            path: path.to_string(),
            reason: "path escapes the bucket root",
        });
    }
    Ok(normalized)
}

pub fn join(base: &str, path: &str) -> String {
    if base.is_empty() || base == "." {
        return normalize(path);
    }
    normalize(&format!("{base}/{path}"))
}

/// Parent directory, `.` for top-level entries.
pub fn dir(path: &str) -> String {
    let normalized = normalize(path);
    match normalized.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => normalized[..idx].to_string(),
        None => ".".to_string(),
    }
}

pub fn base(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn ext(path: &str) -> &str {
    let name = base(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[idx..],
        _ => "",
    }
}

/// True when `child` is `parent` or lives underneath it. `.` contains everything.
pub fn equals_or_contains(parent: &str, child: &str) -> bool {
    let parent = normalize(parent);
    let child = normalize(child);
    if parent == "." || parent == child {
        return true;
    }
    child.starts_with(&parent) && child.as_bytes().get(parent.len()) == Some(&b'/')
}

/// True when `child` lives strictly underneath `parent`.
pub fn contains(parent: &str, child: &str) -> bool {
    normalize(parent) != normalize(child) && equals_or_contains(parent, child)
}

/// `child` relative to `parent`, if `parent` equals or contains it.
pub fn rel(parent: &str, child: &str) -> Option<String> {
    let parent = normalize(parent);
    let child = normalize(child);
    if !equals_or_contains(&parent, &child) {
        return None;
    }
    if parent == child {
        return Some(".".to_string());
    }
    if parent == "." {
        return Some(child);
    }
    Some(child[parent.len() + 1..].to_string())
}

/// `path` followed by each ancestor up to and including `.`.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut current = normalize(path);
    let mut out = vec![current.clone()];
    while current != "." && current != "/" && !current.starts_with("..") {
        current = dir(&current);
        out.push(current.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_cleans_components() {
        assert_eq!(normalize("./a//b/./c/"), "a/b/c");
        assert_eq!(normalize("a/b/../c"), "a/c");
        assert_eq!(normalize(""), ".");
        assert_eq!(normalize("."), ".");
        assert_eq!(normalize("../a"), "../a");
        assert_eq!(normalize("a\\b.proto"), "a/b.proto");
        assert_eq!(normalize("/x/../y"), "/y");
    }

    #[test]
    fn validate_rejects_escapes() {
        assert!(normalize_and_validate("../a").is_err());
        assert!(normalize_and_validate("/abs").is_err());
        assert_eq!(normalize_and_validate("a/./b").unwrap(), "a/b");
    }

    #[test]
    fn containment() {
        assert!(equals_or_contains(".", "a/b"));
        assert!(equals_or_contains("a", "a"));
        assert!(equals_or_contains("a", "a/b"));
        assert!(!equals_or_contains("a", "ab/c"));
        assert!(contains("a", "a/b"));
        assert!(!contains("a", "a"));
        assert_eq!(rel("a", "a/b/c.proto").as_deref(), Some("b/c.proto"));
        assert_eq!(rel(".", "a").as_deref(), Some("a"));
        assert_eq!(rel("a", "b"), None);
    }

    #[test]
    fn dir_base_ext() {
        assert_eq!(dir("a/b/c.proto"), "a/b");
        assert_eq!(dir("c.proto"), ".");
        assert_eq!(base("a/b/c.proto"), "c.proto");
        assert_eq!(ext("a/b/c.proto"), ".proto");
        assert_eq!(ext("a/.hidden"), "");
    }

    #[test]
    fn ancestors_walk_to_root() {
        assert_eq!(ancestors("a/b/c"), vec!["a/b/c", "a/b", "a", "."]);
        assert_eq!(ancestors("."), vec!["."]);
    }
}

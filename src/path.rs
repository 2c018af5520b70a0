//! Path resolution and normalization (spec.md §4.2).
//!
//! Stateless translation between two path spaces:
//!
//! - **System path** (internal storage key): `/<moduleId>/<segments…>`.
//! - **User path** (module-relative): `/<segments…>`.
//!
//! Nothing here touches storage; `resolve`/`resolve_parent` are implemented
//! on the engine, which has the index to look up.

use crate::error::{Result, VfsError};

const DISALLOWED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Collapses repeated `/`, resolves `.` and `..` (popping above root is
/// ignored), and ensures a leading `/`.
pub fn normalize(p: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in p.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    format!("/{}", out.join("/"))
}

/// Rejects relative paths, `//`, and control/disallowed characters
/// (`< > : " | ? *` and `\x00`–`\x1f`). Callers pass already-owned strings;
/// the "non-strings" half of the spec's check is enforced by the type
/// system at the API boundary (every public signature takes `&str`).
pub fn is_valid(p: &str) -> bool {
    if !p.starts_with('/') {
        return false;
    }
    if p.contains("//") {
        return false;
    }
    if p.chars().any(|c| DISALLOWED_CHARS.contains(&c) || c.is_control()) {
        return false;
    }
    true
}

fn ensure_valid(p: &str) -> Result<()> {
    if is_valid(p) {
        Ok(())
    } else {
        Err(VfsError::InvalidPath(p.to_string()))
    }
}

/// `/<moduleId>/<userPath-without-leading-slash>`, or just `/<moduleId>`
/// when `user_path` is the module root.
pub fn to_system_path(module_id: &str, user_path: &str) -> Result<String> {
    ensure_valid(user_path)?;
    let normalized = normalize(user_path);
    if normalized == "/" {
        return Ok(format!("/{module_id}"));
    }
    Ok(format!("/{module_id}{normalized}"))
}

/// Strips the `/<moduleId>` prefix from `system_path`. Warns and passes the
/// path through unchanged if it doesn't belong to `module_id` (spec.md
/// §4.2: "warn and pass through on mismatch").
pub fn to_user_path(system_path: &str, module_id: &str) -> String {
    let prefix = format!("/{module_id}");
    if let Some(rest) = system_path.strip_prefix(&prefix) {
        if rest.is_empty() {
            return "/".to_string();
        }
        if rest.starts_with('/') {
            return rest.to_string();
        }
    }
    tracing::warn!(
        system_path,
        module_id,
        "system path does not belong to module; passing through"
    );
    system_path.to_string()
}

/// Parent of `p`, or `"/"` if `p` is already at the root.
pub fn dirname(p: &str) -> String {
    let normalized = normalize(p);
    match normalized.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => normalized[..idx].to_string(),
        None => "/".to_string(),
    }
}

/// Final path segment, or `""` for the root.
pub fn basename(p: &str) -> String {
    let normalized = normalize(p);
    normalized.rsplit('/').next().unwrap_or("").to_string()
}

/// True if any segment of `p` looks like a hidden/internal path — starts
/// with `.` (the sidecar-directory convention, spec.md §9) or `__` (the
/// `__vfs_meta__`-style protected-module convention, spec.md §5). The
/// session-engine adapter uses this to filter such paths out of search
/// results and event notifications.
pub fn is_hidden_path(p: &str) -> bool {
    p.split('/')
        .any(|seg| !seg.is_empty() && (seg.starts_with('.') || seg.starts_with("__")))
}

/// Canonical join of a base path and segments.
pub fn join(base: &str, segments: &[&str]) -> String {
    let mut combined = base.to_string();
    for seg in segments {
        combined.push('/');
        combined.push_str(seg);
    }
    normalize(&combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_resolves_dots() {
        assert_eq!(normalize("/a//b/./c/../d"), "/a/b/d");
        assert_eq!(normalize("/../../a"), "/a");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn is_valid_rejects_bad_paths() {
        assert!(is_valid("/a/b"));
        assert!(!is_valid("a/b"));
        assert!(!is_valid("/a//b"));
        assert!(!is_valid("/a<b"));
        assert!(!is_valid("/a\x01b"));
    }

    #[test]
    fn system_and_user_path_round_trip() {
        let sys = to_system_path("notes", "/a/b.md").unwrap();
        assert_eq!(sys, "/notes/a/b.md");
        assert_eq!(to_user_path(&sys, "notes"), "/a/b.md");

        let root = to_system_path("notes", "/").unwrap();
        assert_eq!(root, "/notes");
        assert_eq!(to_user_path(&root, "notes"), "/");
    }

    #[test]
    fn to_user_path_passes_through_on_mismatch() {
        assert_eq!(to_user_path("/other/a.md", "notes"), "/other/a.md");
    }

    #[test]
    fn dirname_and_basename() {
        assert_eq!(dirname("/a/b/c.md"), "/a/b");
        assert_eq!(basename("/a/b/c.md"), "c.md");
        assert_eq!(dirname("/a.md"), "/");
    }

    #[test]
    fn join_builds_canonical_paths() {
        assert_eq!(join("/a", &["b", "c.md"]), "/a/b/c.md");
        assert_eq!(join("/", &["a"]), "/a");
    }

    proptest::proptest! {
        #[test]
        fn normalize_is_idempotent(p in "/[a-zA-Z0-9/._-]{0,40}") {
            let once = normalize(&p);
            let twice = normalize(&once);
            proptest::prop_assert_eq!(once, twice);
        }
    }
}

//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep the chat conductor and CLI honest:
//! - No sleep() calls in production code except cancellable waits
//! - No blocking I/O inside async functions
//!
//! Paths are resolved from the workspace root so the tests run from any
//! working directory.

use std::path::PathBuf;

/// Source directories scanned by the enforcement tests
pub const SCANNED_DIRS: &[&str] = &["conductor/core/src", "conductor/cli/src"];

/// Workspace root, two levels above this package
pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Strip visibility and qualifiers so `pub(crate) async fn x` reads as `async fn x`
pub fn fn_signature(line: &str) -> Option<&str> {
    let mut rest = line.trim();
    for prefix in ["pub(crate) ", "pub(super) ", "pub ", "const ", "unsafe "] {
        rest = rest.strip_prefix(prefix).unwrap_or(rest);
    }
    (rest.starts_with("fn ") || rest.starts_with("async fn ")).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_signature_strips_visibility() {
        assert_eq!(fn_signature("    pub fn open(path: P)"), Some("fn open(path: P)"));
        assert_eq!(
            fn_signature("pub(crate) async fn linger(&self)"),
            Some("async fn linger(&self)")
        );
        assert_eq!(fn_signature("let f = fn_ptr;"), None);
    }

    #[test]
    fn test_scanned_dirs_exist() {
        for dir in SCANNED_DIRS {
            assert!(workspace_root().join(dir).is_dir(), "missing {dir}");
        }
    }
}

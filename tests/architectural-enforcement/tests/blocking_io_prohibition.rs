//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the conductor and CLI MUST NOT use blocking I/O.
//! **Required**: `tokio::net`, `tokio::io` and `reqwest` async clients inside
//! async functions. Config loading and opening a store read the disk once
//! at startup from plain `fn`s. File store rewrites after startup run on a
//! writer task through `tokio::fs`; the plain `fn` rewrite is only used when
//! no runtime exists.

use std::fs;
use std::path::Path;

use architectural_enforcement::{fn_signature, workspace_root, SCANNED_DIRS};

/// Test that production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O calls found in async code!\n");

        for violation in &violations {
            eprintln!("  {}", violation);
        }

        eprintln!("\nFORBIDDEN blocking I/O:");
        eprintln!("  - std::fs::*, std::net::* inside async fn");
        eprintln!("  - std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("  - std::io::stdin() / std::io::stdout() inside async fn");
        eprintln!("\nREQUIRED async I/O:");
        eprintln!("  - tokio::io::stdin(), tokio::io::stdout()");
        eprintln!("  - tokio::net::TcpStream::connect().await");
        eprintln!("  - reqwest::Client::post().send().await");
        eprintln!("\nACCEPTABLE blocking I/O:");
        eprintln!("  - Non-async functions (startup loading, runtime-less store writes)");
        eprintln!("  - Test code");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all blocking I/O calls in production code
fn find_blocking_io_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for dir in SCANNED_DIRS {
        check_directory(&workspace_root().join(dir), &mut violations);
    }

    violations
}

fn check_directory(path: &Path, violations: &mut Vec<String>) {
    if !path.exists() {
        return;
    }

    for entry in walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
            check_file(entry.path(), violations);
        }
    }
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return,
    };

    let lines: Vec<&str> = content.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let line_number = idx + 1;

        // Skip comments
        let code_part = line.split("//").next().unwrap_or(line);

        if is_in_test_function(&lines, idx) {
            continue;
        }

        let mut report = |what: &str| {
            violations.push(format!(
                "{}:{} - {}: {}",
                path.display(),
                line_number,
                what,
                line.trim()
            ));
        };

        // Stdin/stdout only matter inside async code
        if (code_part.contains("std::io::stdin()") || code_part.contains("std::io::stdout()"))
            && is_in_async_function(&lines, idx)
        {
            report("Blocking stdin/stdout in async");
        }

        if code_part.contains("reqwest::blocking") {
            report("Blocking HTTP client");
        }

        if code_part.contains("std::process::Command") {
            report("Blocking process I/O");
        }

        if is_in_non_async_function(&lines, idx) {
            continue;
        }

        if code_part.contains("std::fs::") || code_part.contains("use std::fs") {
            report("Blocking file I/O");
        }

        if code_part.contains("std::net::") || code_part.contains("use std::net") {
            report("Blocking network I/O");
        }
    }
}

/// Check if line is inside a test function
fn is_in_test_function(lines: &[&str], current_idx: usize) -> bool {
    let mut found_fn_idx = None;
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if fn_signature(line).is_some() {
            found_fn_idx = Some(i);
            break;
        }

        // Stop at module boundaries
        if line.starts_with("mod ") || (line.starts_with("impl ") && line.contains('{')) {
            return false;
        }
    }

    if let Some(fn_idx) = found_fn_idx {
        for i in (0..fn_idx).rev() {
            let line = lines[i].trim();

            if line.starts_with("#[test]")
                || line.starts_with("#[tokio::test")
                || line.starts_with("#[cfg(test)]")
            {
                return true;
            }

            // Attributes and doc comments may sit between marker and fn
            if !(line.starts_with("#[") || line.starts_with("///")) {
                break;
            }
        }
    }

    false
}

/// Check if line is inside an async function
fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if let Some(signature) = fn_signature(line) {
            return signature.starts_with("async fn ");
        }

        // Stop at module/impl boundaries
        if line.starts_with("mod ") || (line.starts_with("impl ") && line.contains('{')) {
            return false;
        }
    }
    false
}

/// Check if line is inside a non-async function (acceptable for blocking I/O)
fn is_in_non_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if let Some(signature) = fn_signature(line) {
            return signature.starts_with("fn ");
        }

        // Stop at module/impl boundaries
        if line.starts_with("mod ") || (line.starts_with("impl ") && line.contains('{')) {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_io_detection() {
        let test_code = vec![
            "pub async fn bad_function() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
        ];

        assert!(
            is_in_async_function(&test_code, 1),
            "Should detect async function"
        );
        assert!(
            !is_in_non_async_function(&test_code, 1),
            "Should not be in non-async function"
        );
    }

    #[test]
    fn test_non_async_function_detection() {
        let test_code = vec![
            "impl FileStore {",
            "    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {",
            "        let raw = std::fs::read_to_string(&path)?;",
            "    }",
            "}",
        ];

        assert!(
            is_in_non_async_function(&test_code, 2),
            "Should detect non-async function"
        );
    }

    #[test]
    fn test_test_function_detection() {
        let test_code = vec![
            "#[test]",
            "fn test_something() {",
            "    let contents = std::fs::read_to_string(\"test.txt\")?;",
            "}",
        ];

        assert!(
            is_in_test_function(&test_code, 2),
            "Should detect test function"
        );
    }

    #[test]
    fn test_top_level_import_is_flagged() {
        let test_code = vec!["use std::fs;", "", "fn helper() {}"];

        assert!(!is_in_test_function(&test_code, 0));
        assert!(!is_in_non_async_function(&test_code, 0));
    }
}

//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the conductor and CLI MUST NOT call sleep
//! to wait for something to happen. Updates arrive on channels and streams.
//! **Exceptions**: a sleep raced against a cancellation token inside
//! `tokio::select!` (a timed wait that abort can cut short), exponential
//! backoff in retry logic.

use std::fs;
use std::path::Path;

use architectural_enforcement::{fn_signature, workspace_root, SCANNED_DIRS};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  {}", violation);
        }

        eprintln!("\nACCEPTABLE sleep uses:");
        eprintln!("  - tokio::time::sleep raced against token.cancelled() in tokio::select!");
        eprintln!("  - Exponential backoff in retry logic");
        eprintln!("\nFORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - Sleep in unit tests under src/ (use channels or timeouts)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all sleep() calls in production code
fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();
    let policy = SleepPolicy {
        allow_backoff: true,
        allow_cancellable_wait: true,
        allow_tests: false,
    };

    for dir in SCANNED_DIRS {
        check_directory(&workspace_root().join(dir), &mut violations, &policy);
    }

    violations
}

struct SleepPolicy {
    allow_backoff: bool,
    allow_cancellable_wait: bool,
    allow_tests: bool,
}

fn check_directory(path: &Path, violations: &mut Vec<String>, policy: &SleepPolicy) {
    if !path.exists() {
        return;
    }

    for entry in walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
            check_file(entry.path(), violations, policy);
        }
    }
}

fn check_file(path: &Path, violations: &mut Vec<String>, policy: &SleepPolicy) {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return,
    };

    let lines: Vec<&str> = content.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let line_number = idx + 1;

        // Skip comments
        let code_part = line.split("//").next().unwrap_or(line);

        if code_part.contains("::sleep(") || code_part.contains(".sleep(") {
            if policy.allow_tests && is_in_test_function(&lines, idx) {
                continue;
            }

            if policy.allow_cancellable_wait && is_cancellable_wait(&lines, idx) {
                continue;
            }

            if policy.allow_backoff && is_backoff_context(&lines, idx) {
                continue;
            }

            violations.push(format!(
                "{}:{} - {}",
                path.display(),
                line_number,
                line.trim()
            ));
        }
    }
}

/// Check if line is inside a test function
fn is_in_test_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if let Some(signature) = fn_signature(line) {
            if !signature.contains("test") {
                return false;
            }
        }

        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }

        // Stop at module boundaries
        if line.starts_with("mod ") || line.starts_with("impl ") {
            return false;
        }
    }
    false
}

/// Check if sleep is one arm of a `select!` that also waits on cancellation
fn is_cancellable_wait(lines: &[&str], current_idx: usize) -> bool {
    let start = current_idx.saturating_sub(5);
    let end = std::cmp::min(current_idx + 5, lines.len());

    let in_select = lines[start..current_idx]
        .iter()
        .any(|line| line.contains("select!"));
    let cancellable = lines[start..end]
        .iter()
        .any(|line| line.contains(".cancelled()"));

    in_select && cancellable
}

/// Check if sleep is used for exponential backoff (acceptable for retry logic)
fn is_backoff_context(lines: &[&str], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(15)..std::cmp::min(current_idx + 5, lines.len());

    let mut has_backoff_calc = false;
    let mut has_retry_context = false;

    for line in &lines[context_range] {
        let line = line.to_lowercase();

        // 2^n pattern or bit shift
        if line.contains("<<") || line.contains("pow") || line.contains("* 2") {
            has_backoff_calc = true;
        }

        if line.contains("retry")
            || line.contains("reconnect")
            || line.contains("backoff")
            || line.contains("attempt")
        {
            has_retry_context = true;
        }
    }

    has_backoff_calc && has_retry_context
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sleep_is_not_a_test() {
        let test_code = vec![
            "pub async fn wait_for_reply() {",
            "    tokio::time::sleep(Duration::from_millis(10)).await;",
            "}",
        ];

        assert!(!is_in_test_function(&test_code, 1));
        assert!(!is_cancellable_wait(&test_code, 1));
        assert!(!is_backoff_context(&test_code, 1));
    }

    #[test]
    fn test_cancellable_wait_detection() {
        let test_code = vec![
            "async fn linger(&self, token: &CancellationToken) {",
            "    tokio::select! {",
            "        () = token.cancelled() => return,",
            "        () = tokio::time::sleep(linger) => {}",
            "    }",
            "}",
        ];

        assert!(
            is_cancellable_wait(&test_code, 3),
            "Should accept a sleep raced against cancellation"
        );
    }

    #[test]
    fn test_select_without_cancellation_is_rejected() {
        let test_code = vec![
            "async fn poll(&self) {",
            "    tokio::select! {",
            "        _ = rx.recv() => {}",
            "        () = tokio::time::sleep(delay) => {}",
            "    }",
            "}",
        ];

        assert!(!is_cancellable_wait(&test_code, 3));
    }

    #[test]
    fn test_backoff_detection() {
        let test_code = vec![
            "fn reconnect() {",
            "    let delay = base_delay * (1 << attempt);",
            "    tracing::debug!(attempt, \"Retrying\");",
            "    tokio::time::sleep(Duration::from_millis(delay)).await;",
            "}",
        ];

        assert!(
            is_backoff_context(&test_code, 3),
            "Should detect exponential backoff pattern"
        );
    }

    #[test]
    fn test_test_function_detection() {
        let test_code = vec![
            "#[tokio::test]",
            "async fn test_linger() {",
            "    tokio::time::sleep(Duration::from_millis(1)).await;",
            "}",
        ];

        assert!(is_in_test_function(&test_code, 2));
    }
}

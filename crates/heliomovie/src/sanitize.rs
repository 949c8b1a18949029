//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Logs and traces may be shared with users, so server paths and job tokens
//! are reduced to harmless forms before being recorded.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Keeps the first four characters of a job token.
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    if prefix.len() < token.len() {
        format!("{}****", prefix)
    } else {
        "****".to_string()
    }
}

/// Replaces every occurrence of `root` in `message` with `<output>`.
pub fn strip_root(message: &str, root: &Path) -> String {
    let root = root.to_string_lossy();
    if root.is_empty() || root == "/" {
        return message.to_string();
    }
    message.replace(root.as_ref(), "<output>")
}

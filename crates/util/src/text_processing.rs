//! # Text Processing Utilities
//!
//! Redaction of secret-looking values in free-form text such as captured process
//! output. Command arguments are already redacted structurally by the command model;
//! these helpers cover text the program itself printed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Redacts values that look like secrets in a string.
///
/// # Example
/// ```rust
/// use forge_util::redact_sensitive;
///
/// let redacted = redact_sensitive("API_TOKEN=abc123 user=bob");
/// assert_eq!(redacted, "API_TOKEN=[REDACTED] user=bob");
///
/// let redacted = redact_sensitive("Authorization: Bearer secret123");
/// assert_eq!(redacted, "Authorization: [REDACTED]");
/// ```
pub fn redact_sensitive(input: &str) -> String {
    redact_sensitive_with(input, "[REDACTED]")
}

/// Redacts sensitive-looking values, using a custom replacement token.
///
/// Every pattern captures `(prefix)(value)` and optionally a trailing `(suffix)`; both are
/// kept around the replacement.
pub fn redact_sensitive_with(input: &str, replacement: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in redact_patterns().iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                let suffix = captures.get(3).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}{replacement}{suffix}")
            })
            .into_owned();
    }
    redacted
}

fn redact_patterns() -> &'static [Regex] {
    static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(build_redact_patterns);
    &PATTERNS
}

fn build_redact_patterns() -> Vec<Regex> {
    [
        // Authorization headers, whatever the scheme.
        r"(?i)(authorization:\s+)([^\r\n]+)",
        r"(?i)((?:^|\b)Bearer\s+)([A-Za-z0-9\-._~+/]+=*)",
        r"(?i)((?:^|\b)Basic\s+)([A-Za-z0-9+/]+=*)",
        // KEY=value style assignments of sensitive names.
        r"(?i)(\b[A-Z0-9_]*(?:KEY|TOKEN|SECRET|PASSWORD)=)([^\s]+)",
        // Password flags echoed back by tools: `-p value`, `--password value`, `--password=value`.
        r"((?:^|\s)(?:-p|--password)[\s=])([^\s]+)",
        // Credentials embedded in URLs.
        r"(?i)(\b[a-z][a-z0-9+.\-]*://)([^/\s@]+)(@)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
}

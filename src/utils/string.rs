//! String utilities
//!
//! Captured stderr from an isolated process can be arbitrarily large; these
//! helpers keep it bounded before it lands in an error message.

/// Maximum number of stderr characters carried in an error
pub const MAX_STDERR_CHARS: usize = 2000;

/// Safely truncate a string at a character boundary
///
/// # Example
/// ```
/// use tool_sandbox::utils::truncate_str;
///
/// assert_eq!(truncate_str("Hello, 世界!", 8), "Hello, 世");
/// assert_eq!(truncate_str("short", 100), "short");
/// ```
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Safely truncate a string and append a suffix if truncated
pub fn truncate_with_suffix(s: &str, max_chars: usize, suffix: &str) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}{}", truncate_str(s, max_chars), suffix)
    }
}

/// Render captured process stderr for an error message
pub fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    truncate_with_suffix(text.trim(), MAX_STDERR_CHARS, "...[truncated]")
}

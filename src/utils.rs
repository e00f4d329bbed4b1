//! Utility functions for text normalisation, escaping and truncation.
//!
//! This module provides helper functions used throughout the application:
//! - Whitespace collapsing for titles and bylines scraped from HTML
//! - Case-insensitive name matching for attribution checks
//! - HTML escaping for Telegram message bodies
//! - Character-safe string truncation for logging and message budgets

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Collapse every run of whitespace to a single space and trim the ends.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(collapse_whitespace("  Hello\n\t world "), "Hello world");
/// ```
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s.trim(), " ").into_owned()
}

/// Test whether `name` occurs in `haystack`, ignoring case and whitespace layout.
///
/// An empty name never matches.
pub fn contains_name(haystack: &str, name: &str) -> bool {
    let needle = collapse_whitespace(name).to_lowercase();
    if needle.is_empty() {
        return false;
    }
    collapse_whitespace(haystack).to_lowercase().contains(&needle)
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Shorten `s` to at most `max` characters, ending with `…` when cut.
///
/// Counts `char`s, never splitting a UTF-8 sequence.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push('…');
    out
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

//! Formatting utilities

/// Placeholder shown instead of a hidden value
pub const MASK: &str = "********";

/// Truncate a string to max characters with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

/// Collapse a multi-line value onto one line for tabular output
pub fn one_line(s: &str) -> String {
    s.replace('\r', "\\r").replace('\n', "\\n")
}

/// Value as it should appear in a listing
pub fn display_value(value: &str, show: bool) -> String {
    if show {
        one_line(value)
    } else {
        MASK.to_string()
    }
}

/// Pluralize a noun for a count ("1 secret", "3 secrets")
pub fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{} {}", n, noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

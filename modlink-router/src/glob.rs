//! Wildcard matching for routing patterns.
//!
//! Only four shapes are recognised:
//!
//! | pattern | matches |
//! |---|---|
//! | `*` | anything, including the empty string |
//! | `*mid*` | values containing `mid` |
//! | `pre*` | values starting with `pre` |
//! | `*suf` | values ending with `suf` |
//!
//! Anything else, including a `*` in the middle of a pattern, is compared
//! literally.

/// Returns true if `value` matches `pattern`.
pub fn matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let leading = pattern.starts_with('*');
    let trailing = pattern.ends_with('*');

    match (leading, trailing) {
        (true, true) => value.contains(&pattern[1..pattern.len() - 1]),
        (false, true) => value.starts_with(&pattern[..pattern.len() - 1]),
        (true, false) => value.ends_with(&pattern[1..]),
        (false, false) => pattern == value,
    }
}

/// Returns true if the pattern contains a wildcard at either end.
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.starts_with('*') || pattern.ends_with('*')
}

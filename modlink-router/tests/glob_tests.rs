use modlink_router::glob::{is_wildcard, matches};
use proptest::prelude::*;

#[test]
fn prefix_pattern() {
    assert!(matches("test_*", "test_sender"));
    assert!(matches("test_*", "test_module"));
    assert!(matches("test_*", "test_"));
    assert!(!matches("test_*", "other_sender"));
}

#[test]
fn suffix_pattern() {
    assert!(matches("*_update", "broadcast_update"));
    assert!(!matches("*_update", "update_broadcast"));
}

#[test]
fn contains_pattern() {
    assert!(matches("*sync*", "data_sync_done"));
    assert!(matches("*sync*", "sync"));
    assert!(!matches("*sync*", "snc"));
}

#[test]
fn exact_pattern() {
    assert!(matches("save", "save"));
    assert!(!matches("save", "save_all"));
    assert!(!matches("save", ""));
}

#[test]
fn star_matches_empty_string() {
    assert!(matches("*", ""));
    assert!(matches("*", "anything"));
}

#[test]
fn infix_star_is_literal() {
    assert!(!matches("a*b", "axxb"));
    assert!(matches("a*b", "a*b"));
}

#[test]
fn wildcard_detection() {
    assert!(is_wildcard("*"));
    assert!(is_wildcard("pre*"));
    assert!(is_wildcard("*suf"));
    assert!(!is_wildcard("a*b"));
    assert!(!is_wildcard("plain"));
}

proptest! {
    #[test]
    fn star_matches_everything(value in ".*") {
        prop_assert!(matches("*", &value));
    }

    #[test]
    fn literal_matches_itself(value in "[a-z_]{0,16}") {
        prop_assert!(matches(&value, &value));
    }

    #[test]
    fn prefix_matches_any_extension(prefix in "[a-z]{1,8}", rest in "[a-z_]{0,8}") {
        let pattern = format!("{prefix}*");
        let value = format!("{prefix}{rest}");
        prop_assert!(matches(&pattern, &value));
    }

    #[test]
    fn suffix_matches_any_lead(lead in "[a-z_]{0,8}", suffix in "[a-z]{1,8}") {
        let pattern = format!("*{suffix}");
        let value = format!("{lead}{suffix}");
        prop_assert!(matches(&pattern, &value));
    }
}

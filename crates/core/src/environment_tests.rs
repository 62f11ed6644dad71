// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the job environment store

use super::*;

#[test]
fn from_slice_simple_pairs() {
    let env = Environment::from_slice(&["FOO=bar", "BAZ=qux"]);
    assert_eq!(env.get("FOO"), Some("bar"));
    assert_eq!(env.get("BAZ"), Some("qux"));
    assert_eq!(env.len(), 2);
}

#[test]
fn from_slice_multi_line_value() {
    let env = Environment::from_slice(&["KEY=first", "second", "third", "NEXT=x"]);
    assert_eq!(env.get("KEY"), Some("first\nsecond\nthird"));
    assert_eq!(env.get("NEXT"), Some("x"));
}

#[test]
fn from_slice_leading_noise_is_ignored() {
    // Continuation lines before any variable has started are dropped.
    let env = Environment::from_slice(&["not a variable", "FOO=bar"]);
    assert_eq!(env.len(), 1);
    assert_eq!(env.get("FOO"), Some("bar"));
}

#[test]
fn from_slice_key_must_start_with_letter() {
    let env = Environment::from_slice(&["1BAD=x", "GOOD=y"]);
    assert!(!env.exists("1BAD"));
    assert_eq!(env.get("GOOD"), Some("y"));
}

#[test]
fn from_slice_empty_value_is_a_continuation() {
    // `EMPTY=` has no value text so it does not start a variable.
    let env = Environment::from_slice(&["A=1", "EMPTY=", "B=2"]);
    assert_eq!(env.get("A"), Some("1\nEMPTY="));
    assert_eq!(env.get("B"), Some("2"));
}

#[test]
fn from_slice_value_with_equals() {
    let env = Environment::from_slice(&["TOKEN=abc=def=123"]);
    assert_eq!(env.get("TOKEN"), Some("abc=def=123"));
}

#[test]
fn double_quoted_values_are_unquoted() {
    let env = Environment::from_slice(&[r#"MSG="hello \"world\"""#]);
    assert_eq!(env.get("MSG"), Some(r#"hello "world""#));
}

#[test]
fn quoted_newline_escapes_are_expanded() {
    let env = Environment::from_slice(&[r#"PEM="line1\nline2""#]);
    assert_eq!(env.get("PEM"), Some("line1\nline2"));
}

#[test]
fn single_quoted_values_are_unquoted() {
    let env = Environment::from_slice(&["NAME='quoted value'"]);
    assert_eq!(env.get("NAME"), Some("quoted value"));
}

#[test]
fn bare_quote_is_not_stripped() {
    let env = Environment::from_slice(&["Q=\""]);
    // A single quote character is a continuation-free value, left alone.
    assert_eq!(env.get("Q"), Some("\""));
}

#[test]
fn to_slice_is_sorted() {
    let mut env = Environment::new();
    env.set("ZULU", "1");
    env.set("ALPHA", "2");
    env.set("MIKE", "3");
    assert_eq!(env.to_slice(), vec!["ALPHA=2", "MIKE=3", "ZULU=1"]);
}

#[test]
fn round_trip_through_slice() {
    let mut env = Environment::new();
    env.set("A", "1");
    env.set("B", "with spaces");
    env.set("C", "x=y=z");
    let again = Environment::from_slice(&env.to_slice());
    assert_eq!(again, env);
}

#[test]
fn round_trip_preserves_multi_line_values() {
    let mut env = Environment::new();
    env.set("CERT", "-----BEGIN-----\nabcdef\n-----END-----");
    let again = Environment::from_slice(&env.to_slice());
    assert_eq!(again.get("CERT"), env.get("CERT"));
}

#[test]
fn diff_reports_added_and_changed() {
    let base = Environment::from_pairs([("A", "1"), ("B", "2")]);
    let mut post = base.clone();
    post.set("B", "changed");
    post.set("C", "new");

    let diff = post.diff(&base);
    assert_eq!(diff.len(), 2);
    assert_eq!(diff.get("B"), Some("changed"));
    assert_eq!(diff.get("C"), Some("new"));
    assert!(!diff.exists("A"));
}

#[test]
fn diff_ignores_removed_variables() {
    let base = Environment::from_pairs([("A", "1"), ("GONE", "x")]);
    let post = Environment::from_pairs([("A", "1")]);
    assert!(post.diff(&base).is_empty());
}

#[test]
fn diff_applied_to_base_yields_merged() {
    let base = Environment::from_pairs([("A", "1"), ("B", "2")]);
    let mut post = base.clone();
    post.set("B", "two");
    post.set("C", "3");

    let mut rebuilt = base.clone();
    rebuilt.apply(&post.diff(&base));
    assert_eq!(rebuilt, post);
}

#[test]
fn merge_other_side_wins() {
    let left = Environment::from_pairs([("A", "1"), ("B", "2")]);
    let right = Environment::from_pairs([("B", "9"), ("C", "3")]);
    let merged = left.merge(&right);
    assert_eq!(merged.get("A"), Some("1"));
    assert_eq!(merged.get("B"), Some("9"));
    assert_eq!(merged.get("C"), Some("3"));
}

#[test]
fn set_returns_previous_value() {
    let mut env = Environment::new();
    assert_eq!(env.set("K", "1"), None);
    assert_eq!(env.set("K", "2"), Some("1".to_string()));
}

#[test]
fn remove_returns_value() {
    let mut env = Environment::from_pairs([("K", "v")]);
    assert_eq!(env.remove("K"), Some("v".to_string()));
    assert!(env.is_empty());
}

#[test]
fn keys_are_trimmed() {
    let mut env = Environment::new();
    env.set("  PADDED  ", "v");
    assert_eq!(env.get("PADDED"), Some("v"));
}

#[test]
fn from_file_parses_dump() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("env");
    std::fs::write(&path, "FOO=bar\nMULTI=a\nb\nLAST=z\n").unwrap();

    let env = Environment::from_file(&path).unwrap();
    assert_eq!(env.get("FOO"), Some("bar"));
    assert_eq!(env.get("MULTI"), Some("a\nb"));
    assert_eq!(env.get("LAST"), Some("z"));
}

#[test]
fn from_file_missing_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    assert!(Environment::from_file(&dir.path().join("absent")).is_err());
}

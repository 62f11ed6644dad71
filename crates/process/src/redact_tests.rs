// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn replaces_each_occurrence() {
    let r = Redactor::new(["hunter2"]);
    assert_eq!(
        r.redact("pass hunter2 and again hunter2"),
        "pass [REDACTED] and again [REDACTED]"
    );
}

#[test]
fn untouched_lines_borrow() {
    let r = Redactor::new(["hunter2"]);
    assert!(matches!(r.redact("nothing here"), Cow::Borrowed(_)));
}

#[test]
fn matching_is_case_sensitive() {
    let r = Redactor::new(["Secret"]);
    assert_eq!(r.redact("secret stays"), "secret stays");
    assert_eq!(r.redact("Secret goes"), "[REDACTED] goes");
}

#[test]
fn empty_secrets_are_skipped() {
    let r = Redactor::new(["", "real"]);
    assert_eq!(r.redact("x real y"), "x [REDACTED] y");
    assert_eq!(r.redact(""), "");
}

#[test]
fn longer_secrets_redact_before_their_prefixes() {
    let r = Redactor::new(["abc", "abcdef"]);
    assert_eq!(r.redact("=abcdef="), "=[REDACTED]=");
}

#[test]
fn newline_secrets_never_match_single_lines() {
    let r = Redactor::new(["top\nsecret"]);
    // The scanner splits lines before redaction, so neither half matches.
    assert_eq!(r.redact("top"), "top");
    assert_eq!(r.redact("secret"), "secret");
}

#[test]
fn from_environment_matches_name_patterns() {
    let env = rig_core::Environment::from_pairs([
        ("DB_PASSWORD", "swordfish"),
        ("DEPLOY_TOKEN", "tok123"),
        ("PLAIN", "visible"),
        ("EMPTY_SECRET", ""),
    ]);
    let patterns: Vec<String> = DEFAULT_SECRET_VAR_PATTERNS
        .iter()
        .map(|s| s.to_string())
        .collect();
    let r = Redactor::from_environment(&env, &patterns);

    assert_eq!(r.redact("swordfish tok123 visible"), "[REDACTED] [REDACTED] visible");
}

#[test]
fn invalid_patterns_are_ignored() {
    let env = rig_core::Environment::from_pairs([("A_TOKEN", "val")]);
    let r = Redactor::from_environment(&env, &["[".to_string(), "*_TOKEN".to_string()]);
    assert_eq!(r.redact("val"), "[REDACTED]");
}

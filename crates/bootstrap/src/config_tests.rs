// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn base_env() -> Environment {
    Environment::from_pairs([
        ("BUILDKITE_JOB_ID", "job-1"),
        ("BUILDKITE_BUILD_PATH", "/var/lib/rigger/builds"),
        ("BUILDKITE_COMMAND", "make test"),
        ("BUILDKITE_REPO", "git@github.com:acme/widgets.git"),
        ("BUILDKITE_BRANCH", "main"),
        ("BUILDKITE_COMMIT", "abc123"),
        ("BUILDKITE_AGENT_NAME", "builder 1"),
        ("BUILDKITE_ORGANIZATION_SLUG", "acme"),
        ("BUILDKITE_PIPELINE_SLUG", "widgets"),
    ])
}

#[test]
fn reads_job_contract_variables() {
    let config = BootstrapConfig::from_environment(&base_env()).unwrap();
    assert_eq!(config.job.id, "job-1");
    assert_eq!(config.job.command, "make test");
    assert_eq!(config.job.commit, "abc123");
    assert!(config.job.command_eval);
    assert!(config.job.include_submodules);
    assert_eq!(config.git_clone_flags, "-v");
    assert_eq!(config.git_clean_flags, "-fxdq");
    assert_eq!(config.cancel_grace, Duration::from_secs(10));
}

#[test]
fn job_id_is_required() {
    let mut env = base_env();
    env.remove("BUILDKITE_JOB_ID");
    assert!(matches!(
        BootstrapConfig::from_environment(&env),
        Err(ConfigError::MissingVariable("BUILDKITE_JOB_ID"))
    ));
}

#[test]
fn build_path_is_required() {
    let mut env = base_env();
    env.remove("BUILDKITE_BUILD_PATH");
    assert!(matches!(
        BootstrapConfig::from_environment(&env),
        Err(ConfigError::MissingVariable("BUILDKITE_BUILD_PATH"))
    ));
}

#[test]
fn empty_commit_defaults_to_head() {
    let mut env = base_env();
    env.remove("BUILDKITE_COMMIT");
    let config = BootstrapConfig::from_environment(&env).unwrap();
    assert_eq!(config.job.commit, "HEAD");
}

#[test]
fn booleans_parse_and_default() {
    let mut env = base_env();
    env.set("BUILDKITE_COMMAND_EVAL", "false");
    env.set("BUILDKITE_CLEAN_CHECKOUT", "1");
    env.set("BUILDKITE_PTY", "junk");
    let config = BootstrapConfig::from_environment(&env).unwrap();
    assert!(!config.job.command_eval);
    assert!(config.job.clean_checkout);
    assert!(config.run_in_pty);
}

#[test]
fn checkout_path_sanitizes_agent_name() {
    let config = BootstrapConfig::from_environment(&base_env()).unwrap();
    assert_eq!(
        config.checkout_path(),
        PathBuf::from("/var/lib/rigger/builds/builder-1/acme/widgets")
    );
}

#[test]
fn read_from_environment_updates_mutable_subset() {
    let mut config = BootstrapConfig::from_environment(&base_env()).unwrap();
    let diff = Environment::from_pairs([
        ("BUILDKITE_ARTIFACT_PATHS", "out/**"),
        ("BUILDKITE_REFSPEC", "refs/custom"),
        ("UNRELATED", "x"),
    ]);

    let mut changed = config.read_from_environment(&diff);
    changed.sort();
    assert_eq!(changed, vec!["BUILDKITE_ARTIFACT_PATHS", "BUILDKITE_REFSPEC"]);
    assert_eq!(config.job.artifact_paths, "out/**");
    assert_eq!(config.job.refspec, "refs/custom");
}

#[test]
fn read_from_environment_ignores_unchanged_values() {
    let mut config = BootstrapConfig::from_environment(&base_env()).unwrap();
    config.job.artifact_paths = "out/**".to_string();
    let diff = Environment::from_pairs([("BUILDKITE_ARTIFACT_PATHS", "out/**")]);
    assert!(config.read_from_environment(&diff).is_empty());
}

#[test]
fn redacted_vars_default_and_override() {
    let config = BootstrapConfig::from_environment(&base_env()).unwrap();
    assert!(config
        .redacted_vars
        .contains(&"*_PASSWORD".to_string()));

    let mut env = base_env();
    env.set("BUILDKITE_REDACTED_VARS", "MY_KEY, OTHER_*");
    let config = BootstrapConfig::from_environment(&env).unwrap();
    assert_eq!(config.redacted_vars, vec!["MY_KEY", "OTHER_*"]);
}

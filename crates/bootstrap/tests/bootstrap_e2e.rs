// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end job executions against a recording control plane.

#![cfg(unix)]
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rig_api::{ApiCall, RecordingControlPlane};
use rig_bootstrap::{Bootstrap, BootstrapConfig};
use rig_core::Environment;

struct Fixture {
    dir: tempfile::TempDir,
    api: Arc<RecordingControlPlane>,
    env_pairs: Vec<(String, String)>,
}

impl Fixture {
    fn new(command: &str) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("hooks")).unwrap();
        std::fs::create_dir_all(dir.path().join("plugins")).unwrap();

        let pairs = vec![
            ("BUILDKITE_JOB_ID".to_string(), "job-1".to_string()),
            (
                "BUILDKITE_BUILD_PATH".to_string(),
                dir.path().join("builds").display().to_string(),
            ),
            (
                "BUILDKITE_HOOKS_PATH".to_string(),
                dir.path().join("hooks").display().to_string(),
            ),
            (
                "BUILDKITE_PLUGINS_PATH".to_string(),
                dir.path().join("plugins").display().to_string(),
            ),
            ("BUILDKITE_COMMAND".to_string(), command.to_string()),
            ("BUILDKITE_ORGANIZATION_SLUG".to_string(), "acme".to_string()),
            ("BUILDKITE_PIPELINE_SLUG".to_string(), "widgets".to_string()),
            ("BUILDKITE_PTY".to_string(), "false".to_string()),
            ("BUILDKITE_GIT_SUBMODULES".to_string(), "false".to_string()),
            (
                "BUILDKITE_SSH_FINGERPRINT_VERIFICATION".to_string(),
                "false".to_string(),
            ),
        ];

        let fixture = Self {
            dir,
            api: Arc::new(RecordingControlPlane::new()),
            env_pairs: pairs,
        };
        // Without a repository every scenario supplies a no-op custom
        // checkout unless it builds a fixture repo itself.
        fixture.write_hook("checkout", "true\n");
        fixture
    }

    fn set(&mut self, key: &str, value: &str) {
        self.env_pairs.push((key.to_string(), value.to_string()));
    }

    fn write_hook(&self, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = self.dir.path().join("hooks").join(name);
        std::fs::write(&path, format!("#!/bin/bash\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn bootstrap(&self) -> Bootstrap {
        let job_env = Environment::from_pairs(
            self.env_pairs
                .iter()
                .map(|(k, v)| (k.as_str(), v.clone())),
        );
        let config = BootstrapConfig::from_environment(&job_env).unwrap();

        let mut base_env = job_env;
        base_env.set("PATH", std::env::var("PATH").unwrap_or_default());
        if let Ok(home) = std::env::var("HOME") {
            base_env.set("HOME", home);
        }
        if let Ok(tmpdir) = std::env::var("TMPDIR") {
            base_env.set("TMPDIR", tmpdir);
        }

        Bootstrap::new(config, self.api.clone(), base_env)
    }
}

#[tokio::test]
async fn happy_path_command() {
    let fixture = Fixture::new("echo hello");
    let mut bootstrap = fixture.bootstrap();

    let exit = bootstrap.run().await;

    assert_eq!(exit, 0);
    assert!(fixture.api.log().contains("hello"));
    // No artifact traffic for a job without artifact paths.
    assert!(!fixture
        .api
        .calls()
        .iter()
        .any(|c| matches!(c, ApiCall::CreateArtifacts { .. })));
}

#[tokio::test]
async fn failing_command_still_runs_post_command_and_artifacts() {
    let mut fixture = Fixture::new("exit 3");
    let marker = fixture.scratch("post-command-saw");
    fixture.write_hook(
        "post-command",
        &format!(
            "echo \"$BUILDKITE_COMMAND_EXIT_STATUS\" > \"{}\"\n",
            marker.display()
        ),
    );
    fixture.set("BUILDKITE_ARTIFACT_PATHS", "");

    let mut bootstrap = fixture.bootstrap();
    let exit = bootstrap.run().await;

    assert_eq!(exit, 3);
    let recorded = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(recorded.trim(), "3");
}

#[tokio::test]
async fn hook_environment_changes_flow_to_later_phases() {
    let fixture = Fixture::new("echo greeting=$GREETING");
    fixture.write_hook("environment", "export GREETING=hi\n");

    let mut bootstrap = fixture.bootstrap();
    let exit = bootstrap.run().await;

    assert_eq!(exit, 0);
    assert!(fixture.api.log().contains("greeting=hi"));
}

#[tokio::test]
async fn hook_exports_are_visible_to_the_next_hook() {
    let fixture = Fixture::new("true");
    let marker = fixture.scratch("pre-exit-saw");
    fixture.write_hook("post-command", "export HOOK=ran\n");
    fixture.write_hook(
        "pre-exit",
        &format!("echo \"hook=$HOOK last=$BUILDKITE_LAST_HOOK_EXIT_STATUS\" > \"{}\"\n", marker.display()),
    );

    let mut bootstrap = fixture.bootstrap();
    assert_eq!(bootstrap.run().await, 0);

    let recorded = std::fs::read_to_string(&marker).unwrap();
    assert!(recorded.contains("hook=ran"));
    assert!(recorded.contains("last=0"));
}

#[tokio::test]
async fn teardown_runs_even_when_setup_fails() {
    let fixture = Fixture::new("echo never-runs");
    let marker = fixture.scratch("pre-exit-ran");
    fixture.write_hook("environment", "exit 1\n");
    fixture.write_hook("pre-exit", &format!("touch \"{}\"\n", marker.display()));

    let mut bootstrap = fixture.bootstrap();
    let exit = bootstrap.run().await;

    assert_eq!(exit, 1);
    assert!(marker.exists(), "pre-exit hook must run after setup failure");
    assert!(!fixture.api.log().contains("never-runs"));
}

#[tokio::test]
async fn artifact_globs_upload_deduplicated_files() {
    let mut fixture = Fixture::new(
        "mkdir -p out/sub\necho alpha > out/app.log\necho beta > out/sub/x.log",
    );
    fixture.set("BUILDKITE_ARTIFACT_PATHS", "./out/**/*.log;./out/app.log");

    let mut bootstrap = fixture.bootstrap();
    let exit = bootstrap.run().await;

    assert_eq!(exit, 0);
    assert_eq!(fixture.api.created_artifact_count(), 2);
    let states = fixture.api.artifact_states();
    assert_eq!(states.len(), 2);
    assert!(states.values().all(|s| s == "finished"));
}

#[tokio::test]
async fn glob_matching_nothing_uploads_nothing() {
    let mut fixture = Fixture::new("true");
    fixture.set("BUILDKITE_ARTIFACT_PATHS", "missing/**/*.bin");

    let mut bootstrap = fixture.bootstrap();
    let exit = bootstrap.run().await;

    assert_eq!(exit, 0);
    assert_eq!(fixture.api.created_artifact_count(), 0);
}

#[tokio::test]
async fn header_times_are_streamed_in_order() {
    let fixture = Fixture::new("echo '--- Step A'\necho '--- Step B'");

    let mut bootstrap = fixture.bootstrap();
    assert_eq!(bootstrap.run().await, 0);

    let uploads = fixture.api.header_times();
    assert!(!uploads.is_empty());

    // Indices across batches are consecutive from zero; timestamps are
    // non-decreasing end to end.
    let mut indices = Vec::new();
    let mut times = Vec::new();
    for batch in &uploads {
        for (index, time) in batch {
            indices.push(*index);
            times.push(time.clone());
        }
    }
    let expected: Vec<usize> = (0..indices.len()).collect();
    assert_eq!(indices, expected);
    for pair in times.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
    // The command's own headers are among them.
    assert!(fixture.api.log().contains("--- Step A"));
    assert!(fixture.api.log().contains("--- Step B"));
}

#[tokio::test]
async fn secrets_are_redacted_from_the_log() {
    let mut fixture = Fixture::new("echo leaking $DEPLOY_TOKEN");
    fixture.set("DEPLOY_TOKEN", "tok-12345");

    let mut bootstrap = fixture.bootstrap();
    assert_eq!(bootstrap.run().await, 0);

    let log = fixture.api.log();
    assert!(log.contains("leaking [REDACTED]"));
    assert!(!log.contains("tok-12345"));
}

#[tokio::test]
async fn interrupt_during_command_signals_then_finishes_the_job() {
    let mut fixture = Fixture::new("sleep 30");
    let post_marker = fixture.scratch("post-command-ran");
    let exit_marker = fixture.scratch("pre-exit-ran");
    fixture.write_hook("post-command", &format!("touch \"{}\"\n", post_marker.display()));
    fixture.write_hook("pre-exit", &format!("touch \"{}\"\n", exit_marker.display()));
    fixture.set("BUILDKITE_CANCEL_GRACE_PERIOD", "5");

    let mut bootstrap = fixture.bootstrap();
    let cancel = bootstrap.cancel_handle();

    let job = tokio::spawn(async move { bootstrap.run().await });
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    cancel.interrupt();

    let exit = tokio::time::timeout(std::time::Duration::from_secs(20), job)
        .await
        .expect("job must finish after interrupt")
        .unwrap();

    // Signal-derived exit code (SIGINT).
    assert!(exit == 130 || exit == 128 + 2, "unexpected exit {}", exit);
    assert!(post_marker.exists(), "post-command must run after cancellation");
    assert!(exit_marker.exists(), "pre-exit must run after cancellation");
}

#[tokio::test]
async fn plugin_configuration_reaches_the_command() {
    let mut fixture = Fixture::new(
        "echo run=$BUILDKITE_PLUGIN_WIDGET_RUN env0=$BUILDKITE_PLUGIN_WIDGET_ENV_0 env1=$BUILDKITE_PLUGIN_WIDGET_ENV_1",
    );

    let repo = plugin_fixture_repo(fixture.dir.path());
    fixture.set(
        "BUILDKITE_PLUGINS",
        &format!(
            r#"[{{"file://{}#v1": {{"run": "app", "env": ["A=1", "B=2"]}}}}]"#,
            repo.display()
        ),
    );

    let mut bootstrap = fixture.bootstrap();
    let exit = bootstrap.run().await;
    assert_eq!(exit, 0);

    let log = fixture.api.log();
    assert!(log.contains("run=app"), "log was: {}", log);
    assert!(log.contains("env0=A=1"));
    assert!(log.contains("env1=B=2"));

    // The plugin was materialized into the cache at the requested ref.
    let plugin = rig_core::Plugin::parse(&format!("file://{}#v1", repo.display())).unwrap();
    let cache = fixture.dir.path().join("plugins").join(plugin.identifier());
    assert!(cache.join(".git").exists());

    // Materialization is idempotent: the environment hook observed one
    // clone, and a rerun of the phase would find the directory present.
    assert!(cache.join("hooks/environment").exists());
}

/// A plugin repository with an environment hook and a `v1` tag.
fn plugin_fixture_repo(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let repo = dir.join("widget");
    std::fs::create_dir_all(repo.join("hooks")).unwrap();
    std::fs::write(repo.join("hooks/environment"), "#!/bin/bash\ntrue\n").unwrap();
    std::fs::set_permissions(
        repo.join("hooks/environment"),
        std::fs::Permissions::from_mode(0o755),
    )
    .unwrap();

    let git = |args: &[&str]| {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(&repo)
            .env("GIT_AUTHOR_NAME", "test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?}: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    };
    git(&["init", "--quiet", "--initial-branch=main"]);
    git(&["add", "."]);
    git(&["commit", "--quiet", "-m", "plugin"]);
    git(&["tag", "v1"]);

    repo
}

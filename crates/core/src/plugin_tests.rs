// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for plugin reference parsing and configuration flattening

use super::*;
use serde_json::json;

#[test]
fn parse_full_url() {
    let p = Plugin::parse("https://github.com/acme/widget#v2.0").unwrap();
    assert_eq!(p.scheme, "https");
    assert_eq!(p.location, "github.com/acme/widget");
    assert_eq!(p.version.as_deref(), Some("v2.0"));
    assert_eq!(p.authentication, None);
}

#[test]
fn parse_owner_repo_shorthand() {
    let p = Plugin::parse("acme/widget").unwrap();
    assert_eq!(p.scheme, "https");
    assert_eq!(p.location, "github.com/acme/widget");
    assert_eq!(p.version, None);
}

#[test]
fn parse_bare_name_resolves_to_plugin_org() {
    let p = Plugin::parse("docker-compose#v1").unwrap();
    assert_eq!(p.location, "github.com/buildkite-plugins/docker-compose");
    assert_eq!(p.version.as_deref(), Some("v1"));
}

#[test]
fn parse_domain_without_scheme() {
    let p = Plugin::parse("gitlab.com/acme/widget").unwrap();
    assert_eq!(p.scheme, "https");
    assert_eq!(p.location, "gitlab.com/acme/widget");
}

#[test]
fn parse_ssh_url_with_user() {
    let p = Plugin::parse("ssh://git@github.com/acme/widget#main").unwrap();
    assert_eq!(p.scheme, "ssh");
    assert_eq!(p.authentication.as_deref(), Some("git"));
    assert_eq!(p.location, "github.com/acme/widget");
}

#[test]
fn parse_local_path() {
    let p = Plugin::parse("/srv/plugins/widget").unwrap();
    assert_eq!(p.scheme, "file");
    assert_eq!(p.location, "/srv/plugins/widget");
}

#[test]
fn parse_rejects_double_hash() {
    assert!(matches!(
        Plugin::parse("widget#v1#v2"),
        Err(PluginError::TooManyHashes(_))
    ));
}

#[test]
fn parse_rejects_empty() {
    assert!(matches!(
        Plugin::parse("   "),
        Err(PluginError::MissingLocation)
    ));
}

#[test]
fn parse_stringify_round_trip_for_well_formed_urls() {
    for url in [
        "https://github.com/acme/widget#v2.0",
        "ssh://git@github.com/acme/widget#main",
        "https://gitlab.com/acme/widget",
    ] {
        let p = Plugin::parse(url).unwrap();
        assert_eq!(p.to_string(), url);
    }
}

#[test]
fn name_strips_plugin_suffixes() {
    let p = Plugin::parse("github.com/acme/widget-buildkite-plugin").unwrap();
    assert_eq!(p.name(), "widget");
}

#[test]
fn identifier_is_filesystem_safe_and_stable() {
    let p = Plugin::parse("docker-compose#v1").unwrap();
    assert_eq!(p.identifier(), "docker-compose-v1");

    let p = Plugin::parse("https://github.com/acme/widget#v2.0").unwrap();
    assert_eq!(p.identifier(), "https-github-com-acme-widget-v2-0");
}

#[test]
fn repository_for_known_hosts() {
    let p = Plugin::parse("github.com/acme/widget/subdir#v1").unwrap();
    assert_eq!(p.repository().unwrap(), "https://github.com/acme/widget");
    assert_eq!(p.repository_subdirectory().unwrap(), "subdir");
}

#[test]
fn repository_stops_at_dot_git_on_unknown_hosts() {
    let p = Plugin::parse("git.example.com/deep/repo.git/nested/dir").unwrap();
    assert_eq!(
        p.repository().unwrap(),
        "https://git.example.com/deep/repo.git"
    );
    assert_eq!(p.repository_subdirectory().unwrap(), "nested/dir");
}

#[test]
fn repository_keeps_local_paths_bare() {
    let p = Plugin::parse("/srv/plugins/widget").unwrap();
    assert_eq!(p.repository().unwrap(), "/srv/plugins/widget");
}

#[test]
fn repository_attaches_auth() {
    let p = Plugin::parse("ssh://git@github.com/acme/widget").unwrap();
    assert_eq!(p.repository().unwrap(), "ssh://git@github.com/acme/widget");
}

#[test]
fn from_json_strings_and_config_maps() {
    let plugins = Plugin::from_json(
        r#"[
            "docker-compose#v1",
            {"acme/widget#v3": {"run": "app"}}
        ]"#,
    )
    .unwrap();
    assert_eq!(plugins.len(), 2);
    assert_eq!(plugins[0].version.as_deref(), Some("v1"));
    assert_eq!(plugins[1].configuration["run"], json!("app"));
}

#[test]
fn from_json_rejects_non_array() {
    assert!(matches!(
        Plugin::from_json(r#"{"not": "an array"}"#),
        Err(PluginError::NotAnArray)
    ));
}

#[test]
fn from_json_rejects_scalar_config() {
    assert!(matches!(
        Plugin::from_json(r#"[{"widget": "nope"}]"#),
        Err(PluginError::ConfigurationNotAHash(_))
    ));
}

#[test]
fn configuration_flattens_to_env() {
    let mut config = serde_json::Map::new();
    config.insert("run".to_string(), json!("app"));
    config.insert("env".to_string(), json!(["A=1", "B=2"]));
    config.insert("debug".to_string(), json!(true));
    config.insert("retries".to_string(), json!(3));

    let p = Plugin::parse_with_config("docker-compose#v1", config).unwrap();
    let env = p.configuration_to_environment();

    assert_eq!(env.get("BUILDKITE_PLUGIN_DOCKER_COMPOSE_RUN"), Some("app"));
    assert_eq!(env.get("BUILDKITE_PLUGIN_DOCKER_COMPOSE_ENV_0"), Some("A=1"));
    assert_eq!(env.get("BUILDKITE_PLUGIN_DOCKER_COMPOSE_ENV_1"), Some("B=2"));
    assert_eq!(
        env.get("BUILDKITE_PLUGIN_DOCKER_COMPOSE_DEBUG"),
        Some("true")
    );
    assert_eq!(env.get("BUILDKITE_PLUGIN_DOCKER_COMPOSE_RETRIES"), Some("3"));
}

#[test]
fn configuration_collapses_odd_key_characters() {
    let mut config = serde_json::Map::new();
    config.insert("weird  key--name".to_string(), json!("v"));

    let p = Plugin::parse_with_config("acme/widget", config).unwrap();
    let env = p.configuration_to_environment();
    assert_eq!(env.get("BUILDKITE_PLUGIN_WIDGET_WEIRD_KEY_NAME"), Some("v"));
}

#[test]
fn merge_prefers_agent_declared() {
    let job = vec![
        Plugin::parse("acme/widget#v1").unwrap(),
        Plugin::parse("acme/other#v1").unwrap(),
    ];
    let agent = vec![Plugin::parse("acme/widget#v9").unwrap()];

    let merged = merge_plugins(job, agent);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].version.as_deref(), Some("v9"));
    assert_eq!(merged[1].location, "github.com/acme/other");
}

//! Configuration layering and engines built from configuration files

use std::fs;
use std::path::Path;

use cmdb_core::{ConfigResolver, ConstructKind, Error, SyncEngine, SyncOptions};
use cmdb_test_utils::{MockGateway, host, store};
use pretty_assertions::assert_eq;
use tempfile::{TempDir, tempdir};

const MAIN: &str = r#"
folder_target = "folders"

[account]
id = "cmk-prod"
name = "Checkmk Production"

[[targets]]
name = "folders"
kind = "named"

[[targets]]
name = "host_groups"
kind = "named"

[rules]
actions = "rules/actions.toml"
constructs = "rules/constructs.yaml"
"#;

const ACTIONS: &str = r#"
[[rule]]
name = "by site"
condition_mode = "anyway"
outcomes = [{ type = "value_as_folder", param = "site" }]
"#;

const CONSTRUCTS: &str = r#"
- name: os groups
  condition_mode: anyway
  outcomes:
    - type: group
      target: host_groups
      name: "{{ os }}"
      title: "{{ os | upper }} hosts"
"#;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Config directory with a main file, rule files and an empty global dir
fn workspace() -> (TempDir, TempDir) {
    let dir = tempdir().unwrap();
    write(&dir.path().join("sync.toml"), MAIN);
    write(&dir.path().join("rules/actions.toml"), ACTIONS);
    write(&dir.path().join("rules/constructs.yaml"), CONSTRUCTS);
    (dir, tempdir().unwrap())
}

#[test]
fn test_layers_override_in_order() {
    let (dir, global) = workspace();
    write(
        &global.path().join("config.toml"),
        r#"
[account]
id = "global"
name = "Global Default"

[host_policy]
lowercase_hostnames = true
"#,
    );
    write(
        &dir.path().join("sync.local.toml"),
        r#"
[account]
name = "Local Name"
"#,
    );

    let config = ConfigResolver::with_global_config_dir(
        dir.path().join("sync.toml"),
        global.path().to_path_buf(),
    )
    .resolve()
    .unwrap();

    assert_eq!(config.account.id, "cmk-prod");
    assert_eq!(config.account.name, "Local Name");
    assert!(config.host_policy.lowercase_hostnames);
    assert_eq!(config.targets.len(), 2);
    assert_eq!(config.targets[1].kind, ConstructKind::Named);
}

#[test]
fn test_rule_paths_resolve_next_to_config() {
    let (dir, global) = workspace();
    let config = ConfigResolver::with_global_config_dir(
        dir.path().join("sync.toml"),
        global.path().to_path_buf(),
    )
    .resolve()
    .unwrap();

    assert_eq!(
        config.rules.actions.as_deref(),
        Some(dir.path().join("rules/actions.toml").as_path())
    );
    assert!(config.rules.constructs.unwrap().is_file());
}

#[test]
fn test_engine_from_config_file_syncs() {
    let (dir, _global) = workspace();
    let state = tempdir().unwrap();
    write(
        &dir.path().join("sync.local.toml"),
        &format!("state_dir = {:?}\n", state.path().display().to_string()),
    );

    let engine = SyncEngine::from_config_file(dir.path().join("sync.toml")).unwrap();
    let gateway = MockGateway::new();
    let mut hosts = store([
        host("web1", &[("site", "Berlin"), ("os", "linux")]),
        host("web2", &[("site", "Paris"), ("os", "linux")]),
    ]);

    let report = engine
        .sync(&mut hosts, &gateway, &SyncOptions::default())
        .unwrap();

    assert!(report.is_success());
    assert_eq!(gateway.remote_ids("folders"), vec!["/berlin", "/paris"]);
    assert_eq!(gateway.records("host_groups")[0].title.as_deref(), Some("LINUX_hosts"));
    assert!(
        state
            .path()
            .join("snapshots/cmk-prod/host_groups.json")
            .is_file()
    );
}

#[test]
fn test_json_and_yaml_configs() {
    let dir = tempdir().unwrap();
    write(
        &dir.path().join("sync.json"),
        r#"{
            "account": { "id": "a", "name": "A" },
            "targets": [{ "name": "rules", "kind": "content_addressed" }]
        }"#,
    );
    write(
        &dir.path().join("sync.local.yaml"),
        "account:\n  name: ignored, wrong extension\n",
    );
    write(
        &dir.path().join("other.yml"),
        "account:\n  id: b\n  name: B\ntargets: []\n",
    );

    let json = ConfigResolver::with_global_config_dir(dir.path().join("sync.json"), dir.path().join("none"))
        .resolve()
        .unwrap();
    assert_eq!(json.account.name, "A");
    assert_eq!(json.targets[0].kind, ConstructKind::ContentAddressed);

    let yaml = ConfigResolver::with_global_config_dir(dir.path().join("other.yml"), dir.path().join("none"))
        .resolve()
        .unwrap();
    assert_eq!(yaml.account.id, "b");
}

#[test]
fn test_missing_rule_file_fails_engine_construction() {
    let (dir, _global) = workspace();
    fs::remove_file(dir.path().join("rules/constructs.yaml")).unwrap();

    assert!(SyncEngine::from_config_file(dir.path().join("sync.toml")).is_err());
}

#[test]
fn test_missing_and_invalid_configs() {
    let dir = tempdir().unwrap();
    let missing = ConfigResolver::new(dir.path().join("nope.toml")).resolve();
    assert!(matches!(missing, Err(Error::ConfigNotFound { .. })));

    write(&dir.path().join("bad.toml"), "[account]\nid = \"\"\nname = \"x\"\n");
    let invalid = ConfigResolver::with_global_config_dir(dir.path().join("bad.toml"), dir.path().join("none"))
        .resolve();
    assert!(matches!(invalid, Err(Error::InvalidConfig { .. })));
}

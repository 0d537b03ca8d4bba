//! End-to-end sync runs: hosts -> rules -> desired state -> targets
//!
//! Each scenario uses a temporary state directory, so snapshots and run
//! locks are real files.

use cmdb_core::{
    ConstructKind, ConstructOutcome, GatewayError, PassStatus, RemoteRecord, RunLock, SyncEngine,
    SyncOptions,
};
use cmdb_hosts::{HostPolicy, HostStore, MemoryHostStore};
use cmdb_rules::{ActionOutcome, RuleSet};
use cmdb_test_utils::{MockGateway, TestState, host, store};
use pretty_assertions::assert_eq;
use serde_json::json;

fn state() -> TestState {
    TestState::new()
        .with_target("folders", ConstructKind::Named)
        .with_target("host_groups", ConstructKind::Named)
        .with_target("tag_groups", ConstructKind::Keyed)
        .with_target("rules", ConstructKind::ContentAddressed)
        .with_folder_target("folders")
}

fn action_rules() -> RuleSet<ActionOutcome> {
    RuleSet::from_values(vec![
        json!({
            "name": "lab hosts",
            "conditions": [{ "match_type": "host", "hostname": "lab", "hostname_match": "startswith" }],
            "outcomes": [{ "type": "ignore" }],
            "last_match": true,
            "sort_key": 0,
        }),
        json!({
            "name": "production",
            "condition_mode": "any",
            "conditions": [{ "match_type": "tag", "tag": "env", "value": "prod", "value_match": "in" }],
            "outcomes": [{ "type": "source_folder", "param": "/prod" }],
            "sort_key": 10,
        }),
        json!({
            "name": "by role",
            "condition_mode": "anyway",
            "outcomes": [{ "type": "value_as_folder", "param": "role" }],
            "sort_key": 20,
        }),
    ])
}

fn construct_rules() -> RuleSet<ConstructOutcome> {
    RuleSet::from_values(vec![
        json!({
            "name": "role groups",
            "condition_mode": "anyway",
            "outcomes": [
                { "type": "group", "target": "host_groups", "name": "{{ role }}" },
                {
                    "type": "tag_group",
                    "target": "tag_groups",
                    "group_id": "env",
                    "title": "Environment",
                    "tag_id": "{{ env }}",
                    "tag_title": "{{ env | capitalize }}",
                },
            ],
        }),
        json!({
            "name": "web filesystem levels",
            "conditions": [{ "match_type": "tag", "tag": "role", "value": "web" }],
            "outcomes": [{
                "type": "rule",
                "target": "rules",
                "value": "{'levels': (85.0, 95.0)}",
                "condition_host": "{{ HOSTNAME }}",
            }],
        }),
    ])
}

fn engine(state: &TestState) -> SyncEngine {
    SyncEngine::new(state.config().clone())
        .with_action_rules(action_rules())
        .with_construct_rules(construct_rules())
}

fn hosts() -> MemoryHostStore {
    store([
        host("web1", &[("role", "web"), ("env", "production")]),
        host("db1", &[("role", "db"), ("env", "staging")]),
        host("lab7", &[("role", "web"), ("env", "lab")]),
    ])
}

#[test]
fn test_first_run_creates_everything_and_second_run_is_a_noop() {
    let state = state();
    let engine = engine(&state);
    let gateway = MockGateway::new();
    let mut hosts = hosts();

    let first = engine
        .sync(&mut hosts, &gateway, &SyncOptions::default())
        .unwrap();

    assert!(first.is_success());
    assert_eq!(first.skipped_hosts, vec!["lab7".to_string()]);
    assert_eq!(
        gateway.remote_ids("folders"),
        vec!["/db", "/prod", "/prod/web"]
    );
    assert_eq!(gateway.remote_ids("host_groups"), vec!["db", "web"]);
    assert_eq!(gateway.remote_ids("tag_groups"), vec!["env"]);
    assert_eq!(gateway.records("rules").len(), 1);
    for target in ["folders", "host_groups", "tag_groups", "rules"] {
        assert!(state.snapshot_path(target).is_file(), "no snapshot for {target}");
    }

    gateway.clear_calls();
    let second = engine
        .sync(&mut hosts, &gateway, &SyncOptions::default())
        .unwrap();
    assert!(second.passes.iter().all(|p| p.is_noop()));
    assert!(gateway.mutating_calls().is_empty());
}

#[test]
fn test_tag_group_aggregates_hosts() {
    let state = state();
    let gateway = MockGateway::new();
    engine(&state)
        .sync(&mut hosts(), &gateway, &SyncOptions::default())
        .unwrap();

    let records = gateway.records("tag_groups");
    assert_eq!(
        records[0].payload,
        json!({
            "id": "env",
            "title": "Environment",
            "tags": [
                { "ident": "production", "title": "Production" },
                { "ident": "staging", "title": "Staging" },
            ],
        })
    );
}

#[test]
fn test_tag_values_are_memoised_in_the_host_store() {
    let state = state();
    let gateway = MockGateway::new();
    let mut hosts = hosts();
    engine(&state)
        .sync(&mut hosts, &gateway, &SyncOptions::default())
        .unwrap();

    let web1 = hosts.get("web1").unwrap().unwrap();
    assert!(web1.cache().contains("tag_group:env"));
    // Ignored hosts never reach construct rules
    let lab7 = hosts.get("lab7").unwrap().unwrap();
    assert!(lab7.cache().is_empty());
}

#[test]
fn test_host_leaving_the_source_removes_its_constructs() {
    let state = state();
    let engine = engine(&state);
    let gateway = MockGateway::new();
    let mut hosts = hosts();
    engine
        .sync(&mut hosts, &gateway, &SyncOptions::default())
        .unwrap();

    let mut db1 = hosts.get("db1").unwrap().unwrap();
    db1.set_source_not_found(&HostPolicy::default());
    hosts.save(&db1).unwrap();

    let report = engine
        .sync(&mut hosts, &gateway, &SyncOptions::default())
        .unwrap();

    assert_eq!(report.pass("host_groups").unwrap().deleted, vec!["db"]);
    assert_eq!(report.pass("folders").unwrap().deleted, vec!["/db"]);
    assert_eq!(gateway.remote_ids("host_groups"), vec!["web"]);
}

#[test]
fn test_operator_managed_entries_are_left_alone() {
    let state = state();
    let gateway = MockGateway::new().with_records(
        "host_groups",
        vec![
            RemoteRecord::named("oncall", "On Call"),
            RemoteRecord::named("web", "Web (manual)"),
        ],
    );

    let report = engine(&state)
        .sync(&mut hosts(), &gateway, &SyncOptions::default())
        .unwrap();

    let pass = report.pass("host_groups").unwrap();
    assert_eq!(pass.external, vec!["oncall"]);
    // An external entry is only touched because desired state claims its id
    assert_eq!(pass.updated, vec!["web"]);
    assert_eq!(gateway.remote_ids("host_groups"), vec!["db", "oncall", "web"]);
}

#[test]
fn test_dry_run_changes_nothing() {
    let state = state();
    let gateway = MockGateway::new();

    let report = engine(&state)
        .sync(
            &mut hosts(),
            &gateway,
            &SyncOptions {
                dry_run: true,
                ..SyncOptions::default()
            },
        )
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.pass("host_groups").unwrap().created, vec!["db", "web"]);
    assert!(gateway.mutating_calls().is_empty());
    assert!(!state.snapshot_path("host_groups").exists());
    assert!(
        report.passes[0]
            .messages
            .iter()
            .all(|m| m.text.starts_with("[dry-run] Would create"))
    );
}

#[test]
fn test_fatal_target_does_not_stop_other_targets() {
    let state = state();
    let gateway = MockGateway::new();
    gateway.fail_calls("host_groups", GatewayError::Fatal("401 Unauthorized".into()));

    let report = engine(&state)
        .sync(&mut hosts(), &gateway, &SyncOptions::default())
        .unwrap();

    assert_eq!(report.status, PassStatus::Aborted);
    assert_eq!(report.pass("host_groups").unwrap().status, PassStatus::Aborted);
    assert_eq!(report.pass("folders").unwrap().status, PassStatus::Synced);
    assert_eq!(report.pass("rules").unwrap().status, PassStatus::Synced);
    assert!(!state.snapshot_path("host_groups").exists());
    assert!(state.snapshot_path("folders").is_file());
}

#[test]
fn test_concurrent_run_on_same_target_is_refused() {
    let state = state();
    let gateway = MockGateway::new();
    let _held = RunLock::acquire(state.root(), "test", "rules").unwrap();

    let report = engine(&state)
        .sync(&mut hosts(), &gateway, &SyncOptions::default())
        .unwrap();

    let rules = report.pass("rules").unwrap();
    assert_eq!(rules.status, PassStatus::Aborted);
    assert!(rules.messages[0].text.contains("in progress"));
    assert_eq!(report.pass("host_groups").unwrap().status, PassStatus::Synced);
}

#[test]
fn test_selected_targets_only() {
    let state = state();
    let gateway = MockGateway::new();

    let report = engine(&state)
        .sync(
            &mut hosts(),
            &gateway,
            &SyncOptions {
                targets: vec!["host_groups".to_string()],
                ..SyncOptions::default()
            },
        )
        .unwrap();

    assert_eq!(report.passes.len(), 1);
    assert!(gateway.records("folders").is_empty());
}

#[test]
fn test_malformed_rules_are_reported_not_fatal() {
    let state = state();
    let gateway = MockGateway::new();
    let mut rules = vec![json!({ "name": "broken", "outcomes": [{ "type": "move_folder" }] })];
    rules.push(json!({
        "name": "everything",
        "condition_mode": "anyway",
        "outcomes": [{ "type": "move_folder", "param": "/All" }],
    }));
    let engine = SyncEngine::new(state.config().clone()).with_action_rules(RuleSet::from_values(rules));

    let report = engine
        .sync(&mut hosts(), &gateway, &SyncOptions::default())
        .unwrap();

    assert_eq!(report.rejected_rules.len(), 1);
    assert_eq!(report.rejected_rules[0].rule, "broken");
    assert_eq!(gateway.remote_ids("folders"), vec!["/all"]);
}

#[test]
fn test_all_mode_rule_matches_label_value_ignoring_case() {
    let state = state();
    let gateway = MockGateway::new();
    let rules = RuleSet::from_values(vec![json!({
        "name": "linux web",
        "condition_mode": "all",
        "conditions": [
            { "match_type": "host", "hostname": "web1" },
            { "match_type": "tag", "tag": "os", "value": "linux" },
        ],
        "outcomes": [{ "type": "move_folder", "param": "/linux" }],
    })]);
    let engine = SyncEngine::new(state.config().clone()).with_action_rules(rules);

    engine
        .sync(
            &mut store([host("web1", &[("os", "Linux")]), host("web2", &[("os", "Linux")])]),
            &gateway,
            &SyncOptions::default(),
        )
        .unwrap();

    assert_eq!(gateway.remote_ids("folders"), vec!["/linux"]);
}

#[test]
fn test_rules_see_inventory_attributes() {
    let state = state();
    let gateway = MockGateway::new();
    let rules = RuleSet::from_values(vec![json!({
        "name": "by inventoried os",
        "conditions": [{ "match_type": "tag", "tag": "cmk__os", "value": "linux" }],
        "outcomes": [{ "type": "value_as_folder", "param": "cmk__os" }],
    })]);
    let engine = SyncEngine::new(state.config().clone()).with_action_rules(rules);

    let mut web1 = host("web1", &[("role", "web")]);
    web1.update_inventory("cmk", [("os", "Linux")], &HostPolicy::default())
        .unwrap();

    engine
        .sync(&mut store([web1]), &gateway, &SyncOptions::default())
        .unwrap();

    assert_eq!(gateway.remote_ids("folders"), vec!["/linux"]);
}

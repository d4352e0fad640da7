mod support;

use std::fs;

use predicates::str::contains;

use support::TestWorkspace;

#[test]
fn actor_show_uses_env_when_set() {
    let workspace = TestWorkspace::new();

    workspace
        .tw(None)
        .env("TEAMWORK_ACTOR", "env-actor")
        .args(["actor", "show"])
        .assert()
        .success()
        .stdout(contains("env-actor"));
}

#[test]
fn actor_set_persists_and_show_reads() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TestWorkspace::new();

    workspace
        .tw(None)
        .args(["actor", "set", "persisted-actor"])
        .assert()
        .success();

    let contents = fs::read_to_string(workspace.state_dir().join("actor"))?;
    assert!(contents.contains("persisted-actor"));

    workspace
        .tw(None)
        .args(["actor", "show"])
        .assert()
        .success()
        .stdout(contains("persisted-actor"));

    Ok(())
}

#[test]
fn actor_show_falls_back_to_config_default() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TestWorkspace::new();
    workspace.write_file(".teamwork.toml", "[actor]\ndefault = \"config-actor\"\n")?;

    workspace
        .tw(None)
        .args(["actor", "show"])
        .assert()
        .success()
        .stdout(contains("config-actor"));

    Ok(())
}

#[test]
fn cli_actor_wins_over_persisted_actor() {
    let workspace = TestWorkspace::init();
    workspace
        .tw(None)
        .args(["actor", "set", "persisted-actor"])
        .assert()
        .success();

    let data = workspace.json("flag-actor", &["actor", "show"]);
    assert_eq!(data["actor"], "flag-actor");
}

#[test]
fn persisted_actor_acts_as_project_leader() {
    let workspace = TestWorkspace::init();
    workspace
        .tw(None)
        .args(["actor", "set", "lead"])
        .assert()
        .success();

    workspace
        .tw(None)
        .args([
            "project", "create", "Launch", "--start", "2025-01-01", "--end", "2025-12-31",
        ])
        .assert()
        .success();

    let listed = workspace.json("lead", &["project", "list"]);
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["projects"][0]["role"], "LEADER");
}

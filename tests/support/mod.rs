#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;

use teamwork::actor::Caller;
use teamwork::project::{self, NewProject};
use teamwork::store::MemoryStore;

/// Temporary workspace root for CLI tests.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    /// New workspace with `tw init` already run.
    pub fn init() -> Self {
        let workspace = Self::new();
        workspace.tw(None).arg("init").assert().success();
        workspace
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.path().join(".teamwork")
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// `tw` rooted at this workspace, acting as `actor` when given.
    pub fn tw(&self, actor: Option<&str>) -> Command {
        let mut cmd = Command::cargo_bin("tw").expect("binary");
        cmd.current_dir(self.path())
            .env_remove("TEAMWORK_ACTOR")
            .env_remove("TEAMWORK_ROOT")
            .env_remove("RUST_LOG");
        if let Some(actor) = actor {
            cmd.args(["--actor", actor]);
        }
        cmd
    }

    /// Run a command with `--json` and return the `data` payload.
    pub fn json(&self, actor: &str, args: &[&str]) -> Value {
        let output = self
            .tw(Some(actor))
            .args(args)
            .arg("--json")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let value: Value = serde_json::from_slice(&output).expect("json envelope");
        assert_eq!(value["status"], "success");
        value["data"].clone()
    }

    /// JSON lines written to a file under the workspace.
    pub fn read_jsonl(&self, rel_path: &str) -> Vec<Value> {
        let path = self.path().join(rel_path);
        if !path.exists() {
            return Vec::new();
        }
        fs::read_to_string(path)
            .expect("read jsonl")
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0)
        .single()
        .expect("valid time")
}

pub fn caller(user: &str) -> Caller {
    Caller::new(user, at(2025, 6, 1))
}

/// Project "Launch" (2025-01-01 .. 2025-12-31) led by `lead`, with `vice`
/// as vice leader and `dev`, `qa` as members.
pub fn seeded_store() -> (MemoryStore, String) {
    let mut store = MemoryStore::new();
    let project = project::create(
        &mut store,
        &caller("lead"),
        NewProject {
            name: "Launch".to_string(),
            description: None,
            start_date: date(2025, 1, 1),
            end_date: date(2025, 12, 31),
        },
    )
    .expect("create project")
    .value;
    for user in ["vice", "dev", "qa"] {
        project::add_member(&mut store, &caller("lead"), &project.id, user).expect("add member");
    }
    project::promote(&mut store, &caller("lead"), &project.id, "vice").expect("promote");
    (store, project.id)
}

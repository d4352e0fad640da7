//! Task tree store.
//!
//! The core only talks to persistence through [`Repository`]. [`MemoryStore`]
//! is the arena implementation: projects, members and tasks keyed by id, with
//! a children index rebuilt from parent pointers instead of live child
//! collections on the parent.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::approval::ApprovalLog;
use crate::project::{Project, ProjectLog};
use crate::role::{ProjectMember, Role};
use crate::task::Task;

pub const STATE_SCHEMA_VERSION: &str = "teamwork.state.v1";

/// Generate a prefixed, time-sortable id such as `tsk-01j9...`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Ulid::new().to_string().to_lowercase())
}

/// Query and write contract the core depends on.
///
/// Lookups return owned copies; callers mutate and hand them back through the
/// `save_*` methods.
pub trait Repository {
    fn find_project(&self, id: &str) -> Option<Project>;
    fn projects(&self) -> Vec<Project>;
    fn save_project(&mut self, project: Project);
    /// Remove a project together with its tasks and memberships.
    fn delete_project(&mut self, id: &str);

    fn find_membership(&self, project_id: &str, user_id: &str) -> Option<Role> {
        self.find_member(project_id, user_id).map(|member| member.role)
    }
    fn find_member(&self, project_id: &str, user_id: &str) -> Option<ProjectMember>;
    /// Members of a project in join order.
    fn members(&self, project_id: &str) -> Vec<ProjectMember>;
    /// Insert or replace the membership for `(project_id, user_id)`.
    fn save_member(&mut self, member: ProjectMember);
    fn delete_member(&mut self, project_id: &str, user_id: &str);

    fn find_task(&self, id: &str) -> Option<Task>;
    fn find_children(&self, parent_id: &str) -> Vec<Task>;
    fn find_root_tasks(&self, project_id: &str, level: u32) -> Vec<Task>;
    fn tasks_in_project(&self, project_id: &str) -> Vec<Task>;
    fn tasks_assigned_to(&self, user_id: &str) -> Vec<Task>;
    fn save_task(&mut self, task: Task);
    /// Remove a task and its descendants, returning the removed ids.
    fn delete_task(&mut self, id: &str) -> Vec<String>;

    fn find_log(&self, id: &str) -> Option<ApprovalLog>;
    /// Approval logs are append-only; there is no update or delete.
    fn save_log(&mut self, log: ApprovalLog);
    /// Logs for one task, oldest first.
    fn logs_for_task(&self, task_id: &str) -> Vec<ApprovalLog>;
    fn logs_for_project(&self, project_id: &str) -> Vec<ApprovalLog>;

    fn save_project_log(&mut self, log: ProjectLog);
    /// Audit trail for one project, oldest first.
    fn project_logs(&self, project_id: &str) -> Vec<ProjectLog>;
}

/// Serialized form of everything except the approval log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub members: Vec<ProjectMember>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub project_logs: Vec<ProjectLog>,
    /// Approval rows this snapshot covers. Rows past this count in
    /// `approvals.jsonl` belong to a commit that never completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_rows: Option<usize>,
}

impl StateSnapshot {
    pub fn empty() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            projects: Vec::new(),
            members: Vec::new(),
            tasks: Vec::new(),
            project_logs: Vec::new(),
            approval_rows: Some(0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    projects: BTreeMap<String, Project>,
    members: Vec<ProjectMember>,
    tasks: BTreeMap<String, Task>,
    children: HashMap<String, Vec<String>>,
    logs: Vec<ApprovalLog>,
    persisted_logs: usize,
    project_logs: Vec<ProjectLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot plus the logs already on disk.
    pub fn from_parts(snapshot: StateSnapshot, logs: Vec<ApprovalLog>) -> Self {
        let persisted_logs = logs.len();
        let mut store = Self {
            projects: snapshot
                .projects
                .into_iter()
                .map(|project| (project.id.clone(), project))
                .collect(),
            members: snapshot.members,
            tasks: snapshot
                .tasks
                .into_iter()
                .map(|task| (task.id.clone(), task))
                .collect(),
            children: HashMap::new(),
            logs,
            persisted_logs,
            project_logs: snapshot.project_logs,
        };
        store.rebuild_children();
        store
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            schema_version: STATE_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            projects: self.projects.values().cloned().collect(),
            members: self.members.clone(),
            tasks: self.tasks.values().cloned().collect(),
            project_logs: self.project_logs.clone(),
            approval_rows: Some(self.logs.len()),
        }
    }

    /// Every approval row, oldest first.
    pub fn logs(&self) -> &[ApprovalLog] {
        &self.logs
    }

    /// Number of rows known to be on disk.
    pub fn persisted_log_count(&self) -> usize {
        self.persisted_logs
    }

    /// Logs saved since the store was loaded or last marked persisted.
    pub fn pending_logs(&self) -> &[ApprovalLog] {
        &self.logs[self.persisted_logs..]
    }

    pub fn mark_logs_persisted(&mut self) {
        self.persisted_logs = self.logs.len();
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn rebuild_children(&mut self) {
        self.children.clear();
        // BTreeMap iteration keeps sibling lists in id (creation) order.
        for task in self.tasks.values() {
            if let Some(parent_id) = &task.parent_id {
                self.children
                    .entry(parent_id.clone())
                    .or_default()
                    .push(task.id.clone());
            }
        }
    }

    fn unlink_child(&mut self, parent_id: &str, child_id: &str) {
        if let Some(siblings) = self.children.get_mut(parent_id) {
            siblings.retain(|id| id != child_id);
            if siblings.is_empty() {
                self.children.remove(parent_id);
            }
        }
    }

    fn link_child(&mut self, parent_id: &str, child_id: &str) {
        let siblings = self.children.entry(parent_id.to_string()).or_default();
        if let Err(pos) = siblings.binary_search_by(|id| id.as_str().cmp(child_id)) {
            siblings.insert(pos, child_id.to_string());
        }
    }

    fn subtree_ids(&self, root: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_string()];
        while let Some(id) = stack.pop() {
            if let Some(children) = self.children.get(&id) {
                stack.extend(children.iter().rev().cloned());
            }
            out.push(id);
        }
        out
    }
}

impl Repository for MemoryStore {
    fn find_project(&self, id: &str) -> Option<Project> {
        self.projects.get(id).cloned()
    }

    fn projects(&self) -> Vec<Project> {
        self.projects.values().cloned().collect()
    }

    fn save_project(&mut self, project: Project) {
        self.projects.insert(project.id.clone(), project);
    }

    fn delete_project(&mut self, id: &str) {
        self.projects.remove(id);
        self.members.retain(|member| member.project_id != id);
        self.project_logs.retain(|log| log.project_id != id);
        let roots: Vec<String> = self
            .tasks
            .values()
            .filter(|task| task.project_id == id && task.parent_id.is_none())
            .map(|task| task.id.clone())
            .collect();
        for root in roots {
            self.delete_task(&root);
        }
        // Orphans whose parent lives elsewhere still belong to this project.
        self.tasks.retain(|_, task| task.project_id != id);
        self.rebuild_children();
    }

    fn find_member(&self, project_id: &str, user_id: &str) -> Option<ProjectMember> {
        self.members
            .iter()
            .find(|member| member.project_id == project_id && member.user_id == user_id)
            .cloned()
    }

    fn members(&self, project_id: &str) -> Vec<ProjectMember> {
        self.members
            .iter()
            .filter(|member| member.project_id == project_id)
            .cloned()
            .collect()
    }

    fn save_member(&mut self, member: ProjectMember) {
        match self.members.iter_mut().find(|existing| {
            existing.project_id == member.project_id && existing.user_id == member.user_id
        }) {
            Some(existing) => *existing = member,
            None => self.members.push(member),
        }
    }

    fn delete_member(&mut self, project_id: &str, user_id: &str) {
        self.members
            .retain(|member| !(member.project_id == project_id && member.user_id == user_id));
    }

    fn find_task(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).cloned()
    }

    fn find_children(&self, parent_id: &str) -> Vec<Task> {
        self.children
            .get(parent_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.tasks.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn find_root_tasks(&self, project_id: &str, level: u32) -> Vec<Task> {
        self.tasks
            .values()
            .filter(|task| task.project_id == project_id && task.level == level)
            .cloned()
            .collect()
    }

    fn tasks_in_project(&self, project_id: &str) -> Vec<Task> {
        self.tasks
            .values()
            .filter(|task| task.project_id == project_id)
            .cloned()
            .collect()
    }

    fn tasks_assigned_to(&self, user_id: &str) -> Vec<Task> {
        self.tasks
            .values()
            .filter(|task| task.is_assigned(user_id))
            .cloned()
            .collect()
    }

    fn save_task(&mut self, task: Task) {
        let previous_parent = self
            .tasks
            .get(&task.id)
            .and_then(|existing| existing.parent_id.clone());
        if previous_parent != task.parent_id {
            if let Some(old) = &previous_parent {
                self.unlink_child(old, &task.id);
            }
        }
        if let Some(parent_id) = &task.parent_id {
            self.link_child(parent_id, &task.id);
        }
        self.tasks.insert(task.id.clone(), task);
    }

    fn delete_task(&mut self, id: &str) -> Vec<String> {
        if !self.tasks.contains_key(id) {
            return Vec::new();
        }
        let removed = self.subtree_ids(id);
        if let Some(parent_id) = self.tasks.get(id).and_then(|task| task.parent_id.clone()) {
            self.unlink_child(&parent_id, id);
        }
        for task_id in &removed {
            self.tasks.remove(task_id);
            self.children.remove(task_id);
        }
        removed
    }

    fn find_log(&self, id: &str) -> Option<ApprovalLog> {
        self.logs.iter().find(|log| log.id == id).cloned()
    }

    fn save_log(&mut self, log: ApprovalLog) {
        self.logs.push(log);
    }

    fn logs_for_task(&self, task_id: &str) -> Vec<ApprovalLog> {
        self.logs
            .iter()
            .filter(|log| log.task_id == task_id)
            .cloned()
            .collect()
    }

    fn logs_for_project(&self, project_id: &str) -> Vec<ApprovalLog> {
        self.logs
            .iter()
            .filter(|log| log.project_id == project_id)
            .cloned()
            .collect()
    }

    fn save_project_log(&mut self, log: ProjectLog) {
        self.project_logs.push(log);
    }

    fn project_logs(&self, project_id: &str) -> Vec<ProjectLog> {
        self.project_logs
            .iter()
            .filter(|log| log.project_id == project_id)
            .cloned()
            .collect()
    }
}

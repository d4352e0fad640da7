//! Tasks and the task service.
//!
//! Tasks form one tree per project. Every operation takes an explicit
//! [`Caller`], checks permissions before touching the store, and returns the
//! notifications and activity records it produced.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::Caller;
use crate::approval::{self, ApprovalState};
use crate::error::{Error, Result};
use crate::notify::{ActivityKind, Effects, EntityType, NotificationKind, Outcome};
use crate::overdue;
use crate::permission::{self, Operation};
use crate::progress;
use crate::project::Project;
use crate::role::Role;
use crate::status::Status;
use crate::store::{new_id, Repository};

pub const DEFAULT_TASK_PRIORITY: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Aggregation weight; divided by `level` when rolled into the parent.
    pub priority: u32,
    /// Depth in the tree, roots are 1.
    pub level: u32,
    pub progress: u8,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub created_by: String,
    #[serde(default)]
    pub assignees: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A root task with default priority, no progress and IN_PROGRESS status.
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        title: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            project_id: project_id.into(),
            parent_id: None,
            title: title.into(),
            description: None,
            priority: DEFAULT_TASK_PRIORITY,
            level: 1,
            progress: 0,
            status: Status::InProgress,
            deadline: None,
            created_by: created_by.into(),
            assignees: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_assigned(&self, user: &str) -> bool {
        self.assignees.iter().any(|assignee| assignee == user)
    }

    pub fn is_creator(&self, user: &str) -> bool {
        self.created_by == user
    }
}

/// Input for [`create`].
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: u32,
    pub deadline: Option<DateTime<Utc>>,
    pub parent_id: Option<String>,
    /// Ignored when the creator is a plain MEMBER, who is self-assigned.
    pub assignees: Vec<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: DEFAULT_TASK_PRIORITY,
            deadline: None,
            parent_id: None,
            assignees: Vec::new(),
        }
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn assign(mut self, user: impl Into<String>) -> Self {
        self.assignees.push(user.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentChange {
    Detach,
    Attach(String),
}

/// Input for [`update`]. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<u32>,
    pub deadline: Option<DateTime<Utc>>,
    pub clear_deadline: bool,
    pub parent: Option<ParentChange>,
    pub assignees: Option<Vec<String>>,
}

/// Task as shown to a reader.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub approval: ApprovalState,
    /// Assignees of the task and all of its descendants.
    pub subtree_assignees: Vec<String>,
}

fn load_task<S: Repository + ?Sized>(store: &S, task_id: &str) -> Result<Task> {
    store
        .find_task(task_id)
        .ok_or_else(|| Error::not_found("task", task_id))
}

fn load_project<S: Repository + ?Sized>(store: &S, project_id: &str) -> Result<Project> {
    store
        .find_project(project_id)
        .ok_or_else(|| Error::not_found("project", project_id))
}

fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid("task title cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn validate_priority(priority: u32) -> Result<u32> {
    if priority == 0 {
        return Err(Error::invalid("task priority must be a positive integer"));
    }
    Ok(priority)
}

/// A deadline may not be after the parent's deadline nor after the
/// project's end date.
fn validate_deadline(
    deadline: Option<DateTime<Utc>>,
    parent: Option<&Task>,
    project: &Project,
) -> Result<()> {
    let Some(deadline) = deadline else {
        return Ok(());
    };
    if let Some(parent_deadline) = parent.and_then(|parent| parent.deadline) {
        if deadline > parent_deadline {
            return Err(Error::invalid(format!(
                "deadline {} is after the parent task's deadline {}",
                deadline.format("%Y-%m-%d %H:%M"),
                parent_deadline.format("%Y-%m-%d %H:%M")
            )));
        }
    }
    if deadline.date_naive() > project.end_date {
        return Err(Error::invalid(format!(
            "deadline {} is after the project's end date {}",
            deadline.format("%Y-%m-%d"),
            project.end_date
        )));
    }
    Ok(())
}

/// Deduplicate `users` and require each to be a member of `project_id`.
fn resolve_assignees<S: Repository + ?Sized>(
    store: &S,
    project_id: &str,
    users: &[String],
) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for user in users {
        let user = user.trim();
        if user.is_empty() || !seen.insert(user.to_string()) {
            continue;
        }
        if store.find_membership(project_id, user).is_none() {
            return Err(Error::not_found("project member", user));
        }
        out.push(user.to_string());
    }
    Ok(out)
}

/// Create a task. A MEMBER creator is assigned to it; managers assign the
/// requested users.
pub fn create<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
    input: NewTask,
) -> Result<Outcome<Task>> {
    let project = load_project(store, project_id)?;
    let role = permission::require(store, project_id, &caller.user, Operation::CreateTask)?;

    let title = validate_title(&input.title)?;
    let priority = validate_priority(input.priority)?;

    let parent = match &input.parent_id {
        Some(parent_id) => {
            let parent = store
                .find_task(parent_id)
                .ok_or_else(|| Error::not_found("parent task", parent_id))?;
            if parent.project_id != project_id {
                return Err(Error::invalid(format!(
                    "parent task {parent_id} belongs to another project"
                )));
            }
            Some(parent)
        }
        None => None,
    };
    validate_deadline(input.deadline, parent.as_ref(), &project)?;

    let assignees = if role == Role::Member {
        vec![caller.user.clone()]
    } else {
        resolve_assignees(store, project_id, &input.assignees)?
    };

    let mut task = Task::new(new_id("tsk"), project_id, title, &caller.user);
    task.description = input.description.filter(|text| !text.trim().is_empty());
    task.priority = priority;
    task.deadline = input.deadline;
    task.level = parent.as_ref().map(|parent| parent.level + 1).unwrap_or(1);
    task.parent_id = parent.map(|parent| parent.id);
    task.assignees = assignees;
    task.created_at = caller.now;
    task.updated_at = caller.now;
    store.save_task(task.clone());
    progress::refresh_ancestors(store, &task.id)?;

    let mut effects = Effects::new();
    if role != Role::Member {
        for user in &task.assignees {
            effects.notify(
                format!("You have been assigned to task: {}", task.title),
                NotificationKind::TaskAssigned,
                user,
                &task.id,
                EntityType::Task,
            );
        }
    }
    effects.notify(
        format!("New task created: {}", task.title),
        NotificationKind::TaskAssigned,
        &caller.user,
        &task.id,
        EntityType::Task,
    );
    effects.record(
        &caller.user,
        format!("Created task: {}", task.title),
        EntityType::Task,
        &task.id,
        ActivityKind::CreatedTask,
    );

    tracing::info!(task = %task.id, project = project_id, level = task.level, "task created");
    Ok(Outcome::new(task, effects))
}

/// Refresh-and-read: applies the overdue check, recomputes and persists
/// progress, and completes the task when the displayed value reaches 100.
pub fn read<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    task_id: &str,
) -> Result<Outcome<TaskView>> {
    let task = load_task(store, task_id)?;
    permission::require(store, &task.project_id, &caller.user, Operation::ViewProject)?;

    let overdue_check = overdue::refresh_overdue_state(store, task_id, caller.now)?;
    let shown = progress::refresh_task_progress(store, task_id)?;

    let mut task = load_task(store, task_id)?;
    if shown == 100 && !task.status.is_settled() {
        tracing::debug!(task = task_id, previous = %task.status, "completed by progress");
        task.status = Status::Completed;
        task.updated_at = caller.now;
        store.save_task(task.clone());
    }
    task.progress = shown;

    let view = build_view(store, task);
    Ok(Outcome::new(view, overdue_check.effects))
}

/// Side-effect free read: progress is computed but nothing is written.
pub fn peek<S: Repository + ?Sized>(store: &S, caller: &Caller, task_id: &str) -> Result<TaskView> {
    let mut task = load_task(store, task_id)?;
    permission::require(store, &task.project_id, &caller.user, Operation::ViewProject)?;
    task.progress = progress::peek_task_progress(store, task_id)?;
    Ok(build_view(store, task))
}

fn build_view<S: Repository + ?Sized>(store: &S, task: Task) -> TaskView {
    let mut subtree_assignees = Vec::new();
    let mut seen = HashSet::new();
    for node in subtree(store, &task) {
        for user in node.assignees {
            if seen.insert(user.clone()) {
                subtree_assignees.push(user);
            }
        }
    }
    TaskView {
        approval: approval::state(store, &task.id),
        task,
        subtree_assignees,
    }
}

/// `root` and its descendants in pre-order.
fn subtree<S: Repository + ?Sized>(store: &S, root: &Task) -> Vec<Task> {
    let mut out = Vec::new();
    let mut stack = vec![root.clone()];
    let mut visited = HashSet::new();
    while let Some(task) = stack.pop() {
        if !visited.insert(task.id.clone()) {
            continue;
        }
        let mut children = store.find_children(&task.id);
        children.reverse();
        stack.extend(children);
        out.push(task);
    }
    out
}

pub fn update<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    task_id: &str,
    changes: TaskUpdate,
) -> Result<Outcome<Task>> {
    let mut task = load_task(store, task_id)?;
    let project = load_project(store, &task.project_id)?;
    let previous_parent = task.parent_id.clone();
    let role = permission::require(
        store,
        &task.project_id,
        &caller.user,
        Operation::UpdateTask {
            is_creator: task.is_creator(&caller.user),
        },
    )?;
    if changes.assignees.is_some() {
        permission::authorize(Some(role), Operation::AssignUser)?;
    }

    if let Some(title) = &changes.title {
        task.title = validate_title(title)?;
    }
    if let Some(description) = changes.description {
        task.description = Some(description).filter(|text| !text.trim().is_empty());
    }
    if let Some(priority) = changes.priority {
        task.priority = validate_priority(priority)?;
    }
    if changes.clear_deadline {
        task.deadline = None;
    } else if let Some(deadline) = changes.deadline {
        task.deadline = Some(deadline);
    }

    let parent = match &changes.parent {
        Some(ParentChange::Detach) => None,
        Some(ParentChange::Attach(parent_id)) => Some(resolve_new_parent(store, &task, parent_id)?),
        None => match &task.parent_id {
            Some(parent_id) => store.find_task(parent_id),
            None => None,
        },
    };
    validate_deadline(task.deadline, parent.as_ref(), &project)?;

    let new_level = parent.as_ref().map(|parent| parent.level + 1).unwrap_or(1);
    let relevel = new_level != task.level;
    task.parent_id = parent.map(|parent| parent.id);
    task.level = new_level;

    let mut newly_assigned = Vec::new();
    if let Some(users) = &changes.assignees {
        let resolved = resolve_assignees(store, &task.project_id, users)?;
        newly_assigned = resolved
            .iter()
            .filter(|user| !task.is_assigned(user))
            .cloned()
            .collect();
        task.assignees = resolved;
    }

    task.updated_at = caller.now;
    store.save_task(task.clone());
    if relevel {
        relevel_descendants(store, &task);
    }
    progress::refresh_ancestors(store, &task.id)?;
    if let Some(old_parent) = previous_parent.filter(|old| task.parent_id.as_ref() != Some(old)) {
        progress::refresh_ancestors(store, &old_parent)?;
    }
    let task = load_task(store, &task.id)?;

    let mut effects = Effects::new();
    for user in &newly_assigned {
        effects.notify(
            format!("You have been assigned to task: {}", task.title),
            NotificationKind::TaskAssigned,
            user,
            &task.id,
            EntityType::Task,
        );
    }
    effects.notify(
        format!("Task updated: {}", task.title),
        NotificationKind::TaskUpdated,
        &caller.user,
        &task.id,
        EntityType::Task,
    );
    effects.record(
        &caller.user,
        format!("Updated task: {}", task.title),
        EntityType::Task,
        &task.id,
        ActivityKind::UpdatedTask,
    );
    Ok(Outcome::new(task, effects))
}

fn resolve_new_parent<S: Repository + ?Sized>(
    store: &S,
    task: &Task,
    parent_id: &str,
) -> Result<Task> {
    let parent = store
        .find_task(parent_id)
        .ok_or_else(|| Error::not_found("parent task", parent_id))?;
    if parent.project_id != task.project_id {
        return Err(Error::invalid(format!(
            "parent task {parent_id} belongs to another project"
        )));
    }
    if subtree(store, task).iter().any(|node| node.id == parent.id) {
        return Err(Error::invalid(format!(
            "task {parent_id} is {} or one of its descendants",
            task.id
        )));
    }
    Ok(parent)
}

fn relevel_descendants<S: Repository + ?Sized>(store: &mut S, root: &Task) {
    let mut stack = vec![(root.id.clone(), root.level)];
    while let Some((parent_id, parent_level)) = stack.pop() {
        for mut child in store.find_children(&parent_id) {
            child.level = parent_level + 1;
            stack.push((child.id.clone(), child.level));
            store.save_task(child);
        }
    }
}

/// Delete a task and its subtree. Returns the removed ids.
pub fn delete<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    task_id: &str,
) -> Result<Outcome<Vec<String>>> {
    let task = load_task(store, task_id)?;
    permission::require(
        store,
        &task.project_id,
        &caller.user,
        Operation::DeleteTask {
            is_creator: task.is_creator(&caller.user),
        },
    )?;

    let mut effects = Effects::new();
    for user in &task.assignees {
        effects.notify(
            format!("Deleted task {}", task.title),
            NotificationKind::TaskDeleted,
            user,
            &task.id,
            EntityType::Task,
        );
    }
    effects.record(
        &caller.user,
        format!("Deleted task: {}", task.title),
        EntityType::Task,
        &task.id,
        ActivityKind::DeletedTask,
    );

    let removed = store.delete_task(task_id);
    match &task.parent_id {
        Some(parent_id) => progress::refresh_ancestors(store, parent_id)?,
        None => {
            progress::refresh_project_progress(store, &task.project_id)?;
        }
    }
    tracing::info!(task = task_id, removed = removed.len(), "task deleted");
    Ok(Outcome::new(removed, effects))
}

pub fn change_status<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    task_id: &str,
    status: Status,
) -> Result<Outcome<Task>> {
    let mut task = load_task(store, task_id)?;
    permission::require(
        store,
        &task.project_id,
        &caller.user,
        Operation::ChangeTaskStatus {
            is_assignee: task.is_assigned(&caller.user),
        },
    )?;

    task.status = status;
    task.updated_at = caller.now;
    store.save_task(task.clone());

    let mut effects = Effects::new();
    effects.notify(
        format!("Task status updated: {} to {status}", task.title),
        NotificationKind::TaskUpdated,
        &caller.user,
        &task.id,
        EntityType::Task,
    );
    effects.record(
        &caller.user,
        format!("Updated status of task {} to {status}", task.title),
        EntityType::Task,
        &task.id,
        ActivityKind::UpdatedTask,
    );
    Ok(Outcome::new(task, effects))
}

/// Set a task's own progress. 0 resets to NOT_STARTED, 100 completes it, and
/// anything in between starts a NOT_STARTED task.
pub fn update_progress<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    task_id: &str,
    value: i64,
) -> Result<Outcome<Task>> {
    let mut task = load_task(store, task_id)?;
    permission::authorize(
        store.find_membership(&task.project_id, &caller.user),
        Operation::UpdateTaskProgress {
            is_creator: task.is_creator(&caller.user),
            is_assignee: task.is_assigned(&caller.user),
        },
    )?;

    let percent = u8::try_from(value)
        .ok()
        .filter(|percent| *percent <= 100)
        .ok_or_else(|| Error::invalid(format!("progress must be between 0 and 100, got {value}")))?;

    task.progress = percent;
    task.status = match percent {
        0 => Status::NotStarted,
        100 => Status::Completed,
        _ if task.status == Status::NotStarted => Status::InProgress,
        _ => task.status,
    };
    task.updated_at = caller.now;
    store.save_task(task.clone());
    progress::refresh_ancestors(store, &task.id)?;

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Updated progress of task {} to {percent}%", task.title),
        EntityType::Task,
        &task.id,
        ActivityKind::UpdatedTask,
    );
    Ok(Outcome::new(task, effects))
}

pub fn assign<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    task_id: &str,
    user: &str,
) -> Result<Outcome<Task>> {
    let mut task = load_task(store, task_id)?;
    permission::require(store, &task.project_id, &caller.user, Operation::AssignUser)?;
    if store.find_membership(&task.project_id, user).is_none() {
        return Err(Error::not_found("project member", user));
    }
    if task.is_assigned(user) {
        return Err(Error::invalid(format!("{user} is already assigned to this task")));
    }

    task.assignees.push(user.to_string());
    task.updated_at = caller.now;
    store.save_task(task.clone());

    let mut effects = Effects::new();
    effects.notify(
        format!("You have been assigned to task: {}", task.title),
        NotificationKind::TaskAssigned,
        user,
        &task.id,
        EntityType::Task,
    );
    Ok(Outcome::new(task, effects))
}

pub fn unassign<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    task_id: &str,
    user: &str,
) -> Result<Outcome<Task>> {
    let mut task = load_task(store, task_id)?;
    permission::require(store, &task.project_id, &caller.user, Operation::AssignUser)?;
    if !task.is_assigned(user) {
        return Err(Error::invalid(format!("{user} is not assigned to this task")));
    }

    task.assignees.retain(|assignee| assignee != user);
    task.updated_at = caller.now;
    store.save_task(task.clone());

    let mut effects = Effects::new();
    effects.notify(
        format!("You have been removed from task: {}", task.title),
        NotificationKind::TaskUpdated,
        user,
        &task.id,
        EntityType::Task,
    );
    Ok(Outcome::new(task, effects))
}

/// All tasks of a project, each passed through the overdue check.
pub fn list_project_tasks<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
) -> Result<Outcome<Vec<Task>>> {
    load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::ViewProject)?;
    let ids: Vec<String> = store
        .tasks_in_project(project_id)
        .into_iter()
        .map(|task| task.id)
        .collect();
    refresh_all(store, caller, ids)
}

/// Tasks assigned to the caller across projects, each passed through the
/// overdue check.
pub fn list_assigned<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
) -> Result<Outcome<Vec<Task>>> {
    let ids: Vec<String> = store
        .tasks_assigned_to(&caller.user)
        .into_iter()
        .map(|task| task.id)
        .collect();
    refresh_all(store, caller, ids)
}

fn refresh_all<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    ids: Vec<String>,
) -> Result<Outcome<Vec<Task>>> {
    let mut effects = Effects::new();
    let mut tasks = Vec::with_capacity(ids.len());
    for id in ids {
        let outcome = overdue::refresh_overdue_state(store, &id, caller.now)?;
        effects.extend(outcome.effects);
        tasks.push(outcome.value);
    }
    Ok(Outcome::new(tasks, effects))
}

/// The whole tree containing `task_id`, from its root ancestor, in pre-order.
/// Stored values are reported as-is.
pub fn hierarchy<S: Repository + ?Sized>(
    store: &S,
    caller: &Caller,
    task_id: &str,
) -> Result<Vec<Task>> {
    let mut root = load_task(store, task_id)?;
    permission::require(store, &root.project_id, &caller.user, Operation::ViewProject)?;

    let mut seen = HashSet::from([root.id.clone()]);
    while let Some(parent_id) = root.parent_id.clone() {
        let Some(parent) = store.find_task(&parent_id) else {
            break;
        };
        if !seen.insert(parent.id.clone()) {
            return Err(Error::State(format!("cycle in parent chain of task {task_id}")));
        }
        root = parent;
    }
    Ok(subtree(store, &root))
}

/// Open tasks assigned to the caller that are due within `window`.
pub fn due_soon<S: Repository + ?Sized>(store: &S, caller: &Caller, window: Duration) -> Vec<Task> {
    overdue::due_soon(store, &caller.user, caller.now, window)
}

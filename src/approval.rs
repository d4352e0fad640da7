//! Approval workflow for task completion.
//!
//! The workflow state of a task is never stored: it is the action of the most
//! recent [`ApprovalLog`] row for that task. Rows are append-only.
//!
//! ```text
//! NONE --submit--> SUBMITTED --approve--> APPROVED
//!                      |  ^
//!               reject |  | submit
//!                      v  |
//!                   REJECTED
//! ```
//!
//! Approve and reject rows credit the performer of the referenced row, not
//! the reviewer, so reports attribute the outcome to the submitter.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::Caller;
use crate::error::{Error, Result};
use crate::notify::{ActivityKind, Effects, EntityType, NotificationKind, Outcome};
use crate::permission::{self, Operation};
use crate::progress;
use crate::status::Status;
use crate::store::{new_id, Repository};
use crate::task::Task;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalAction {
    Submit,
    Approve,
    Reject,
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApprovalAction::Submit => "SUBMIT",
            ApprovalAction::Approve => "APPROVE",
            ApprovalAction::Reject => "REJECT",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalLog {
    pub id: String,
    pub task_id: String,
    pub project_id: String,
    pub action: ApprovalAction,
    pub performed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalLog {
    pub fn new(
        task_id: impl Into<String>,
        project_id: impl Into<String>,
        action: ApprovalAction,
        performed_by: impl Into<String>,
        note: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id("apl"),
            task_id: task_id.into(),
            project_id: project_id.into(),
            action,
            performed_by: performed_by.into(),
            note,
            created_at,
        }
    }
}

/// Derived workflow state of one task.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalState {
    None,
    Submitted,
    Approved,
    Rejected,
}

impl From<ApprovalAction> for ApprovalState {
    fn from(action: ApprovalAction) -> Self {
        match action {
            ApprovalAction::Submit => ApprovalState::Submitted,
            ApprovalAction::Approve => ApprovalState::Approved,
            ApprovalAction::Reject => ApprovalState::Rejected,
        }
    }
}

/// Per-user counts of approval rows in a time window.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ApprovalStats {
    pub submissions: usize,
    pub approvals: usize,
    pub rejections: usize,
}

fn normalize_note(note: Option<String>) -> Option<String> {
    note.map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty())
}

fn load_task<S: Repository + ?Sized>(store: &S, task_id: &str) -> Result<Task> {
    store
        .find_task(task_id)
        .ok_or_else(|| Error::not_found("task", task_id))
}

/// Record a submission for review and notify every manager of the project.
pub fn submit<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    task_id: &str,
    note: Option<String>,
) -> Result<Outcome<ApprovalLog>> {
    let task = load_task(store, task_id)?;
    permission::require(store, &task.project_id, &caller.user, Operation::SubmitApproval)?;

    let note = normalize_note(note);
    let log = ApprovalLog::new(
        &task.id,
        &task.project_id,
        ApprovalAction::Submit,
        &caller.user,
        note.clone(),
        caller.now,
    );
    store.save_log(log.clone());

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Submitted task for approval: {}", task.title),
        EntityType::Task,
        &task.id,
        ActivityKind::SubmittedTask,
    );
    let message = match &note {
        Some(note) => format!(
            "New submission for task approval {} with note: {note}",
            task.title
        ),
        None => format!("New submission for task approval {}", task.title),
    };
    for member in store.members(&task.project_id) {
        if member.role.is_manager() {
            effects.notify(
                message.clone(),
                NotificationKind::TaskSubmitted,
                &member.user_id,
                &log.id,
                EntityType::TaskApprovalLog,
            );
        }
    }

    tracing::info!(task = %task.id, log = %log.id, user = %caller.user, "submission recorded");
    Ok(Outcome::new(log, effects))
}

/// Review target: the referenced row and its task.
fn load_review<S: Repository + ?Sized>(
    store: &S,
    caller: &Caller,
    log_id: &str,
) -> Result<(ApprovalLog, Task)> {
    let original = store
        .find_log(log_id)
        .ok_or_else(|| Error::not_found("approval log", log_id))?;
    let task = load_task(store, &original.task_id)?;
    permission::require(store, &task.project_id, &caller.user, Operation::ReviewApproval)?;
    Ok((original, task))
}

/// Approve the submission behind `log_id` and cascade completion through the
/// task's subtree.
pub fn approve<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    log_id: &str,
    note: Option<String>,
) -> Result<Outcome<ApprovalLog>> {
    let (original, task) = load_review(store, caller, log_id)?;

    let note = normalize_note(note);
    let log = ApprovalLog::new(
        &task.id,
        &task.project_id,
        ApprovalAction::Approve,
        &original.performed_by,
        note.clone(),
        caller.now,
    );
    store.save_log(log.clone());

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Approved task: {}", task.title),
        EntityType::Task,
        &task.id,
        ActivityKind::ApprovedTask,
    );
    let cascade = check_task_done(store, &task.id, caller.now)?;
    progress::refresh_ancestors(store, &task.id)?;
    effects.extend(cascade.effects);
    effects.notify(
        match &note {
            Some(note) => format!("Submission approved with note: {note}"),
            None => "Submission approved".to_string(),
        },
        NotificationKind::TaskApproved,
        &original.performed_by,
        &log.id,
        EntityType::TaskApprovalLog,
    );

    tracing::info!(
        task = %task.id,
        log = %log.id,
        reviewer = %caller.user,
        completed = cascade.value.len(),
        "submission approved"
    );
    Ok(Outcome::new(log, effects))
}

/// Reject the submission behind `log_id`. Task status is left alone.
pub fn reject<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    log_id: &str,
    note: Option<String>,
) -> Result<Outcome<ApprovalLog>> {
    let (original, task) = load_review(store, caller, log_id)?;

    let note = normalize_note(note);
    let log = ApprovalLog::new(
        &task.id,
        &task.project_id,
        ApprovalAction::Reject,
        &original.performed_by,
        note.clone(),
        caller.now,
    );
    store.save_log(log.clone());

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Rejected task: {}", task.title),
        EntityType::Task,
        &task.id,
        ActivityKind::RejectedTask,
    );
    effects.notify(
        match &note {
            Some(note) => format!("Submission rejected with note: {note}"),
            None => "Submission rejected".to_string(),
        },
        NotificationKind::TaskRejected,
        &original.performed_by,
        &log.id,
        EntityType::TaskApprovalLog,
    );

    tracing::info!(task = %task.id, log = %log.id, reviewer = %caller.user, "submission rejected");
    Ok(Outcome::new(log, effects))
}

/// Force-complete `task_id` and every descendant, breadth first.
///
/// Every visited task gets progress 100; its status becomes COMPLETED unless
/// it is already COMPLETED or OVERDUE. Descendants are completed whether or
/// not they were approved themselves. Returns the visited ids in BFS order.
pub fn check_task_done<S: Repository + ?Sized>(
    store: &mut S,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<Outcome<Vec<String>>> {
    let root = load_task(store, task_id)?;
    let mut seen = HashSet::new();
    let mut visited = Vec::new();
    let mut queue = VecDeque::from([root.clone()]);

    while let Some(mut task) = queue.pop_front() {
        if !seen.insert(task.id.clone()) {
            continue;
        }
        queue.extend(store.find_children(&task.id));
        if !task.status.is_settled() {
            task.status = Status::Completed;
        }
        task.progress = 100;
        task.updated_at = now;
        visited.push(task.id.clone());
        store.save_task(task);
    }
    tracing::debug!(task = task_id, visited = visited.len(), "completion cascade finished");

    let mut effects = Effects::new();
    for user in &root.assignees {
        effects.notify(
            format!("Task {} is completed", root.title),
            NotificationKind::TaskUpdated,
            user,
            &root.id,
            EntityType::Task,
        );
    }
    Ok(Outcome::new(visited, effects))
}

/// Approval rows for a task, oldest first.
pub fn history<S: Repository + ?Sized>(
    store: &S,
    caller: &Caller,
    task_id: &str,
) -> Result<Vec<ApprovalLog>> {
    let task = load_task(store, task_id)?;
    permission::require(store, &task.project_id, &caller.user, Operation::ViewProject)?;
    Ok(store.logs_for_task(task_id))
}

/// Current workflow state, derived from the latest row.
pub fn state<S: Repository + ?Sized>(store: &S, task_id: &str) -> ApprovalState {
    store
        .logs_for_task(task_id)
        .last()
        .map(|log| ApprovalState::from(log.action))
        .unwrap_or(ApprovalState::None)
}

/// Count rows credited to `user` in `project_id` with `from <= created_at < to`.
pub fn stats<S: Repository + ?Sized>(
    store: &S,
    project_id: &str,
    user: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> ApprovalStats {
    let mut stats = ApprovalStats::default();
    for log in store.logs_for_project(project_id) {
        if log.performed_by != user || log.created_at < from || log.created_at >= to {
            continue;
        }
        match log.action {
            ApprovalAction::Submit => stats.submissions += 1,
            ApprovalAction::Approve => stats.approvals += 1,
            ApprovalAction::Reject => stats.rejections += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::role::{ProjectMember, Role};
    use crate::store::MemoryStore;
    use chrono::{Duration, NaiveDate};

    fn setup() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.save_project(Project::new(
            "prj-1",
            "Launch",
            NaiveDate::from_ymd_opt(2025, 1, 1).expect("date"),
            NaiveDate::from_ymd_opt(2025, 12, 31).expect("date"),
            "lead",
        ));
        store.save_member(ProjectMember::new("prj-1", "lead", Role::Leader));
        store.save_member(ProjectMember::new("prj-1", "vice", Role::ViceLeader));
        store.save_member(ProjectMember::new("prj-1", "dev", Role::Member));
        let mut root = Task::new("t-root", "prj-1", "Ship", "lead");
        root.assignees = vec!["dev".to_string()];
        store.save_task(root);
        let mut child = Task::new("t-child", "prj-1", "Docs", "lead");
        child.parent_id = Some("t-root".to_string());
        child.level = 2;
        store.save_task(child);
        store
    }

    #[test]
    fn submit_notifies_managers_only() {
        let mut store = setup();
        let caller = Caller::now("dev");
        let outcome = submit(&mut store, &caller, "t-root", Some(" ready ".to_string()))
            .expect("submit");

        assert_eq!(outcome.value.action, ApprovalAction::Submit);
        assert_eq!(outcome.value.note.as_deref(), Some("ready"));
        let targets: Vec<&str> = outcome
            .effects
            .notifications
            .iter()
            .map(|n| n.target_user.as_str())
            .collect();
        assert_eq!(targets, vec!["lead", "vice"]);
        assert_eq!(
            outcome.effects.notifications[0].message,
            "New submission for task approval Ship with note: ready"
        );
        assert_eq!(state(&store, "t-root"), ApprovalState::Submitted);
    }

    #[test]
    fn approve_credits_submitter_and_cascades() {
        let mut store = setup();
        let submitted = submit(&mut store, &Caller::now("dev"), "t-root", None).expect("submit");
        let approved = approve(&mut store, &Caller::now("vice"), &submitted.value.id, None)
            .expect("approve");

        assert_eq!(approved.value.performed_by, "dev");
        assert_eq!(approved.value.action, ApprovalAction::Approve);
        for id in ["t-root", "t-child"] {
            let task = store.find_task(id).expect("task");
            assert_eq!(task.status, Status::Completed);
            assert_eq!(task.progress, 100);
        }
        assert!(approved
            .effects
            .notifications_for("dev")
            .any(|n| n.kind == NotificationKind::TaskApproved));
        assert_eq!(state(&store, "t-root"), ApprovalState::Approved);
    }

    #[test]
    fn member_cannot_review() {
        let mut store = setup();
        let submitted = submit(&mut store, &Caller::now("dev"), "t-root", None).expect("submit");
        let err = reject(&mut store, &Caller::now("dev"), &submitted.value.id, None)
            .expect_err("member review");
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert_eq!(store.logs_for_task("t-root").len(), 1);
    }

    #[test]
    fn non_member_cannot_submit() {
        let mut store = setup();
        let err = submit(&mut store, &Caller::now("stranger"), "t-root", None)
            .expect_err("outsider");
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert!(store.logs_for_task("t-root").is_empty());
    }

    #[test]
    fn cascade_keeps_overdue_status_but_sets_progress() {
        let mut store = setup();
        let mut child = store.find_task("t-child").expect("child");
        child.status = Status::Overdue;
        store.save_task(child);

        check_task_done(&mut store, "t-root", Utc::now()).expect("cascade");
        let child = store.find_task("t-child").expect("child");
        assert_eq!(child.status, Status::Overdue);
        assert_eq!(child.progress, 100);
    }

    #[test]
    fn stats_count_credited_rows_in_window() {
        let mut store = setup();
        let submitted = submit(&mut store, &Caller::now("dev"), "t-root", None).expect("submit");
        reject(&mut store, &Caller::now("lead"), &submitted.value.id, None).expect("reject");

        let now = Utc::now();
        let counts = stats(
            &store,
            "prj-1",
            "dev",
            now - Duration::hours(1),
            now + Duration::hours(1),
        );
        assert_eq!(
            counts,
            ApprovalStats {
                submissions: 1,
                approvals: 0,
                rejections: 1,
            }
        );
        assert_eq!(
            stats(&store, "prj-1", "lead", now - Duration::hours(1), now + Duration::hours(1)),
            ApprovalStats::default()
        );
    }
}

//! Lazy overdue detection.
//!
//! Nothing runs on a schedule: a task becomes OVERDUE the first time it is
//! read after its deadline has passed.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::notify::{Effects, EntityType, NotificationKind, Outcome};
use crate::status::Status;
use crate::store::Repository;
use crate::task::Task;

/// True when the deadline has passed and the status may still change.
pub fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
    match task.deadline {
        Some(deadline) => deadline < now && !task.status.is_terminal(),
        None => false,
    }
}

/// Flip the task to OVERDUE if its deadline has passed, notifying every
/// assignee. Re-applying to an already OVERDUE task changes nothing.
pub fn refresh_overdue_state<S: Repository + ?Sized>(
    store: &mut S,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<Outcome<Task>> {
    let mut task = store
        .find_task(task_id)
        .ok_or_else(|| Error::not_found("task", task_id))?;
    let mut effects = Effects::new();

    if is_overdue(&task, now) {
        tracing::info!(task = %task.id, previous = %task.status, "task is overdue");
        task.status = Status::Overdue;
        task.updated_at = now;
        store.save_task(task.clone());
        for user in &task.assignees {
            effects.notify(
                format!("Task {} is overdue", task.title),
                NotificationKind::TaskUpdated,
                user,
                &task.id,
                EntityType::Task,
            );
        }
    }

    Ok(Outcome::new(task, effects))
}

/// Open tasks assigned to `user` whose deadline falls in `(now, now + window]`,
/// soonest first.
pub fn due_soon<S: Repository + ?Sized>(
    store: &S,
    user: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<Task> {
    let horizon = now + window;
    let mut tasks: Vec<Task> = store
        .tasks_assigned_to(user)
        .into_iter()
        .filter(|task| !task.status.is_terminal())
        .filter(|task| matches!(task.deadline, Some(deadline) if deadline > now && deadline <= horizon))
        .collect();
    tasks.sort_by(|left, right| left.deadline.cmp(&right.deadline).then_with(|| left.id.cmp(&right.id)));
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("valid time")
    }

    fn task_due(id: &str, deadline: DateTime<Utc>, status: Status) -> Task {
        let mut task = Task::new(id, "prj-1", format!("Task {id}"), "lead");
        task.deadline = Some(deadline);
        task.status = status;
        task.assignees = vec!["alice".to_string(), "bob".to_string()];
        task
    }

    #[test]
    fn past_deadline_flips_and_notifies_assignees() {
        let mut store = MemoryStore::new();
        store.save_task(task_due("t1", now() - Duration::hours(1), Status::InProgress));

        let outcome = refresh_overdue_state(&mut store, "t1", now()).expect("refresh");
        assert_eq!(outcome.value.status, Status::Overdue);
        assert_eq!(store.find_task("t1").expect("t1").status, Status::Overdue);
        assert_eq!(outcome.effects.notifications.len(), 2);
        assert_eq!(outcome.effects.notifications[0].message, "Task Task t1 is overdue");
    }

    #[test]
    fn refresh_is_idempotent() {
        let mut store = MemoryStore::new();
        store.save_task(task_due("t1", now() - Duration::hours(1), Status::NotStarted));

        let first = refresh_overdue_state(&mut store, "t1", now()).expect("first");
        let second = refresh_overdue_state(&mut store, "t1", now()).expect("second");
        assert_eq!(first.value.status, second.value.status);
        assert!(second.effects.is_empty());
    }

    #[test]
    fn terminal_statuses_are_left_alone() {
        let mut store = MemoryStore::new();
        for (id, status) in [("c", Status::Completed), ("x", Status::Canceled)] {
            store.save_task(task_due(id, now() - Duration::days(3), status));
            let outcome = refresh_overdue_state(&mut store, id, now()).expect("refresh");
            assert_eq!(outcome.value.status, status);
        }
    }

    #[test]
    fn due_soon_filters_by_window_and_assignee() {
        let mut store = MemoryStore::new();
        store.save_task(task_due("late", now() + Duration::hours(20), Status::InProgress));
        store.save_task(task_due("soon", now() + Duration::hours(2), Status::InProgress));
        store.save_task(task_due("sooner", now() + Duration::hours(1), Status::OnHold));
        store.save_task(task_due("past", now() - Duration::hours(1), Status::InProgress));
        store.save_task(task_due("done", now() + Duration::hours(1), Status::Completed));

        let ids: Vec<String> = due_soon(&store, "alice", now(), Duration::hours(12))
            .into_iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(ids, vec!["sooner", "soon"]);
        assert!(due_soon(&store, "carol", now(), Duration::hours(12)).is_empty());
    }
}

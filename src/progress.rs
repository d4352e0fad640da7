//! Progress aggregation over the task tree.
//!
//! A leaf reports its stored progress. A parent reports the weighted mean of
//! its children, each child weighted by `priority / level`; a project weighs
//! its level-1 tasks by `priority` alone. Both levels display the truncated
//! mean plus one, unless it is already 100, so a subtree that is almost done
//! never shows a flat 100.
//!
//! `peek_*` functions only compute. `refresh_*` functions also persist the
//! displayed value on every parent task they visit (and on the project).
//! Mutations that change a task's progress, weight or place in the tree call
//! [`refresh_ancestors`] so stored values along the ancestor chain stay
//! current.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::store::Repository;
use crate::task::Task;

/// Raw values are snapped to this many decimal places before truncation, so
/// that weights such as 1/3 do not turn an exact 50 into 49.999...
const RAW_PRECISION: f64 = 1e9;

/// Apply the display rule to a raw percentage.
pub fn smooth(raw: f64) -> u8 {
    let snapped = (raw * RAW_PRECISION).round() / RAW_PRECISION;
    let truncated = snapped.trunc().clamp(0.0, 100.0) as u8;
    if truncated < 100 {
        truncated + 1
    } else {
        truncated
    }
}

fn task_weight(task: &Task) -> Result<f64> {
    if task.level == 0 {
        return Err(Error::State(format!("task {} has level 0", task.id)));
    }
    Ok(f64::from(task.priority) / f64::from(task.level))
}

/// Raw (unsmoothed) percentage of `task`, collecting the displayed value of
/// every parent visited into `updates`.
fn aggregate<S: Repository + ?Sized>(
    store: &S,
    task: &Task,
    updates: &mut Vec<(String, u8)>,
) -> Result<f64> {
    let children = store.find_children(&task.id);
    if children.is_empty() {
        return Ok(f64::from(task.progress));
    }

    let mut total_weight = 0.0;
    let mut weighted = 0.0;
    for child in &children {
        let weight = task_weight(child)?;
        let child_progress = aggregate(store, child, updates)?;
        total_weight += weight;
        weighted += weight * child_progress / 100.0;
    }

    if total_weight == 0.0 {
        return Err(Error::State(format!(
            "children of task {} have zero total weight",
            task.id
        )));
    }

    let raw = weighted / total_weight * 100.0;
    updates.push((task.id.clone(), smooth(raw)));
    Ok(raw)
}

fn load_task<S: Repository + ?Sized>(store: &S, task_id: &str) -> Result<Task> {
    store
        .find_task(task_id)
        .ok_or_else(|| Error::not_found("task", task_id))
}

fn apply_updates<S: Repository + ?Sized>(store: &mut S, updates: Vec<(String, u8)>) {
    for (task_id, progress) in updates {
        if let Some(mut task) = store.find_task(&task_id) {
            if task.progress != progress {
                task.progress = progress;
                store.save_task(task);
            }
        }
    }
}

/// Raw weighted percentage before the display rule. Leaves return their
/// stored value.
pub fn raw_task_progress<S: Repository + ?Sized>(store: &S, task_id: &str) -> Result<f64> {
    let task = load_task(store, task_id)?;
    aggregate(store, &task, &mut Vec::new())
}

/// Displayed progress of a task without writing anything.
pub fn peek_task_progress<S: Repository + ?Sized>(store: &S, task_id: &str) -> Result<u8> {
    let task = load_task(store, task_id)?;
    let mut updates = Vec::new();
    aggregate(store, &task, &mut updates)?;
    Ok(displayed(&task, &updates))
}

/// Displayed progress of a task, persisted on it and on every parent task in
/// its subtree.
pub fn refresh_task_progress<S: Repository + ?Sized>(store: &mut S, task_id: &str) -> Result<u8> {
    let task = load_task(store, task_id)?;
    let mut updates = Vec::new();
    aggregate(store, &task, &mut updates)?;
    let progress = displayed(&task, &updates);
    tracing::debug!(task = task_id, progress, parents = updates.len(), "progress refreshed");
    apply_updates(store, updates);
    Ok(progress)
}

fn displayed(task: &Task, updates: &[(String, u8)]) -> u8 {
    // The root of the aggregation is pushed last when it has children.
    match updates.last() {
        Some((id, progress)) if *id == task.id => *progress,
        _ => task.progress,
    }
}

/// Recompute the ancestor chain of `task_id` and its project after a
/// mutation. Every parent task in the tree containing `task_id` ends up with
/// its displayed progress persisted.
pub fn refresh_ancestors<S: Repository + ?Sized>(store: &mut S, task_id: &str) -> Result<()> {
    let mut top = load_task(store, task_id)?;
    let mut seen = HashSet::from([top.id.clone()]);
    while let Some(parent_id) = top.parent_id.clone() {
        let Some(parent) = store.find_task(&parent_id) else {
            break;
        };
        if !seen.insert(parent.id.clone()) {
            return Err(Error::State(format!("cycle in parent chain of task {task_id}")));
        }
        top = parent;
    }

    refresh_task_progress(store, &top.id)?;
    refresh_project_progress(store, &top.project_id)?;
    Ok(())
}

fn aggregate_project<S: Repository + ?Sized>(
    store: &S,
    project_id: &str,
    updates: &mut Vec<(String, u8)>,
) -> Result<Option<u8>> {
    let roots = store.find_root_tasks(project_id, 1);
    if roots.is_empty() {
        return Ok(None);
    }

    let mut total_weight = 0.0;
    let mut weighted = 0.0;
    for task in &roots {
        let weight = f64::from(task.priority);
        let progress = aggregate(store, task, updates)?;
        total_weight += weight;
        weighted += weight * progress / 100.0;
    }

    if total_weight == 0.0 {
        return Err(Error::State(format!(
            "root tasks of project {project_id} have zero total weight"
        )));
    }

    Ok(Some(smooth(weighted / total_weight * 100.0)))
}

/// Displayed project progress without writing anything. A project without
/// level-1 tasks reports its stored value.
pub fn peek_project_progress<S: Repository + ?Sized>(store: &S, project_id: &str) -> Result<u8> {
    let project = store
        .find_project(project_id)
        .ok_or_else(|| Error::not_found("project", project_id))?;
    let computed = aggregate_project(store, project_id, &mut Vec::new())?;
    Ok(computed.unwrap_or(project.progress))
}

/// Displayed project progress, persisted on the project and on every parent
/// task visited along the way.
pub fn refresh_project_progress<S: Repository + ?Sized>(
    store: &mut S,
    project_id: &str,
) -> Result<u8> {
    let mut project = store
        .find_project(project_id)
        .ok_or_else(|| Error::not_found("project", project_id))?;
    let mut updates = Vec::new();
    let Some(progress) = aggregate_project(store, project_id, &mut updates)? else {
        return Ok(project.progress);
    };
    apply_updates(store, updates);
    if project.progress != progress {
        project.progress = progress;
        store.save_project(project);
    }
    tracing::debug!(project = project_id, progress, "project progress refreshed");
    Ok(progress)
}

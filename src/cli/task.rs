//! tw task command implementations.

use crate::cli::{parse_deadline, Context};
use crate::config::parse_duration;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::status::Status;
use crate::task::{self, NewTask, ParentChange, Task, TaskUpdate, TaskView};

pub struct CreateOptions {
    pub project: String,
    pub title: String,
    pub parent: Option<String>,
    pub priority: Option<u32>,
    pub deadline: Option<String>,
    pub description: Option<String>,
    pub assignees: Vec<String>,
}

pub struct UpdateOptions {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<u32>,
    pub deadline: Option<String>,
    pub clear_deadline: bool,
    pub parent: Option<String>,
    pub detach: bool,
    pub assignees: Vec<String>,
}

#[derive(serde::Serialize)]
struct TaskListOutput {
    total: usize,
    tasks: Vec<Task>,
}

#[derive(serde::Serialize)]
struct TaskDeleteOutput {
    removed: Vec<String>,
}

fn task_line(task: &Task) -> String {
    let indent = "  ".repeat(task.level.saturating_sub(1) as usize);
    let mut line = format!(
        "{indent}{} [{}] {}% {}",
        task.id, task.status, task.progress, task.title
    );
    if let Some(deadline) = task.deadline {
        line.push_str(&format!(" (due {})", deadline.format("%Y-%m-%d %H:%M")));
    }
    line
}

fn summarize(human: &mut HumanOutput, task: &Task) {
    human.push_summary("id", task.id.clone());
    human.push_summary("project", task.project_id.clone());
    human.push_summary("status", task.status.to_string());
    human.push_summary("progress", format!("{}%", task.progress));
    human.push_summary("priority", task.priority.to_string());
    human.push_summary("level", task.level.to_string());
    if let Some(parent) = &task.parent_id {
        human.push_summary("parent", parent.clone());
    }
    if let Some(deadline) = task.deadline {
        human.push_summary("deadline", deadline.to_rfc3339());
    }
    if !task.assignees.is_empty() {
        human.push_summary("assignees", task.assignees.join(", "));
    }
}

pub fn run_create(ctx: &Context, options: CreateOptions) -> Result<()> {
    let priority = match options.priority {
        Some(priority) => priority,
        None => ctx.config()?.tasks.default_priority,
    };
    let mut input = NewTask::new(options.title).priority(priority);
    input.description = options.description;
    input.parent_id = options.parent;
    input.assignees = options.assignees;
    input.deadline = options.deadline.as_deref().map(parse_deadline).transpose()?;

    let (task, _) =
        ctx.mutate(|store, caller| task::create(store, caller, &options.project, input))?;

    let mut human = HumanOutput::new(format!("tw task create: {}", task.title));
    summarize(&mut human, &task);
    human.push_next_step(format!("tw task progress {} <0-100>", task.id));

    emit_success(ctx.output, "task create", &task, Some(&human))
}

pub fn run_show(ctx: &Context, id: &str, peek: bool) -> Result<()> {
    let view: TaskView = if peek {
        ctx.view(|store, caller| task::peek(store, caller, id))?
    } else {
        ctx.mutate(|store, caller| task::read(store, caller, id))?.0
    };

    let mut human = HumanOutput::new(format!("tw task show: {}", view.task.title));
    summarize(&mut human, &view.task);
    human.push_summary("approval", format!("{:?}", view.approval).to_uppercase());
    if !view.subtree_assignees.is_empty() {
        human.push_summary("subtree assignees", view.subtree_assignees.join(", "));
    }
    if let Some(description) = &view.task.description {
        human.push_detail(description.clone());
    }

    emit_success(ctx.output, "task show", &view, Some(&human))
}

pub fn run_update(ctx: &Context, options: UpdateOptions) -> Result<()> {
    let parent = if options.detach {
        Some(ParentChange::Detach)
    } else {
        options.parent.map(ParentChange::Attach)
    };
    let changes = TaskUpdate {
        title: options.title,
        description: options.description,
        priority: options.priority,
        deadline: options.deadline.as_deref().map(parse_deadline).transpose()?,
        clear_deadline: options.clear_deadline,
        parent,
        assignees: if options.assignees.is_empty() {
            None
        } else {
            Some(options.assignees)
        },
    };

    let (task, _) = ctx.mutate(|store, caller| task::update(store, caller, &options.id, changes))?;

    let mut human = HumanOutput::new(format!("tw task update: {}", task.title));
    summarize(&mut human, &task);

    emit_success(ctx.output, "task update", &task, Some(&human))
}

pub fn run_delete(ctx: &Context, id: &str) -> Result<()> {
    let (removed, _) = ctx.mutate(|store, caller| task::delete(store, caller, id))?;

    let mut human = HumanOutput::new(format!("tw task delete: removed {} task(s)", removed.len()));
    for task_id in &removed {
        human.push_detail(task_id.clone());
    }

    emit_success(ctx.output, "task delete", &TaskDeleteOutput { removed }, Some(&human))
}

pub fn run_status(ctx: &Context, id: &str, status: &str) -> Result<()> {
    let status: Status = status.parse()?;
    let (task, _) = ctx.mutate(|store, caller| task::change_status(store, caller, id, status))?;

    let mut human = HumanOutput::new(format!("tw task status: {} is {}", task.title, task.status));
    summarize(&mut human, &task);

    emit_success(ctx.output, "task status", &task, Some(&human))
}

pub fn run_progress(ctx: &Context, id: &str, value: i64) -> Result<()> {
    let (task, _) = ctx.mutate(|store, caller| task::update_progress(store, caller, id, value))?;

    let mut human = HumanOutput::new(format!("tw task progress: {} at {}%", task.title, task.progress));
    summarize(&mut human, &task);
    if task.progress == 100 {
        human.push_next_step(format!("tw approval submit {}", task.id));
    }

    emit_success(ctx.output, "task progress", &task, Some(&human))
}

pub fn run_assign(ctx: &Context, id: &str, user: &str, assign: bool) -> Result<()> {
    let (task, _) = ctx.mutate(|store, caller| {
        if assign {
            task::assign(store, caller, id, user)
        } else {
            task::unassign(store, caller, id, user)
        }
    })?;

    let command = if assign { "task assign" } else { "task unassign" };
    let mut human = HumanOutput::new(format!("tw {command}: {user}"));
    summarize(&mut human, &task);

    emit_success(ctx.output, command, &task, Some(&human))
}

pub fn run_list(ctx: &Context, project: Option<&str>) -> Result<()> {
    let (tasks, _) = ctx.mutate(|store, caller| match project {
        Some(project_id) => task::list_project_tasks(store, caller, project_id),
        None => task::list_assigned(store, caller),
    })?;

    let mut human = HumanOutput::new(format!("tw task list: {} task(s)", tasks.len()));
    for task in &tasks {
        human.push_detail(task_line(task));
    }

    let output = TaskListOutput {
        total: tasks.len(),
        tasks,
    };
    emit_success(ctx.output, "task list", &output, Some(&human))
}

pub fn run_tree(ctx: &Context, id: &str) -> Result<()> {
    let tasks = ctx.view(|store, caller| task::hierarchy(store, caller, id))?;

    let header = match tasks.first() {
        Some(root) => format!("tw task tree: {}", root.title),
        None => "tw task tree".to_string(),
    };
    let mut human = HumanOutput::new(header);
    for task in &tasks {
        human.push_detail(task_line(task));
    }

    let output = TaskListOutput {
        total: tasks.len(),
        tasks,
    };
    emit_success(ctx.output, "task tree", &output, Some(&human))
}

pub fn run_due(ctx: &Context, within: Option<&str>) -> Result<()> {
    let window = match within {
        Some(raw) => parse_duration(raw)?,
        None => ctx.config()?.tasks.due_soon_window()?,
    };
    let tasks = ctx.view(|store, caller| Ok(task::due_soon(store, caller, window)))?;

    let mut human = HumanOutput::new(format!("tw task due: {} task(s)", tasks.len()));
    for task in &tasks {
        human.push_detail(task_line(task));
    }

    let output = TaskListOutput {
        total: tasks.len(),
        tasks,
    };
    emit_success(ctx.output, "task due", &output, Some(&human))
}


//! tw project command implementations.

use crate::cli::{parse_date, Context};
use crate::error::Result;
use crate::notify::{Effects, Outcome};
use crate::output::{emit_success, HumanOutput};
use crate::project::{
    self, NewProject, Project, ProjectLog, ProjectQuery, ProjectSummary, ProjectUpdate, ProjectView,
};
use crate::status::Status;

pub struct CreateOptions {
    pub name: String,
    pub start: String,
    pub end: String,
    pub description: Option<String>,
}

pub struct UpdateOptions {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

pub struct ListOptions {
    pub search: Option<String>,
    pub status: Option<String>,
    pub role: String,
    pub sort: String,
    pub desc: bool,
}

#[derive(serde::Serialize)]
struct ProjectLogOutput {
    project_id: String,
    total: usize,
    logs: Vec<ProjectLog>,
}

#[derive(serde::Serialize)]
struct ProjectListOutput {
    total: usize,
    projects: Vec<ProjectSummary>,
}

fn summarize(human: &mut HumanOutput, project: &Project) {
    human.push_summary("id", project.id.clone());
    human.push_summary("status", project.status.to_string());
    human.push_summary("progress", format!("{}%", project.progress));
    human.push_summary(
        "dates",
        format!("{} .. {}", project.start_date, project.end_date),
    );
    if let Some(description) = &project.description {
        human.push_summary("description", description.clone());
    }
}

pub fn run_create(ctx: &Context, options: CreateOptions) -> Result<()> {
    let input = NewProject {
        name: options.name,
        description: options.description,
        start_date: parse_date(&options.start)?,
        end_date: parse_date(&options.end)?,
    };
    let (project, _) = ctx.mutate(|store, caller| project::create(store, caller, input))?;

    let mut human = HumanOutput::new(format!("tw project create: {}", project.name));
    summarize(&mut human, &project);
    human.push_next_step(format!("tw member add {} <user>", project.id));
    human.push_next_step(format!("tw task create {} <title>", project.id));

    emit_success(ctx.output, "project create", &project, Some(&human))
}

pub fn run_list(ctx: &Context, options: ListOptions) -> Result<()> {
    let query = ProjectQuery {
        search: options.search,
        status: options.status.as_deref().map(str::parse::<Status>).transpose()?,
        role: options.role.parse()?,
        sort: options.sort.parse()?,
        descending: options.desc,
    };
    let projects = ctx.view(|store, caller| Ok(project::list_for_user(store, caller, &query)))?;

    let mut human = HumanOutput::new(format!("tw project list: {} project(s)", projects.len()));
    for summary in &projects {
        human.push_detail(format!(
            "{} [{}] {}% {} ({})",
            summary.project.id,
            summary.project.status,
            summary.project.progress,
            summary.project.name,
            summary.role
        ));
    }
    if projects.is_empty() {
        human.push_next_step("tw project create <name> --start <date> --end <date>");
    }

    let output = ProjectListOutput {
        total: projects.len(),
        projects,
    };
    emit_success(ctx.output, "project list", &output, Some(&human))
}

pub fn run_stats(ctx: &Context) -> Result<()> {
    let stats = ctx.view(|store, caller| Ok(project::statistics(store, caller)))?;

    let mut human = HumanOutput::new(format!("tw project stats: {} project(s)", stats.total));
    human.push_summary("managed", stats.managed.to_string());
    human.push_summary("member", stats.member.to_string());
    for (status, count) in &stats.by_status {
        human.push_detail(format!("{status}: {count}"));
    }

    emit_success(ctx.output, "project stats", &stats, Some(&human))
}

pub fn run_log(ctx: &Context, id: &str, from: Option<&str>, to: Option<&str>) -> Result<()> {
    let from = from.map(parse_date).transpose()?;
    let to = to.map(parse_date).transpose()?;
    let logs = ctx.view(|store, caller| project::logs(store, caller, id, from, to))?;

    let mut human = HumanOutput::new(format!("tw project log: {} entr(ies)", logs.len()));
    for log in &logs {
        human.push_detail(format!(
            "{} {} [{}] {}% {}",
            log.created_at.format("%Y-%m-%d %H:%M"),
            log.action,
            log.status,
            log.progress,
            log.description
        ));
    }

    let output = ProjectLogOutput {
        project_id: id.to_string(),
        total: logs.len(),
        logs,
    };
    emit_success(ctx.output, "project log", &output, Some(&human))
}

pub fn run_show(ctx: &Context, id: &str, peek: bool) -> Result<()> {
    let view: ProjectView = if peek {
        ctx.view(|store, caller| project::peek(store, caller, id))?
    } else {
        ctx.mutate(|store, caller| {
            project::read(store, caller, id).map(|view| Outcome::new(view, Effects::new()))
        })?
        .0
    };

    let mut human = HumanOutput::new(format!("tw project show: {}", view.project.name));
    summarize(&mut human, &view.project);
    human.push_summary("tasks", view.task_count.to_string());
    for member in &view.members {
        human.push_detail(format!("{} ({})", member.user_id, member.role));
    }

    emit_success(ctx.output, "project show", &view, Some(&human))
}

pub fn run_update(ctx: &Context, options: UpdateOptions) -> Result<()> {
    let changes = ProjectUpdate {
        name: options.name,
        description: options.description,
        start_date: options.start.as_deref().map(parse_date).transpose()?,
        end_date: options.end.as_deref().map(parse_date).transpose()?,
    };
    let (project, report) =
        ctx.mutate(|store, caller| project::update(store, caller, &options.id, changes))?;

    let mut human = HumanOutput::new(format!("tw project update: {}", project.name));
    summarize(&mut human, &project);
    human.push_summary("notified", report.delivered.to_string());

    emit_success(ctx.output, "project update", &project, Some(&human))
}

pub fn run_status(ctx: &Context, id: &str, status: &str) -> Result<()> {
    let status: Status = status.parse()?;
    let (project, _) = ctx.mutate(|store, caller| project::update_status(store, caller, id, status))?;

    let mut human = HumanOutput::new(format!("tw project status: {} is {}", project.name, project.status));
    summarize(&mut human, &project);

    emit_success(ctx.output, "project status", &project, Some(&human))
}

pub fn run_delete(ctx: &Context, id: &str) -> Result<()> {
    let (project, report) = ctx.mutate(|store, caller| project::delete(store, caller, id))?;

    let mut human = HumanOutput::new(format!("tw project delete: {}", project.name));
    human.push_summary("id", project.id.clone());
    human.push_summary("notified", report.delivered.to_string());

    emit_success(ctx.output, "project delete", &project, Some(&human))
}

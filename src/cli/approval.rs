//! tw approval command implementations.

use chrono::{DateTime, NaiveTime, Utc};

use crate::approval::{self, ApprovalLog, ApprovalStats};
use crate::cli::{parse_date, Context};
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};
use crate::permission::{self, Operation};
use crate::store::Repository;

pub struct StatsOptions {
    pub project: String,
    pub user: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(serde::Serialize)]
struct HistoryOutput {
    task_id: String,
    total: usize,
    logs: Vec<ApprovalLog>,
}

#[derive(serde::Serialize)]
struct StatsOutput {
    project_id: String,
    user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<DateTime<Utc>>,
    #[serde(flatten)]
    stats: ApprovalStats,
}

fn log_line(log: &ApprovalLog) -> String {
    let mut line = format!(
        "{} {} {} by {}",
        log.created_at.format("%Y-%m-%d %H:%M"),
        log.id,
        log.action,
        log.performed_by
    );
    if let Some(note) = &log.note {
        line.push_str(&format!(": {note}"));
    }
    line
}

pub fn run_submit(ctx: &Context, task_id: &str, note: Option<String>) -> Result<()> {
    let (log, report) = ctx.mutate(|store, caller| approval::submit(store, caller, task_id, note))?;

    let mut human = HumanOutput::new(format!("tw approval submit: {}", log.id));
    human.push_summary("task", log.task_id.clone());
    human.push_summary("reviewers notified", report.delivered.to_string());
    human.push_next_step(format!("tw approval approve {}", log.id));

    emit_success(ctx.output, "approval submit", &log, Some(&human))
}

pub fn run_review(ctx: &Context, log_id: &str, note: Option<String>, approve: bool) -> Result<()> {
    let (log, _) = ctx.mutate(|store, caller| {
        if approve {
            approval::approve(store, caller, log_id, note)
        } else {
            approval::reject(store, caller, log_id, note)
        }
    })?;

    let command = if approve {
        "approval approve"
    } else {
        "approval reject"
    };
    let mut human = HumanOutput::new(format!("tw {command}: {}", log.id));
    human.push_summary("task", log.task_id.clone());
    human.push_summary("credited to", log.performed_by.clone());
    if approve {
        human.push_next_step(format!("tw task tree {}", log.task_id));
    }

    emit_success(ctx.output, command, &log, Some(&human))
}

pub fn run_history(ctx: &Context, task_id: &str) -> Result<()> {
    let logs = ctx.view(|store, caller| approval::history(store, caller, task_id))?;

    let mut human = HumanOutput::new(format!("tw approval history: {} row(s)", logs.len()));
    for log in &logs {
        human.push_detail(log_line(log));
    }

    let output = HistoryOutput {
        task_id: task_id.to_string(),
        total: logs.len(),
        logs,
    };
    emit_success(ctx.output, "approval history", &output, Some(&human))
}

fn start_of_day(raw: &str) -> Result<DateTime<Utc>> {
    let midnight = NaiveTime::from_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::InvalidArgument(format!("invalid date '{raw}'")))?;
    Ok(parse_date(raw)?.and_time(midnight).and_utc())
}

pub fn run_stats(ctx: &Context, options: StatsOptions) -> Result<()> {
    let from = options.from.as_deref().map(start_of_day).transpose()?;
    let to = options.to.as_deref().map(start_of_day).transpose()?;

    let output = ctx.view(|store, caller| {
        store
            .find_project(&options.project)
            .ok_or_else(|| Error::not_found("project", &options.project))?;
        permission::require(store, &options.project, &caller.user, Operation::ViewProject)?;

        let user = options.user.clone().unwrap_or_else(|| caller.user.clone());
        let stats = approval::stats(
            store,
            &options.project,
            &user,
            from.unwrap_or(DateTime::<Utc>::MIN_UTC),
            to.unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
        Ok(StatsOutput {
            project_id: options.project.clone(),
            user,
            from,
            to,
            stats,
        })
    })?;

    let mut human = HumanOutput::new(format!("tw approval stats: {}", output.user));
    human.push_summary("project", output.project_id.clone());
    human.push_summary("submissions", output.stats.submissions.to_string());
    human.push_summary("approvals", output.stats.approvals.to_string());
    human.push_summary("rejections", output.stats.rejections.to_string());

    emit_success(ctx.output, "approval stats", &output, Some(&human))
}

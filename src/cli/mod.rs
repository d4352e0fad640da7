//! Command-line interface for tw
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};

use crate::actor::{resolve_actor, Caller};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::notify::{self, Destination, DispatchReport, Effects, JsonlNotifier, Outcome};
use crate::output::OutputOptions;
use crate::storage::Storage;
use crate::store::MemoryStore;

mod actor;
mod approval;
mod init;
mod member;
mod project;
mod task;

/// tw - teamwork
///
/// Projects, task trees with rolled-up progress, deadlines and approval
/// reviews, stored under `.teamwork/` in the workspace root.
#[derive(Parser, Debug)]
#[command(name = "tw")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Workspace root holding `.teamwork/` (defaults to current directory)
    #[arg(long, global = true, env = "TEAMWORK_ROOT")]
    pub root: Option<PathBuf>,

    /// Acting user for this command
    #[arg(long, global = true, env = "TEAMWORK_ACTOR")]
    pub actor: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize teamwork storage in the workspace
    Init,

    /// Set or show actor identity
    #[command(subcommand)]
    Actor(ActorCommands),

    /// Project management
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Project membership and roles
    #[command(subcommand)]
    Member(MemberCommands),

    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Approval reviews
    #[command(subcommand)]
    Approval(ApprovalCommands),
}

/// Actor subcommands
#[derive(Subcommand, Debug)]
pub enum ActorCommands {
    /// Set actor identity
    Set {
        /// Actor name
        name: String,
    },

    /// Show current actor
    Show,
}

/// Project subcommands
#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a project; you become its leader
    Create {
        /// Project name
        name: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// List projects you belong to
    List {
        /// Case-insensitive text to find in the name or description
        #[arg(long)]
        search: Option<String>,

        /// Only projects with this status
        #[arg(long)]
        status: Option<String>,

        /// all, managed (leader or vice leader) or member
        #[arg(long, default_value = "all")]
        role: String,

        /// name, start_date, end_date, progress, status, created_at or updated_at
        #[arg(long, default_value = "name")]
        sort: String,

        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// Count your projects by status and role
    Stats,

    /// Show a project's audit trail
    Log {
        id: String,

        /// First day to include (defaults to the project start)
        #[arg(long)]
        from: Option<String>,

        /// Last day to include (defaults to today)
        #[arg(long)]
        to: Option<String>,
    },

    /// Show a project, refreshing its progress
    Show {
        id: String,

        /// Compute progress without writing anything
        #[arg(long)]
        peek: bool,
    },

    /// Edit project fields
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },

    /// Set project status
    Status {
        id: String,

        /// NOT_STARTED, IN_PROGRESS, COMPLETED, ON_HOLD, CANCELED or OVERDUE
        status: String,
    },

    /// Delete a project with its tasks and memberships
    Delete { id: String },
}

/// Member subcommands
#[derive(Subcommand, Debug)]
pub enum MemberCommands {
    /// List project members and roles
    List { project: String },

    /// Add a user as a member
    Add { project: String, user: String },

    /// Remove a member and their task assignments
    Remove { project: String, user: String },

    /// Promote a member to vice leader
    Promote { project: String, user: String },

    /// Demote a vice leader to member
    Demote { project: String, user: String },

    /// Hand project leadership to another member
    Leader { project: String, user: String },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task in a project
    Create {
        /// Project id
        project: String,

        /// Task title
        title: String,

        /// Parent task id
        #[arg(long)]
        parent: Option<String>,

        /// Aggregation weight (defaults to tasks.default_priority)
        #[arg(long)]
        priority: Option<u32>,

        /// Deadline (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        deadline: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Assign a project member (repeatable)
        #[arg(long = "assign")]
        assignees: Vec<String>,
    },

    /// Show a task, applying overdue and progress refresh
    Show {
        id: String,

        /// Compute progress without writing anything
        #[arg(long)]
        peek: bool,
    },

    /// Edit task fields
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        priority: Option<u32>,

        /// Deadline (YYYY-MM-DD or RFC 3339)
        #[arg(long, conflicts_with = "clear_deadline")]
        deadline: Option<String>,

        #[arg(long)]
        clear_deadline: bool,

        /// Move under another task
        #[arg(long, conflicts_with = "detach")]
        parent: Option<String>,

        /// Make the task a root task
        #[arg(long)]
        detach: bool,

        /// Replace the assignee list (repeatable)
        #[arg(long = "assign")]
        assignees: Vec<String>,
    },

    /// Delete a task and its subtree
    Delete { id: String },

    /// Set task status
    Status {
        id: String,

        /// NOT_STARTED, IN_PROGRESS, COMPLETED, ON_HOLD, CANCELED or OVERDUE
        status: String,
    },

    /// Set a task's own progress (0-100)
    Progress {
        id: String,

        #[arg(allow_hyphen_values = true)]
        value: i64,
    },

    /// Assign a project member
    Assign { id: String, user: String },

    /// Remove an assignee
    Unassign { id: String, user: String },

    /// List tasks of a project, or your assigned tasks
    List {
        /// Project id (omit to list tasks assigned to you)
        #[arg(long)]
        project: Option<String>,
    },

    /// Show the whole tree containing a task
    Tree { id: String },

    /// Your open tasks due soon
    Due {
        /// Window such as "12h" or "2d" (defaults to tasks.due_soon_window)
        #[arg(long)]
        within: Option<String>,
    },
}

/// Approval subcommands
#[derive(Subcommand, Debug)]
pub enum ApprovalCommands {
    /// Submit a task for review
    Submit {
        task: String,

        #[arg(long)]
        note: Option<String>,
    },

    /// Approve a submission and complete the task subtree
    Approve {
        /// Approval log id of the submission
        log: String,

        #[arg(long)]
        note: Option<String>,
    },

    /// Reject a submission
    Reject {
        /// Approval log id of the submission
        log: String,

        #[arg(long)]
        note: Option<String>,
    },

    /// Approval history of a task
    History { task: String },

    /// Count a user's approval rows in a project
    Stats {
        project: String,

        /// User to count (defaults to you)
        #[arg(long)]
        user: Option<String>,

        /// Inclusive start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Exclusive end date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
}

/// Resolved global options shared by every command.
pub struct Context {
    pub root: PathBuf,
    pub actor: Option<String>,
    pub output: OutputOptions,
}

impl Context {
    pub fn storage(&self) -> Storage {
        Storage::new(&self.root)
    }

    pub fn config(&self) -> Result<Config> {
        Config::load_from_root(&self.root)
    }

    /// The acting user at the current instant. Commands that touch project
    /// data require a named actor.
    pub fn caller(&self) -> Result<Caller> {
        let user = resolve_actor(Some(&self.root), self.actor.as_deref())?;
        if user == "unknown" {
            return Err(Error::InvalidArgument(
                "no actor set; pass --actor or run `tw actor set <name>`".to_string(),
            ));
        }
        Ok(Caller::now(user))
    }

    /// Run `op` inside a locked transaction, commit, then deliver its effects.
    /// Nothing is written when `op` fails.
    pub fn mutate<T>(
        &self,
        op: impl FnOnce(&mut MemoryStore, &Caller) -> Result<Outcome<T>>,
    ) -> Result<(T, DispatchReport)> {
        let caller = self.caller()?;
        let storage = self.storage();
        let mut tx = storage.begin()?;
        let outcome = op(&mut tx.store, &caller)?;
        tx.commit()?;
        let report = self.dispatch(&outcome.effects)?;
        Ok((outcome.value, report))
    }

    /// Read-only access to the committed state.
    pub fn view<T>(&self, op: impl FnOnce(&MemoryStore, &Caller) -> Result<T>) -> Result<T> {
        let caller = self.caller()?;
        let store = self.storage().load()?;
        op(&store, &caller)
    }

    fn dispatch(&self, effects: &Effects) -> Result<DispatchReport> {
        if effects.is_empty() {
            return Ok(DispatchReport::default());
        }
        let config = self.config()?;
        let notifications = Destination::parse(&config.notifications.destination, &self.root);
        let activities = Destination::parse(&config.notifications.activity_destination, &self.root);
        match JsonlNotifier::open(&notifications, &activities) {
            Ok(mut notifier) => Ok(notify::dispatch(effects, &mut notifier)),
            Err(err) => {
                tracing::warn!(error = %err, "notification sink unavailable; effects dropped");
                Ok(DispatchReport {
                    failed: effects.notifications.len() + effects.activities.len(),
                    ..DispatchReport::default()
                })
            }
        }
    }
}

/// Parse a calendar date (YYYY-MM-DD).
pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidArgument(format!("invalid date '{raw}' (expected YYYY-MM-DD)")))
}

/// Parse a deadline. A bare date means the end of that day in UTC.
pub(crate) fn parse_deadline(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = parse_date(trimmed)?;
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)
        .ok_or_else(|| Error::InvalidArgument(format!("invalid deadline '{raw}'")))?;
    Ok(date.and_time(end_of_day).and_utc())
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let root = match self.root {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        let ctx = Context {
            root,
            actor: self.actor,
            output: OutputOptions {
                json: self.json,
                quiet: self.quiet,
            },
        };

        match self.command {
            Commands::Init => init::run(&ctx),
            Commands::Actor(cmd) => match cmd {
                ActorCommands::Set { name } => actor::run_set(&ctx, &name),
                ActorCommands::Show => actor::run_show(&ctx),
            },
            Commands::Project(cmd) => match cmd {
                ProjectCommands::Create {
                    name,
                    start,
                    end,
                    description,
                } => project::run_create(
                    &ctx,
                    project::CreateOptions {
                        name,
                        start,
                        end,
                        description,
                    },
                ),
                ProjectCommands::List {
                    search,
                    status,
                    role,
                    sort,
                    desc,
                } => project::run_list(
                    &ctx,
                    project::ListOptions {
                        search,
                        status,
                        role,
                        sort,
                        desc,
                    },
                ),
                ProjectCommands::Stats => project::run_stats(&ctx),
                ProjectCommands::Log { id, from, to } => {
                    project::run_log(&ctx, &id, from.as_deref(), to.as_deref())
                }
                ProjectCommands::Show { id, peek } => project::run_show(&ctx, &id, peek),
                ProjectCommands::Update {
                    id,
                    name,
                    description,
                    start,
                    end,
                } => project::run_update(
                    &ctx,
                    project::UpdateOptions {
                        id,
                        name,
                        description,
                        start,
                        end,
                    },
                ),
                ProjectCommands::Status { id, status } => project::run_status(&ctx, &id, &status),
                ProjectCommands::Delete { id } => project::run_delete(&ctx, &id),
            },
            Commands::Member(cmd) => match cmd {
                MemberCommands::List { project } => member::run_list(&ctx, &project),
                MemberCommands::Add { project, user } => {
                    member::run_change(&ctx, member::Change::Add, &project, &user)
                }
                MemberCommands::Remove { project, user } => {
                    member::run_change(&ctx, member::Change::Remove, &project, &user)
                }
                MemberCommands::Promote { project, user } => {
                    member::run_change(&ctx, member::Change::Promote, &project, &user)
                }
                MemberCommands::Demote { project, user } => {
                    member::run_change(&ctx, member::Change::Demote, &project, &user)
                }
                MemberCommands::Leader { project, user } => {
                    member::run_change(&ctx, member::Change::Leader, &project, &user)
                }
            },
            Commands::Task(cmd) => match cmd {
                TaskCommands::Create {
                    project,
                    title,
                    parent,
                    priority,
                    deadline,
                    description,
                    assignees,
                } => task::run_create(
                    &ctx,
                    task::CreateOptions {
                        project,
                        title,
                        parent,
                        priority,
                        deadline,
                        description,
                        assignees,
                    },
                ),
                TaskCommands::Show { id, peek } => task::run_show(&ctx, &id, peek),
                TaskCommands::Update {
                    id,
                    title,
                    description,
                    priority,
                    deadline,
                    clear_deadline,
                    parent,
                    detach,
                    assignees,
                } => task::run_update(
                    &ctx,
                    task::UpdateOptions {
                        id,
                        title,
                        description,
                        priority,
                        deadline,
                        clear_deadline,
                        parent,
                        detach,
                        assignees,
                    },
                ),
                TaskCommands::Delete { id } => task::run_delete(&ctx, &id),
                TaskCommands::Status { id, status } => task::run_status(&ctx, &id, &status),
                TaskCommands::Progress { id, value } => task::run_progress(&ctx, &id, value),
                TaskCommands::Assign { id, user } => task::run_assign(&ctx, &id, &user, true),
                TaskCommands::Unassign { id, user } => task::run_assign(&ctx, &id, &user, false),
                TaskCommands::List { project } => task::run_list(&ctx, project.as_deref()),
                TaskCommands::Tree { id } => task::run_tree(&ctx, &id),
                TaskCommands::Due { within } => task::run_due(&ctx, within.as_deref()),
            },
            Commands::Approval(cmd) => match cmd {
                ApprovalCommands::Submit { task, note } => approval::run_submit(&ctx, &task, note),
                ApprovalCommands::Approve { log, note } => {
                    approval::run_review(&ctx, &log, note, true)
                }
                ApprovalCommands::Reject { log, note } => {
                    approval::run_review(&ctx, &log, note, false)
                }
                ApprovalCommands::History { task } => approval::run_history(&ctx, &task),
                ApprovalCommands::Stats {
                    project,
                    user,
                    from,
                    to,
                } => approval::run_stats(
                    &ctx,
                    approval::StatsOptions {
                        project,
                        user,
                        from,
                        to,
                    },
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn bare_date_deadline_is_end_of_day() {
        let deadline = parse_deadline("2025-12-31").expect("deadline");
        assert_eq!(deadline.year(), 2025);
        assert_eq!(deadline.hour(), 23);
        assert_eq!(deadline.date_naive(), parse_date("2025-12-31").expect("date"));
    }

    #[test]
    fn rfc3339_deadline_is_converted_to_utc() {
        let deadline = parse_deadline("2025-06-01T10:00:00+02:00").expect("deadline");
        assert_eq!(deadline.hour(), 8);
    }

    #[test]
    fn bad_dates_are_invalid_arguments() {
        let err = parse_date("31/12/2025").expect_err("format");
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn cli_parses_repeatable_assign() {
        let cli = Cli::try_parse_from([
            "tw", "task", "create", "prj-1", "Plan", "--assign", "dev", "--assign", "qa",
        ])
        .expect("parse");
        match cli.command {
            Commands::Task(TaskCommands::Create { assignees, .. }) => {
                assert_eq!(assignees, vec!["dev", "qa"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

//! Projects, membership management and the project service.
//!
//! Each project has exactly one LEADER. Membership changes go through the
//! permission gate like every other mutation. Creation, reads, edits and
//! status changes leave a [`ProjectLog`] entry with the progress and status
//! seen at that moment.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::Caller;
use crate::error::{Error, Result};
use crate::notify::{ActivityKind, Effects, EntityType, NotificationKind, Outcome};
use crate::permission::{self, Operation};
use crate::progress;
use crate::role::{ProjectMember, Role};
use crate::status::Status;
use crate::store::{new_id, Repository};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: Status,
    /// Derived from the task tree; refreshed on read and on task mutations.
    pub progress: u8,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            status: Status::NotStarted,
            progress: 0,
            start_date,
            end_date,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub members: Vec<ProjectMember>,
    pub task_count: usize,
}

/// A project together with the caller's role in it.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectAction {
    Created,
    Read,
    Updated,
    StatusChanged,
}

impl fmt::Display for ProjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProjectAction::Created => "CREATED",
            ProjectAction::Read => "READ",
            ProjectAction::Updated => "UPDATED",
            ProjectAction::StatusChanged => "STATUS_CHANGED",
        })
    }
}

/// One audit row: what happened and the project's state right after.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectLog {
    pub id: String,
    pub project_id: String,
    pub action: ProjectAction,
    pub description: String,
    pub progress: u8,
    pub status: Status,
    pub performed_by: String,
    pub created_at: DateTime<Utc>,
}

/// Which memberships `list_for_user` keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoleFilter {
    #[default]
    All,
    /// LEADER or VICE_LEADER.
    Managed,
    Member,
}

impl RoleFilter {
    fn keeps(self, role: Role) -> bool {
        match self {
            RoleFilter::All => true,
            RoleFilter::Managed => role.is_manager(),
            RoleFilter::Member => role == Role::Member,
        }
    }
}

impl FromStr for RoleFilter {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(RoleFilter::All),
            "managed" => Ok(RoleFilter::Managed),
            "member" => Ok(RoleFilter::Member),
            other => Err(Error::InvalidArgument(format!(
                "unknown role filter '{other}' (expected one of: all, managed, member)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Name,
    StartDate,
    EndDate,
    Progress,
    Status,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    fn compare(self, a: &Project, b: &Project) -> Ordering {
        match self {
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::StartDate => a.start_date.cmp(&b.start_date),
            SortField::EndDate => a.end_date.cmp(&b.end_date),
            SortField::Progress => a.progress.cmp(&b.progress),
            SortField::Status => a.status.as_str().cmp(b.status.as_str()),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        }
    }
}

impl FromStr for SortField {
    type Err = Error;

    /// Accepts `start_date`, `start-date` and `startdate`.
    fn from_str(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', '-'], "");
        match normalized.as_str() {
            "name" => Ok(SortField::Name),
            "startdate" => Ok(SortField::StartDate),
            "enddate" => Ok(SortField::EndDate),
            "progress" => Ok(SortField::Progress),
            "status" => Ok(SortField::Status),
            "createdat" => Ok(SortField::CreatedAt),
            "updatedat" => Ok(SortField::UpdatedAt),
            _ => Err(Error::InvalidArgument(format!(
                "unknown sort field '{}' (expected one of: name, start_date, end_date, progress, status, created_at, updated_at)",
                raw.trim()
            ))),
        }
    }
}

/// Filters for [`list_for_user`]. The default keeps every membership,
/// sorted by name ascending.
#[derive(Debug, Clone, Default)]
pub struct ProjectQuery {
    /// Case-insensitive substring of the name or description.
    pub search: Option<String>,
    pub status: Option<Status>,
    pub role: RoleFilter,
    pub sort: SortField,
    pub descending: bool,
}

impl ProjectQuery {
    fn matches(&self, project: &Project, role: Role) -> bool {
        if !self.role.keeps(role) {
            return false;
        }
        if self.status.is_some_and(|status| status != project.status) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|text| !text.is_empty()) {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                project.name.to_lowercase().contains(&needle)
                    || project
                        .description
                        .as_deref()
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
            }
        }
    }
}

/// Counts over the caller's projects.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectStatistics {
    pub total: usize,
    pub managed: usize,
    pub member: usize,
    /// Keyed by status name; statuses with no project are omitted.
    pub by_status: BTreeMap<String, usize>,
}

fn load_project<S: Repository + ?Sized>(store: &S, project_id: &str) -> Result<Project> {
    store
        .find_project(project_id)
        .ok_or_else(|| Error::not_found("project", project_id))
}

fn load_member<S: Repository + ?Sized>(
    store: &S,
    project_id: &str,
    user: &str,
) -> Result<ProjectMember> {
    store
        .find_member(project_id, user)
        .ok_or_else(|| Error::not_found("project member", user))
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid("project name cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn validate_dates(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end < start {
        return Err(Error::invalid(format!(
            "end date {end} is before start date {start}"
        )));
    }
    Ok(())
}

fn notify_members<S: Repository + ?Sized>(
    store: &S,
    effects: &mut Effects,
    project: &Project,
    message: &str,
    kind: NotificationKind,
) {
    for member in store.members(&project.id) {
        effects.notify(message, kind, &member.user_id, &project.id, EntityType::Project);
    }
}

fn record_log<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project: &Project,
    action: ProjectAction,
    description: String,
) {
    store.save_project_log(ProjectLog {
        id: new_id("plg"),
        project_id: project.id.clone(),
        action,
        description,
        progress: project.progress,
        status: project.status,
        performed_by: caller.user.clone(),
        created_at: caller.now,
    });
}

fn build_view<S: Repository + ?Sized>(store: &S, project: Project) -> ProjectView {
    ProjectView {
        members: store.members(&project.id),
        task_count: store.tasks_in_project(&project.id).len(),
        project,
    }
}

/// Create a project. The caller becomes its LEADER.
pub fn create<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    input: NewProject,
) -> Result<Outcome<Project>> {
    let name = validate_name(&input.name)?;
    validate_dates(input.start_date, input.end_date)?;

    let mut project = Project::new(
        new_id("prj"),
        name,
        input.start_date,
        input.end_date,
        &caller.user,
    );
    project.description = input.description.filter(|text| !text.trim().is_empty());
    project.created_at = caller.now;
    project.updated_at = caller.now;
    store.save_project(project.clone());

    let mut leader = ProjectMember::new(&project.id, &caller.user, Role::Leader);
    leader.joined_at = caller.now;
    store.save_member(leader);
    record_log(
        store,
        caller,
        &project,
        ProjectAction::Created,
        format!("Project created by user: {}", caller.user),
    );

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Created project: {}", project.name),
        EntityType::Project,
        &project.id,
        ActivityKind::CreatedProject,
    );
    tracing::info!(project = %project.id, leader = %caller.user, "project created");
    Ok(Outcome::new(project, effects))
}

/// Refresh-and-read: recomputes and persists progress, and starts a
/// NOT_STARTED project once its start date is reached.
pub fn read<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
) -> Result<ProjectView> {
    load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::ViewProject)?;

    let shown = progress::refresh_project_progress(store, project_id)?;
    let mut project = load_project(store, project_id)?;
    project.progress = shown;
    if project.status == Status::NotStarted && caller.now.date_naive() >= project.start_date {
        project.status = Status::InProgress;
        project.updated_at = caller.now;
        store.save_project(project.clone());
        record_log(
            store,
            caller,
            &project,
            ProjectAction::StatusChanged,
            format!("Project status changed to {} by user: {}", project.status, caller.user),
        );
        tracing::debug!(project = project_id, "project started");
    }
    record_log(
        store,
        caller,
        &project,
        ProjectAction::Read,
        format!("Project viewed by user: {}", caller.user),
    );
    Ok(build_view(store, project))
}

/// Side-effect free read.
pub fn peek<S: Repository + ?Sized>(
    store: &S,
    caller: &Caller,
    project_id: &str,
) -> Result<ProjectView> {
    let mut project = load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::ViewProject)?;
    project.progress = progress::peek_project_progress(store, project_id)?;
    Ok(build_view(store, project))
}

/// Projects the caller belongs to, filtered and sorted by `query`.
pub fn list_for_user<S: Repository + ?Sized>(
    store: &S,
    caller: &Caller,
    query: &ProjectQuery,
) -> Vec<ProjectSummary> {
    let mut projects: Vec<ProjectSummary> = store
        .projects()
        .into_iter()
        .filter_map(|project| {
            store
                .find_membership(&project.id, &caller.user)
                .map(|role| ProjectSummary { project, role })
        })
        .filter(|summary| query.matches(&summary.project, summary.role))
        .collect();
    projects.sort_by(|a, b| {
        let order = query.sort.compare(&a.project, &b.project);
        if query.descending {
            order.reverse()
        } else {
            order
        }
    });
    projects
}

/// Status and role counts over every project the caller belongs to.
pub fn statistics<S: Repository + ?Sized>(store: &S, caller: &Caller) -> ProjectStatistics {
    let mut stats = ProjectStatistics {
        total: 0,
        managed: 0,
        member: 0,
        by_status: BTreeMap::new(),
    };
    for summary in list_for_user(store, caller, &ProjectQuery::default()) {
        if summary.role.is_manager() {
            stats.managed += 1;
        } else {
            stats.member += 1;
        }
        *stats
            .by_status
            .entry(summary.project.status.to_string())
            .or_default() += 1;
    }
    stats.total = stats.managed + stats.member;
    stats
}

/// Audit rows for a project whose timestamps fall within `from..=to`.
///
/// `from` defaults to the earlier of the start date and the creation day;
/// `to` defaults to the caller's current day.
pub fn logs<S: Repository + ?Sized>(
    store: &S,
    caller: &Caller,
    project_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<ProjectLog>> {
    let project = load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::ViewProject)?;

    let from = from.unwrap_or_else(|| project.start_date.min(project.created_at.date_naive()));
    let to = to.unwrap_or_else(|| caller.now.date_naive());
    if to < from {
        return Err(Error::invalid(format!("log window ends ({to}) before it starts ({from})")));
    }
    Ok(store
        .project_logs(project_id)
        .into_iter()
        .filter(|log| (from..=to).contains(&log.created_at.date_naive()))
        .collect())
}

pub fn update<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
    changes: ProjectUpdate,
) -> Result<Outcome<Project>> {
    let mut project = load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::UpdateProject)?;

    if let Some(name) = &changes.name {
        project.name = validate_name(name)?;
    }
    if let Some(description) = changes.description {
        project.description = Some(description).filter(|text| !text.trim().is_empty());
    }
    let start = changes.start_date.unwrap_or(project.start_date);
    let end = changes.end_date.unwrap_or(project.end_date);
    validate_dates(start, end)?;
    project.start_date = start;
    project.end_date = end;
    project.updated_at = caller.now;
    store.save_project(project.clone());
    record_log(
        store,
        caller,
        &project,
        ProjectAction::Updated,
        format!("Project updated by user: {}", caller.user),
    );

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Updated project: {}", project.name),
        EntityType::Project,
        &project.id,
        ActivityKind::UpdatedProject,
    );
    notify_members(
        store,
        &mut effects,
        &project,
        &format!("Project Updated {}", project.name),
        NotificationKind::ProjectUpdated,
    );
    Ok(Outcome::new(project, effects))
}

pub fn update_status<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
    status: Status,
) -> Result<Outcome<Project>> {
    let mut project = load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::UpdateProject)?;

    project.status = status;
    project.updated_at = caller.now;
    store.save_project(project.clone());
    record_log(
        store,
        caller,
        &project,
        ProjectAction::StatusChanged,
        format!("Project status changed to {status} by user: {}", caller.user),
    );

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Updated project status to {status} for project: {}", project.name),
        EntityType::Project,
        &project.id,
        ActivityKind::UpdatedProject,
    );
    notify_members(
        store,
        &mut effects,
        &project,
        &format!("Project Status Updated: {}", project.name),
        NotificationKind::ProjectUpdated,
    );
    Ok(Outcome::new(project, effects))
}

/// Delete a project with its tasks and memberships. Approval history is kept.
pub fn delete<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
) -> Result<Outcome<Project>> {
    let project = load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::DeleteProject)?;

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Deleted project: {}", project.name),
        EntityType::Project,
        &project.id,
        ActivityKind::DeletedProject,
    );
    notify_members(
        store,
        &mut effects,
        &project,
        &format!("Project Deleted: {}", project.name),
        NotificationKind::ProjectDeleted,
    );

    store.delete_project(project_id);
    tracing::info!(project = project_id, "project deleted");
    Ok(Outcome::new(project, effects))
}

/// Add `user` as a MEMBER.
pub fn add_member<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
    user: &str,
) -> Result<Outcome<Vec<ProjectMember>>> {
    let project = load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::AddMember)?;

    let user = user.trim();
    if user.is_empty() {
        return Err(Error::invalid("user id cannot be empty"));
    }
    if store.find_membership(project_id, user).is_some() {
        return Err(Error::invalid(format!(
            "{user} is already a member of this project"
        )));
    }

    let mut member = ProjectMember::new(project_id, user, Role::Member);
    member.joined_at = caller.now;
    store.save_member(member);

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Added member {user} to project: {}", project.name),
        EntityType::Project,
        &project.id,
        ActivityKind::UpdatedProjectMember,
    );
    effects.notify(
        format!("You have been added to project: {}", project.name),
        NotificationKind::ProjectUpdated,
        user,
        &project.id,
        EntityType::Project,
    );
    Ok(Outcome::new(store.members(project_id), effects))
}

/// Hand leadership to `new_leader`; the old leader becomes a MEMBER.
pub fn change_leader<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
    new_leader: &str,
) -> Result<Outcome<Vec<ProjectMember>>> {
    let project = load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::ChangeLeader)?;

    let mut incoming = load_member(store, project_id, new_leader)?;
    if incoming.role == Role::Leader {
        return Err(Error::invalid(format!("{new_leader} is already the leader")));
    }

    for mut member in store.members(project_id) {
        if member.role == Role::Leader {
            member.role = Role::Member;
            store.save_member(member);
        }
    }
    incoming.role = Role::Leader;
    store.save_member(incoming);

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Changed leader of project {} to {new_leader}", project.name),
        EntityType::Project,
        &project.id,
        ActivityKind::UpdatedProjectMember,
    );
    effects.notify(
        format!("You are now the leader of project: {}", project.name),
        NotificationKind::ProjectUpdated,
        new_leader,
        &project.id,
        EntityType::Project,
    );
    tracing::info!(project = project_id, from = %caller.user, to = new_leader, "leader changed");
    Ok(Outcome::new(store.members(project_id), effects))
}

pub fn promote<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
    user: &str,
) -> Result<Outcome<Vec<ProjectMember>>> {
    let project = load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::PromoteMember)?;

    let mut member = load_member(store, project_id, user)?;
    if member.role == Role::Leader {
        return Err(Error::invalid("the project leader cannot be promoted to vice leader"));
    }
    member.role = Role::ViceLeader;
    store.save_member(member);
    record_log(
        store,
        caller,
        &project,
        ProjectAction::Updated,
        format!("Member {user} promoted to Vice Leader by user: {}", caller.user),
    );

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Promoted {user} to vice leader in project: {}", project.name),
        EntityType::Project,
        &project.id,
        ActivityKind::UpdatedProjectMember,
    );
    effects.notify(
        format!("You have been promoted to Vice Leader in project: {}", project.name),
        NotificationKind::ProjectUpdated,
        user,
        &project.id,
        EntityType::Project,
    );
    Ok(Outcome::new(store.members(project_id), effects))
}

pub fn demote<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
    user: &str,
) -> Result<Outcome<Vec<ProjectMember>>> {
    let project = load_project(store, project_id)?;
    permission::require(store, project_id, &caller.user, Operation::DemoteMember)?;

    let mut member = load_member(store, project_id, user)?;
    if member.role != Role::ViceLeader {
        return Err(Error::invalid("only vice leaders can be demoted to members"));
    }
    member.role = Role::Member;
    store.save_member(member);

    let mut effects = Effects::new();
    effects.record(
        &caller.user,
        format!("Demoted {user} to member in project: {}", project.name),
        EntityType::Project,
        &project.id,
        ActivityKind::UpdatedProjectMember,
    );
    effects.notify(
        format!("You have been demoted to Member in project: {}", project.name),
        NotificationKind::ProjectUpdated,
        user,
        &project.id,
        EntityType::Project,
    );
    Ok(Outcome::new(store.members(project_id), effects))
}

/// Remove `user` from the project and from every task they were assigned to.
pub fn remove_member<S: Repository + ?Sized>(
    store: &mut S,
    caller: &Caller,
    project_id: &str,
    user: &str,
) -> Result<Outcome<Vec<ProjectMember>>> {
    let project = load_project(store, project_id)?;
    let member = load_member(store, project_id, user)?;
    permission::require(
        store,
        project_id,
        &caller.user,
        Operation::RemoveMember {
            target: member.role,
        },
    )?;
    if member.role == Role::Leader {
        return Err(Error::invalid(
            "the project leader cannot be removed; change the leader first",
        ));
    }

    let mut stripped = 0;
    for mut task in store.tasks_in_project(project_id) {
        if task.is_assigned(user) {
            task.assignees.retain(|assignee| assignee != user);
            task.updated_at = caller.now;
            store.save_task(task);
            stripped += 1;
        }
    }
    store.delete_member(project_id, user);

    let mut effects = Effects::new();
    effects.notify(
        format!("You have been removed from project: {}", project.name),
        NotificationKind::ProjectUpdated,
        user,
        &project.id,
        EntityType::Project,
    );
    effects.record(
        &caller.user,
        format!("Removed member {user} from project: {}", project.name),
        EntityType::Project,
        &project.id,
        ActivityKind::UpdatedProjectMember,
    );
    tracing::info!(project = project_id, user, tasks = stripped, "member removed");
    Ok(Outcome::new(store.members(project_id), effects))
}

//! tw member command implementations.

use crate::cli::Context;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};
use crate::permission::{self, Operation};
use crate::project;
use crate::role::ProjectMember;
use crate::store::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Add,
    Remove,
    Promote,
    Demote,
    Leader,
}

impl Change {
    fn command(self) -> &'static str {
        match self {
            Change::Add => "member add",
            Change::Remove => "member remove",
            Change::Promote => "member promote",
            Change::Demote => "member demote",
            Change::Leader => "member leader",
        }
    }
}

#[derive(serde::Serialize)]
struct MemberListOutput {
    project_id: String,
    members: Vec<ProjectMember>,
}

fn push_members(human: &mut HumanOutput, members: &[ProjectMember]) {
    for member in members {
        human.push_detail(format!("{} ({})", member.user_id, member.role));
    }
}

pub fn run_list(ctx: &Context, project_id: &str) -> Result<()> {
    let members = ctx.view(|store, caller| {
        store
            .find_project(project_id)
            .ok_or_else(|| Error::not_found("project", project_id))?;
        permission::require(store, project_id, &caller.user, Operation::ViewProject)?;
        Ok(store.members(project_id))
    })?;

    let mut human = HumanOutput::new(format!("tw member list: {} member(s)", members.len()));
    push_members(&mut human, &members);

    let output = MemberListOutput {
        project_id: project_id.to_string(),
        members,
    };
    emit_success(ctx.output, "member list", &output, Some(&human))
}

pub fn run_change(ctx: &Context, change: Change, project_id: &str, user: &str) -> Result<()> {
    let (members, _) = ctx.mutate(|store, caller| match change {
        Change::Add => project::add_member(store, caller, project_id, user),
        Change::Remove => project::remove_member(store, caller, project_id, user),
        Change::Promote => project::promote(store, caller, project_id, user),
        Change::Demote => project::demote(store, caller, project_id, user),
        Change::Leader => project::change_leader(store, caller, project_id, user),
    })?;

    let mut human = HumanOutput::new(format!("tw {}: {user}", change.command()));
    human.push_summary("project", project_id.to_string());
    push_members(&mut human, &members);

    let output = MemberListOutput {
        project_id: project_id.to_string(),
        members,
    };
    emit_success(ctx.output, change.command(), &output, Some(&human))
}

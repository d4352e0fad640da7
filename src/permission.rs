//! Role-based permission gate.
//!
//! Every mutation resolves the caller's role in the affected project and runs
//! it through [`authorize`] before touching the store.

use crate::error::{Error, Result};
use crate::role::Role;
use crate::store::Repository;

/// Guarded operations. Variants carry the relationship facts a rule needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ViewProject,
    UpdateProject,
    AddMember,
    DeleteProject,
    ChangeLeader,
    PromoteMember,
    DemoteMember,
    RemoveMember { target: Role },
    CreateTask,
    UpdateTask { is_creator: bool },
    DeleteTask { is_creator: bool },
    ChangeTaskStatus { is_assignee: bool },
    UpdateTaskProgress { is_creator: bool, is_assignee: bool },
    AssignUser,
    SubmitApproval,
    ReviewApproval,
}

impl Operation {
    pub fn describe(self) -> &'static str {
        match self {
            Operation::ViewProject => "view this project",
            Operation::UpdateProject => "update this project",
            Operation::AddMember => "add members to this project",
            Operation::DeleteProject => "delete this project",
            Operation::ChangeLeader => "change the project leader",
            Operation::PromoteMember => "promote members in this project",
            Operation::DemoteMember => "demote members in this project",
            Operation::RemoveMember { .. } => "remove this member",
            Operation::CreateTask => "create tasks in this project",
            Operation::UpdateTask { .. } => "update this task",
            Operation::DeleteTask { .. } => "delete this task",
            Operation::ChangeTaskStatus { .. } => "change the status of this task",
            Operation::UpdateTaskProgress { .. } => "update progress for this task",
            Operation::AssignUser => "change task assignees",
            Operation::SubmitApproval => "submit this task for approval",
            Operation::ReviewApproval => "review submissions in this project",
        }
    }
}

/// Decide whether `role` (None for non-members) may perform `op`.
pub fn authorize(role: Option<Role>, op: Operation) -> Result<()> {
    let Some(role) = role else {
        return Err(Error::denied(format!(
            "not a member of this project; cannot {}",
            op.describe()
        )));
    };

    let allowed = match op {
        Operation::ViewProject | Operation::CreateTask | Operation::SubmitApproval => true,
        Operation::UpdateProject
        | Operation::AddMember
        | Operation::PromoteMember
        | Operation::AssignUser
        | Operation::ReviewApproval => role.is_manager(),
        Operation::DeleteProject | Operation::ChangeLeader | Operation::DemoteMember => {
            role == Role::Leader
        }
        Operation::RemoveMember { target } => {
            role == Role::Leader || (role == Role::ViceLeader && target == Role::Member)
        }
        Operation::UpdateTask { is_creator } => {
            role.is_manager() || (role == Role::Member && is_creator)
        }
        // A manager who created the task cannot delete it.
        Operation::DeleteTask { is_creator } => role.is_manager() && !is_creator,
        Operation::ChangeTaskStatus { is_assignee } => role.is_manager() || is_assignee,
        Operation::UpdateTaskProgress {
            is_creator,
            is_assignee,
        } => is_creator || is_assignee,
    };

    if allowed {
        Ok(())
    } else {
        Err(Error::denied(format!("{role} cannot {}", op.describe())))
    }
}

/// Resolve `user`'s role in `project_id` and authorize `op`, returning the role.
pub fn require<S: Repository + ?Sized>(
    store: &S,
    project_id: &str,
    user: &str,
    op: Operation,
) -> Result<Role> {
    let role = store.find_membership(project_id, user);
    authorize(role, op).map_err(|err| {
        tracing::debug!(project = project_id, user, ?op, "permission denied");
        err
    })?;
    role.ok_or_else(|| Error::denied("not a member of this project"))
}

mod support;

use teamwork::approval;
use teamwork::error::Error;
use teamwork::project;
use teamwork::role::Role;
use teamwork::status::Status;
use teamwork::store::{MemoryStore, Repository};
use teamwork::task::{self, NewTask, TaskUpdate};

use support::{caller, seeded_store};

/// Runs `op` against a clone and checks nothing changed when it fails.
fn denied_without_changes<T: std::fmt::Debug>(
    store: &MemoryStore,
    label: &str,
    op: impl FnOnce(&mut MemoryStore) -> teamwork::Result<T>,
) {
    let mut scratch = store.clone();
    let err = op(&mut scratch).expect_err(label);
    assert!(
        matches!(err, Error::PermissionDenied(_)),
        "{label}: expected permission denied, got {err:?}"
    );

    let before = store.snapshot();
    let after = scratch.snapshot();
    assert_eq!(before.projects, after.projects, "{label}: projects changed");
    assert_eq!(before.members, after.members, "{label}: members changed");
    assert_eq!(before.tasks, after.tasks, "{label}: tasks changed");
    assert_eq!(
        scratch.pending_logs().len(),
        store.pending_logs().len(),
        "{label}: log appended"
    );
}

#[test]
fn project_administration_is_reserved_for_managers() {
    let (store, project_id) = seeded_store();
    let id = project_id.as_str();

    denied_without_changes(&store, "member updates project", |s| {
        project::update_status(s, &caller("dev"), id, Status::OnHold)
    });
    denied_without_changes(&store, "member adds member", |s| {
        project::add_member(s, &caller("dev"), id, "newcomer")
    });
    denied_without_changes(&store, "vice deletes project", |s| {
        project::delete(s, &caller("vice"), id)
    });
    denied_without_changes(&store, "vice changes leader", |s| {
        project::change_leader(s, &caller("vice"), id, "dev")
    });
    denied_without_changes(&store, "vice demotes", |s| {
        project::demote(s, &caller("vice"), id, "vice")
    });
    denied_without_changes(&store, "member promotes", |s| {
        project::promote(s, &caller("dev"), id, "qa")
    });
    denied_without_changes(&store, "vice removes vice", |s| {
        project::remove_member(s, &caller("vice"), id, "vice")
    });
    denied_without_changes(&store, "outsider reads", |s| {
        project::read(s, &caller("stranger"), id)
    });
}

#[test]
fn vice_leader_may_manage_members_below_them() {
    let (mut store, project_id) = seeded_store();
    project::add_member(&mut store, &caller("vice"), &project_id, "newcomer").expect("add");
    project::promote(&mut store, &caller("vice"), &project_id, "newcomer").expect("promote");
    assert_eq!(store.find_membership(&project_id, "newcomer"), Some(Role::ViceLeader));
    project::remove_member(&mut store, &caller("vice"), &project_id, "qa").expect("remove");
    assert_eq!(store.find_membership(&project_id, "qa"), None);
}

#[test]
fn task_rules_follow_creator_and_assignee() {
    let (mut store, project_id) = seeded_store();
    let by_lead = task::create(&mut store, &caller("lead"), &project_id, NewTask::new("Lead task"))
        .expect("lead task")
        .value;
    let by_dev = task::create(&mut store, &caller("dev"), &project_id, NewTask::new("Dev task"))
        .expect("dev task")
        .value;

    denied_without_changes(&store, "member updates someone else's task", |s| {
        let changes = TaskUpdate {
            title: Some("Renamed".to_string()),
            ..TaskUpdate::default()
        };
        task::update(s, &caller("qa"), &by_lead.id, changes)
    });
    denied_without_changes(&store, "member deletes task", |s| {
        task::delete(s, &caller("dev"), &by_dev.id)
    });
    denied_without_changes(&store, "creator manager deletes own task", |s| {
        task::delete(s, &caller("lead"), &by_lead.id)
    });
    denied_without_changes(&store, "non-assignee changes status", |s| {
        task::change_status(s, &caller("qa"), &by_dev.id, Status::OnHold)
    });
    denied_without_changes(&store, "unrelated member sets progress", |s| {
        task::update_progress(s, &caller("qa"), &by_dev.id, 50)
    });
    denied_without_changes(&store, "member reassigns", |s| {
        let changes = TaskUpdate {
            assignees: Some(vec!["qa".to_string()]),
            ..TaskUpdate::default()
        };
        task::update(s, &caller("dev"), &by_dev.id, changes)
    });
    denied_without_changes(&store, "outsider submits", |s| {
        approval::submit(s, &caller("stranger"), &by_dev.id, None)
    });

    let changes = TaskUpdate {
        title: Some("Dev task v2".to_string()),
        ..TaskUpdate::default()
    };
    task::update(&mut store, &caller("dev"), &by_dev.id, changes).expect("creator updates");
    task::change_status(&mut store, &caller("dev"), &by_dev.id, Status::OnHold)
        .expect("assignee changes status");
    task::delete(&mut store, &caller("vice"), &by_lead.id).expect("other manager deletes");
}

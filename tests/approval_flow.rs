mod support;

use teamwork::approval::{self, ApprovalAction, ApprovalState};
use teamwork::error::Error;
use teamwork::notify::NotificationKind;
use teamwork::status::Status;
use teamwork::store::Repository;
use teamwork::task::{self, NewTask};

use support::{at, caller, seeded_store};

#[test]
fn reject_then_resubmit_then_approve_completes_the_task() {
    let (mut store, project_id) = seeded_store();
    let task = task::create(&mut store, &caller("dev"), &project_id, NewTask::new("Report"))
        .expect("task")
        .value;

    let first = approval::submit(&mut store, &caller("dev"), &task.id, None)
        .expect("submit")
        .value;
    approval::reject(&mut store, &caller("vice"), &first.id, Some("needs charts".into()))
        .expect("reject");
    assert_eq!(store.find_task(&task.id).expect("task").status, Status::InProgress);

    let second = approval::submit(&mut store, &caller("dev"), &task.id, Some("charts added".into()))
        .expect("resubmit")
        .value;
    approval::approve(&mut store, &caller("lead"), &second.id, None).expect("approve");

    let actions: Vec<ApprovalAction> = store
        .logs_for_task(&task.id)
        .into_iter()
        .map(|log| log.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            ApprovalAction::Submit,
            ApprovalAction::Reject,
            ApprovalAction::Submit,
            ApprovalAction::Approve,
        ]
    );
    assert_eq!(approval::state(&store, &task.id), ApprovalState::Approved);

    let done = store.find_task(&task.id).expect("task");
    assert_eq!(done.status, Status::Completed);
    assert_eq!(done.progress, 100);
}

#[test]
fn review_rows_credit_the_submitter() {
    let (mut store, project_id) = seeded_store();
    let task = task::create(&mut store, &caller("qa"), &project_id, NewTask::new("Test plan"))
        .expect("task")
        .value;
    let submission = approval::submit(&mut store, &caller("qa"), &task.id, None)
        .expect("submit")
        .value;

    let outcome = approval::approve(&mut store, &caller("lead"), &submission.id, Some("ok".into()))
        .expect("approve");
    assert_eq!(outcome.value.performed_by, "qa");

    let approved: Vec<_> = outcome.effects.notifications_for("qa").collect();
    assert!(approved
        .iter()
        .any(|n| n.kind == NotificationKind::TaskApproved && n.message == "Submission approved with note: ok"));

    let stats = approval::stats(&store, &project_id, "qa", at(2025, 1, 1), at(2026, 1, 1));
    assert_eq!(stats.submissions, 1);
    assert_eq!(stats.approvals, 1);
    let lead_stats = approval::stats(&store, &project_id, "lead", at(2025, 1, 1), at(2026, 1, 1));
    assert_eq!(lead_stats.approvals, 0);
}

#[test]
fn submission_notifies_managers_only() {
    let (mut store, project_id) = seeded_store();
    let task = task::create(&mut store, &caller("dev"), &project_id, NewTask::new("Draft"))
        .expect("task")
        .value;

    let outcome = approval::submit(&mut store, &caller("dev"), &task.id, None).expect("submit");
    let mut targets: Vec<&str> = outcome
        .effects
        .notifications
        .iter()
        .filter(|n| n.kind == NotificationKind::TaskSubmitted)
        .map(|n| n.target_user.as_str())
        .collect();
    targets.sort();
    assert_eq!(targets, vec!["lead", "vice"]);
    assert_eq!(
        outcome.effects.notifications[0].message,
        "New submission for task approval Draft"
    );
}

#[test]
fn approval_cascades_through_the_subtree() {
    let (mut store, project_id) = seeded_store();
    let lead = caller("lead");
    let root = task::create(&mut store, &lead, &project_id, NewTask::new("Root"))
        .expect("root")
        .value;
    let mid = task::create(&mut store, &lead, &project_id, NewTask::new("Mid").parent(&root.id))
        .expect("mid")
        .value;
    let leaf = task::create(&mut store, &lead, &project_id, NewTask::new("Leaf").parent(&mid.id))
        .expect("leaf")
        .value;
    let sibling = task::create(&mut store, &lead, &project_id, NewTask::new("Sibling"))
        .expect("sibling")
        .value;
    task::change_status(&mut store, &lead, &leaf.id, Status::Overdue).expect("status");

    let submission = approval::submit(&mut store, &caller("dev"), &mid.id, None)
        .expect("submit")
        .value;
    approval::approve(&mut store, &lead, &submission.id, None).expect("approve");

    let mid_after = store.find_task(&mid.id).expect("mid");
    assert_eq!((mid_after.status, mid_after.progress), (Status::Completed, 100));
    let leaf_after = store.find_task(&leaf.id).expect("leaf");
    assert_eq!((leaf_after.status, leaf_after.progress), (Status::Overdue, 100));

    assert_eq!(store.find_task(&root.id).expect("root").status, Status::InProgress);
    assert_eq!(store.find_task(&sibling.id).expect("sibling").progress, 0);
}

#[test]
fn members_cannot_review() {
    let (mut store, project_id) = seeded_store();
    let task = task::create(&mut store, &caller("dev"), &project_id, NewTask::new("Draft"))
        .expect("task")
        .value;
    let submission = approval::submit(&mut store, &caller("dev"), &task.id, None)
        .expect("submit")
        .value;

    let err = approval::approve(&mut store, &caller("qa"), &submission.id, None)
        .expect_err("member review");
    assert!(matches!(err, Error::PermissionDenied(_)));
    assert_eq!(store.logs_for_task(&task.id).len(), 1);

    let err = approval::reject(&mut store, &caller("lead"), "apl-missing", None)
        .expect_err("missing log");
    assert!(matches!(err, Error::NotFound { kind: "approval log", .. }));
}

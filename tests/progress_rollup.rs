mod support;

use teamwork::approval;
use teamwork::progress::{peek_project_progress, peek_task_progress, raw_task_progress};
use teamwork::project;
use teamwork::status::Status;
use teamwork::store::{MemoryStore, Repository};
use teamwork::task::{self, NewTask, ParentChange, Task, TaskUpdate};

use support::{caller, seeded_store};

fn child(id: &str, parent: &str, priority: u32, level: u32, progress: u8) -> Task {
    let mut task = Task::new(id, "prj-1", id, "lead");
    task.parent_id = Some(parent.to_string());
    task.priority = priority;
    task.level = level;
    task.progress = progress;
    task
}

#[test]
fn mixed_level_children_at_full_progress_stay_at_hundred() {
    let mut store = MemoryStore::new();
    store.save_task(Task::new("parent", "prj-1", "Parent", "lead"));
    store.save_task(child("a", "parent", 2, 1, 100));
    store.save_task(child("b", "parent", 6, 2, 100));

    let raw = raw_task_progress(&store, "parent").expect("raw");
    assert!((raw - 100.0).abs() < 1e-9);
    assert_eq!(peek_task_progress(&store, "parent").expect("peek"), 100);
}

#[test]
fn parent_progress_never_drops_as_a_child_advances() {
    let mut store = MemoryStore::new();
    store.save_task(Task::new("parent", "prj-1", "Parent", "lead"));
    store.save_task(child("a", "parent", 3, 2, 0));
    store.save_task(child("b", "parent", 1, 2, 40));

    let mut previous = 0;
    for step in (0..=100).step_by(5) {
        let mut moving = store.find_task("a").expect("a");
        moving.progress = step;
        store.save_task(moving);
        let shown = peek_task_progress(&store, "parent").expect("peek");
        assert!(shown >= previous, "{shown} < {previous} at {step}");
        previous = shown;
    }
}

#[test]
fn project_rolls_up_through_nested_tasks() {
    let (mut store, project_id) = seeded_store();
    let lead = caller("lead");

    let epic = task::create(&mut store, &lead, &project_id, NewTask::new("Epic").priority(2))
        .expect("epic")
        .value;
    let story = task::create(
        &mut store,
        &lead,
        &project_id,
        NewTask::new("Story").parent(&epic.id).assign("dev"),
    )
    .expect("story")
    .value;
    task::create(&mut store, &lead, &project_id, NewTask::new("Chore"))
        .expect("chore");

    task::update_progress(&mut store, &caller("dev"), &story.id, 60).expect("progress");

    // Epic raw 60 with weight 2, chore 0 with weight 1: 40% raw.
    assert_eq!(peek_project_progress(&store, &project_id).expect("peek"), 41);

    let view = project::read(&mut store, &caller("qa"), &project_id).expect("read");
    assert_eq!(view.project.progress, 41);
    assert_eq!(view.project.status, Status::InProgress);
    assert_eq!(store.find_task(&epic.id).expect("epic").progress, 61);
}

#[test]
fn project_without_tasks_keeps_stored_progress() {
    let (mut store, project_id) = seeded_store();
    let view = project::read(&mut store, &caller("lead"), &project_id).expect("read");
    assert_eq!(view.project.progress, 0);
    assert_eq!(view.task_count, 0);
}

#[test]
fn mutations_keep_stored_ancestor_progress_current() {
    let (mut store, project_id) = seeded_store();
    let lead = caller("lead");

    let root = task::create(&mut store, &lead, &project_id, NewTask::new("Release"))
        .expect("root")
        .value;
    let build = task::create(
        &mut store,
        &lead,
        &project_id,
        NewTask::new("Build").parent(&root.id).assign("dev"),
    )
    .expect("build")
    .value;
    let docs = task::create(
        &mut store,
        &lead,
        &project_id,
        NewTask::new("Docs").parent(&root.id).assign("dev"),
    )
    .expect("docs")
    .value;

    task::update_progress(&mut store, &caller("dev"), &build.id, 60).expect("progress");
    assert_eq!(store.find_task(&root.id).expect("root").progress, 31);

    let submission = approval::submit(&mut store, &caller("dev"), &docs.id, None)
        .expect("submit")
        .value;
    approval::approve(&mut store, &lead, &submission.id, None).expect("approve");
    assert_eq!(store.find_task(&root.id).expect("root").progress, 81);
    assert_eq!(store.find_project(&project_id).expect("project").progress, 81);

    let listed = task::list_project_tasks(&mut store, &lead, &project_id)
        .expect("list")
        .value;
    let listed_root = listed
        .iter()
        .find(|task| task.id == root.id)
        .expect("root listed");
    assert_eq!(
        listed_root.progress,
        peek_task_progress(&store, &root.id).expect("peek")
    );

    task::delete(&mut store, &caller("vice"), &docs.id).expect("delete");
    assert_eq!(store.find_task(&root.id).expect("root").progress, 61);
}

#[test]
fn reparenting_refreshes_old_and_new_parents() {
    let (mut store, project_id) = seeded_store();
    let lead = caller("lead");

    let left = task::create(&mut store, &lead, &project_id, NewTask::new("Left"))
        .expect("left")
        .value;
    let right = task::create(&mut store, &lead, &project_id, NewTask::new("Right"))
        .expect("right")
        .value;
    let done = task::create(
        &mut store,
        &lead,
        &project_id,
        NewTask::new("Done").parent(&left.id),
    )
    .expect("done")
    .value;
    task::create(&mut store, &lead, &project_id, NewTask::new("Open").parent(&left.id))
        .expect("open");
    task::create(&mut store, &lead, &project_id, NewTask::new("Idle").parent(&right.id))
        .expect("idle");
    task::update_progress(&mut store, &lead, &done.id, 100).expect("progress");
    assert_eq!(store.find_task(&left.id).expect("left").progress, 51);

    let changes = TaskUpdate {
        parent: Some(ParentChange::Attach(right.id.clone())),
        ..TaskUpdate::default()
    };
    task::update(&mut store, &lead, &done.id, changes).expect("move");

    assert_eq!(store.find_task(&left.id).expect("left").progress, 1);
    assert_eq!(store.find_task(&right.id).expect("right").progress, 51);
}

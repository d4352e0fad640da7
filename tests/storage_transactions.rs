mod support;

use std::thread;

use teamwork::actor::Caller;
use teamwork::approval;
use teamwork::progress::peek_task_progress;
use teamwork::project::{self, NewProject};
use teamwork::storage::Storage;
use teamwork::store::Repository;
use teamwork::task::{self, NewTask};

use support::{caller, date, TestWorkspace};

fn seed(storage: &Storage) -> String {
    let mut tx = storage.begin().expect("begin");
    let project = project::create(
        &mut tx.store,
        &caller("lead"),
        NewProject {
            name: "Launch".to_string(),
            description: None,
            start_date: date(2025, 1, 1),
            end_date: date(2025, 12, 31),
        },
    )
    .expect("project")
    .value;
    project::add_member(&mut tx.store, &caller("lead"), &project.id, "dev").expect("member");
    tx.commit().expect("commit");
    project.id
}

#[test]
fn task_tree_and_log_survive_reload() {
    let workspace = TestWorkspace::new();
    let storage = Storage::new(workspace.path());
    storage.init().expect("init");
    let project_id = seed(&storage);

    let (root_id, log_id) = {
        let mut tx = storage.begin().expect("begin");
        let root = task::create(&mut tx.store, &caller("lead"), &project_id, NewTask::new("Root"))
            .expect("root")
            .value;
        let child = task::create(
            &mut tx.store,
            &caller("dev"),
            &project_id,
            NewTask::new("Child").parent(&root.id),
        )
        .expect("child")
        .value;
        task::update_progress(&mut tx.store, &caller("dev"), &child.id, 30).expect("progress");
        let log = approval::submit(&mut tx.store, &caller("dev"), &child.id, None)
            .expect("submit")
            .value;
        tx.commit().expect("commit");
        (root.id, log.id)
    };

    let store = storage.load().expect("reload");
    assert_eq!(store.find_children(&root_id).len(), 1);
    assert_eq!(peek_task_progress(&store, &root_id).expect("peek"), 31);
    assert!(store.find_log(&log_id).is_some());
    assert!(store.pending_logs().is_empty());
}

#[test]
fn failed_operation_is_not_committed() {
    let workspace = TestWorkspace::new();
    let storage = Storage::new(workspace.path());
    storage.init().expect("init");
    let project_id = seed(&storage);

    {
        let mut tx = storage.begin().expect("begin");
        let result = project::delete(&mut tx.store, &caller("dev"), &project_id);
        assert!(result.is_err());
    }

    let store = storage.load().expect("reload");
    assert!(store.find_project(&project_id).is_some());
    assert_eq!(store.members(&project_id).len(), 2);
}

#[test]
fn concurrent_writers_do_not_lose_tasks() {
    let workspace = TestWorkspace::new();
    let root = workspace.path().to_path_buf();
    let storage = Storage::new(&root);
    storage.init().expect("init");
    let project_id = seed(&storage);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let root = root.clone();
            let project_id = project_id.clone();
            thread::spawn(move || {
                let storage = Storage::new(root);
                for n in 0..5 {
                    let mut tx = storage.begin().expect("begin");
                    task::create(
                        &mut tx.store,
                        &Caller::now("lead"),
                        &project_id,
                        NewTask::new(format!("w{worker}-{n}")),
                    )
                    .expect("task");
                    tx.commit().expect("commit");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker");
    }

    let store = storage.load().expect("reload");
    assert_eq!(store.tasks_in_project(&project_id).len(), 20);
}

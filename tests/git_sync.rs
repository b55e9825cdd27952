//! Sync-backend convergence across process instances sharing one remote.

use std::path::Path;

use dots_ledger::config::GitConfig;
use dots_ledger::persist::{Backend, GitStore, PushWorkerHandle};
use dots_ledger::{UserId, UserRecord, WallMillis};
use git2::Repository;

/// Working repo wired to the shared bare remote, push throttle disabled.
fn instance(root: &Path, name: &str, remote: &Path) -> (GitStore, PushWorkerHandle) {
    let repo_dir = root.join(name);
    let repo = Repository::init(&repo_dir).expect("init repo");
    repo.remote("origin", remote.to_str().expect("remote path"))
        .expect("add origin");

    let cfg = GitConfig {
        repo_path: repo_dir.clone(),
        snapshot_path: repo_dir.join("users.json"),
        push_interval_secs: 0,
    };
    GitStore::spawn(&cfg).expect("spawn git store")
}

fn record(id: i64, username: &str, dots: u32, check_in: u64) -> UserRecord {
    let mut rec = UserRecord::new(UserId(id), username);
    rec.dots = dots;
    rec.last_check_in = WallMillis(check_in);
    rec
}

#[test]
fn pushed_records_are_loaded_by_a_second_instance() {
    let root = tempfile::tempdir().expect("tempdir");
    let remote = root.path().join("remote.git");
    Repository::init_bare(&remote).expect("init bare");

    let (store_a, worker_a) = instance(root.path(), "a", &remote);
    let rec = record(1, "ada", 10, 1_700_000_000_000);
    store_a.save(&rec, std::slice::from_ref(&rec)).expect("save");
    worker_a.flush().expect("flush");

    let (store_b, worker_b) = instance(root.path(), "b", &remote);
    let loaded = store_b.load().expect("load");
    assert_eq!(loaded, vec![rec]);

    worker_a.shutdown();
    worker_b.shutdown();
}

#[test]
fn divergent_instances_converge_by_join() {
    let root = tempfile::tempdir().expect("tempdir");
    let remote = root.path().join("remote.git");
    Repository::init_bare(&remote).expect("init bare");

    let (store_a, worker_a) = instance(root.path(), "a", &remote);
    let (store_b, worker_b) = instance(root.path(), "b", &remote);

    // Both instances mutate before either pushes; B also advances user 1.
    let a1 = record(1, "ada", 10, 100);
    store_a.save(&a1, std::slice::from_ref(&a1)).expect("save a");

    let b1 = record(1, "", 30, 200);
    let b2 = record(2, "bob", 20, 300);
    store_b.save(&b2, &[b1.clone(), b2.clone()]).expect("save b");

    worker_a.flush().expect("flush a");
    worker_b.flush().expect("flush b");

    // A pull sees the union, with user 1 joined field-wise.
    let merged = store_a.load().expect("load");
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].id, UserId(1));
    assert_eq!(merged[0].dots, 30);
    assert_eq!(merged[0].username, "ada");
    assert_eq!(merged[0].last_check_in, WallMillis(200));
    assert_eq!(merged[1], b2);

    worker_a.shutdown();
    worker_b.shutdown();
}

#[test]
fn shutdown_pushes_pending_state() {
    let root = tempfile::tempdir().expect("tempdir");
    let remote = root.path().join("remote.git");
    Repository::init_bare(&remote).expect("init bare");

    {
        // The first push goes out right away; with a large throttle the
        // second save stays pending until the shutdown flush delivers it.
        let repo_dir = root.path().join("a");
        let repo = Repository::init(&repo_dir).expect("init repo");
        repo.remote("origin", remote.to_str().expect("remote path"))
            .expect("add origin");
        let cfg = GitConfig {
            repo_path: repo_dir.clone(),
            snapshot_path: repo_dir.join("users.json"),
            push_interval_secs: 3_600,
        };
        let (store, worker) = GitStore::spawn(&cfg).expect("spawn");
        let first = record(7, "ada", 10, 500);
        store.save(&first, std::slice::from_ref(&first)).expect("save");
        worker.flush().expect("flush");

        let second = record(7, "ada", 30, 900);
        store.save(&second, std::slice::from_ref(&second)).expect("save");
        worker.shutdown();
    }

    let (store_b, worker_b) = instance(root.path(), "b", &remote);
    let loaded = store_b.load().expect("load");
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, UserId(7));
    assert_eq!(loaded[0].dots, 30);
    assert_eq!(loaded[0].last_check_in, WallMillis(900));
    worker_b.shutdown();
}

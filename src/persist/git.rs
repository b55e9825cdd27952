//! Snapshot-with-sync backend.
//!
//! Layers pull-before-load and a rate-limited push-after-save around the
//! local snapshot file, synchronizing through a git remote so multiple
//! process instances (and redeploys) converge on the same data.
//!
//! Key design:
//! - Record sets are committed as a single blob on a dedicated ref
//!   (`refs/heads/dots/store`); the worktree is never touched.
//! - git2 repository handles are !Send, so all git work runs on a dedicated
//!   worker thread fed by a channel. `save` writes the snapshot file and
//!   nudges the worker; it never blocks on the network.
//! - Pushes are throttled to one per configured interval to bound external
//!   write volume. A failed push keeps the pending set and retries at the
//!   next tick.
//! - Linear history: commits parent the freshest known ref head; on a
//!   non-fast-forward rejection we refetch, re-merge, and retry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use git2::{Oid, Repository};

use super::snapshot::SnapshotStore;
use super::{Backend, PersistError};
use crate::config::GitConfig;
use crate::core::{UserId, UserRecord};

const LOCAL_REF: &str = "refs/heads/dots/store";
const REMOTE_REF: &str = "refs/remotes/origin/dots/store";
const STORE_FILE: &str = "users.json";
const PUSH_ATTEMPTS: usize = 3;

pub struct GitStore {
    snapshot: SnapshotStore,
    repo_path: PathBuf,
    tx: Sender<PushOp>,
}

enum PushOp {
    /// Latest full record set; supersedes any earlier pending set.
    Nudge { records: Vec<UserRecord> },
    /// Push whatever is pending right now, ignoring the throttle.
    Flush {
        respond: Sender<Result<(), PersistError>>,
    },
    Shutdown,
}

impl GitStore {
    /// Open (or init) the repository and start the push worker.
    pub fn spawn(cfg: &GitConfig) -> Result<(GitStore, PushWorkerHandle), PersistError> {
        // Validate the repository up front so a misconfigured path fails at
        // startup rather than on the first save.
        open_or_init(&cfg.repo_path)?;

        let (tx, rx) = channel::unbounded();
        let worker = PushWorker {
            repo_path: cfg.repo_path.clone(),
            interval: Duration::from_secs(cfg.push_interval_secs),
            last_push: None,
            pending: None,
        };
        let join = std::thread::Builder::new()
            .name("dots-git-push".to_string())
            .spawn(move || run_push_loop(worker, rx))
            .map_err(|e| PersistError::Io {
                path: cfg.repo_path.clone(),
                source: e,
            })?;

        let store = GitStore {
            snapshot: SnapshotStore::new(cfg.snapshot_path.clone()),
            repo_path: cfg.repo_path.clone(),
            tx: tx.clone(),
        };
        Ok((store, PushWorkerHandle { tx, join }))
    }
}

impl Backend for GitStore {
    fn name(&self) -> &'static str {
        "git"
    }

    /// Pull-before-read: fetch the sync ref, then join the remote set with
    /// the local snapshot file. Either side may be ahead (crash before push,
    /// or another instance pushed since we last ran).
    fn load(&self) -> Result<Vec<UserRecord>, PersistError> {
        let repo = open_or_init(&self.repo_path)?;
        fetch(&repo);

        let remote = read_ref(&repo, REMOTE_REF)
            .or_else(|| read_ref(&repo, LOCAL_REF))
            .map(|(_, records)| records)
            .unwrap_or_default();
        let local = self.snapshot.read()?;

        let merged = join_sets([local, remote]);
        self.snapshot.write(&merged)?;
        Ok(merged)
    }

    fn save(&self, _changed: &UserRecord, all: &[UserRecord]) -> Result<(), PersistError> {
        // The snapshot file is the durable copy; the push is best-effort.
        self.snapshot.write(all)?;
        if self.tx.send(PushOp::Nudge { records: all.to_vec() }).is_err() {
            tracing::warn!("git push worker is gone; snapshot saved locally only");
        }
        Ok(())
    }
}

/// Handle to the push worker thread.
pub struct PushWorkerHandle {
    tx: Sender<PushOp>,
    join: JoinHandle<()>,
}

impl PushWorkerHandle {
    /// Push any pending record set now, bypassing the throttle.
    pub fn flush(&self) -> Result<(), PersistError> {
        let (respond, done) = channel::bounded(1);
        self.tx
            .send(PushOp::Flush { respond })
            .map_err(|_| PersistError::WorkerGone)?;
        done.recv().map_err(|_| PersistError::WorkerGone)?
    }

    /// Flush and stop the worker. Called once at shutdown.
    pub fn shutdown(self) {
        let _ = self.tx.send(PushOp::Shutdown);
        let _ = self.join.join();
    }
}

struct PushWorker {
    repo_path: PathBuf,
    interval: Duration,
    last_push: Option<Instant>,
    pending: Option<Vec<UserRecord>>,
}

impl PushWorker {
    fn due_in(&self) -> Option<Duration> {
        self.pending.as_ref()?;
        let elapsed = self.last_push.map(|t| t.elapsed()).unwrap_or(self.interval);
        Some(self.interval.saturating_sub(elapsed))
    }

    fn push_pending(&mut self) -> Result<(), PersistError> {
        let Some(records) = self.pending.take() else {
            return Ok(());
        };
        self.last_push = Some(Instant::now());
        match sync_push(&self.repo_path, &records) {
            Ok(()) => {
                tracing::debug!(users = records.len(), "pushed record set to sync remote");
                Ok(())
            }
            Err(e) => {
                // Keep the set; the next nudge or tick retries after the
                // throttle interval.
                tracing::warn!(
                    transience = ?e.transience(),
                    "git push failed, will retry: {e}"
                );
                self.pending = Some(records);
                Err(e)
            }
        }
    }
}

fn run_push_loop(mut worker: PushWorker, rx: Receiver<PushOp>) {
    loop {
        let op = match worker.due_in() {
            Some(wait) if wait.is_zero() => {
                let _ = worker.push_pending();
                continue;
            }
            Some(wait) => match rx.recv_timeout(wait) {
                Ok(op) => op,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(op) => op,
                Err(_) => break,
            },
        };

        match op {
            PushOp::Nudge { records } => {
                worker.pending = Some(records);
            }
            PushOp::Flush { respond } => {
                let _ = respond.send(worker.push_pending());
            }
            PushOp::Shutdown => break,
        }
    }
    // Final push so an orderly shutdown does not strand acknowledged claims.
    let _ = worker.push_pending();
}

// =============================================================================
// Git plumbing
// =============================================================================

fn open_or_init(path: &Path) -> Result<Repository, PersistError> {
    match Repository::open(path) {
        Ok(repo) => Ok(repo),
        Err(_) => Repository::init(path).map_err(|e| PersistError::OpenRepo(path.to_owned(), e)),
    }
}

fn credentials_callbacks(repo: &Repository) -> git2::RemoteCallbacks<'_> {
    let cfg = repo.config().ok();
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        if allowed.is_ssh_key()
            && let Some(user) = username_from_url
        {
            return git2::Cred::ssh_key_from_agent(user);
        }
        if allowed.is_user_pass_plaintext()
            && let Some(ref cfg) = cfg
            && let Ok(cred) = git2::Cred::credential_helper(cfg, url, username_from_url)
        {
            return Ok(cred);
        }
        git2::Cred::default()
    });
    callbacks
}

/// Fetch the sync ref from origin. Errors are ignored: the remote may be
/// unreachable or not exist yet, and local state still works.
fn fetch(repo: &Repository) {
    if let Ok(mut remote) = repo.find_remote("origin") {
        let mut fo = git2::FetchOptions::new();
        fo.remote_callbacks(credentials_callbacks(repo));
        let _ = remote.fetch(&["refs/heads/dots/store"], Some(&mut fo), None);
    }
}

/// Read the record set stored at `refname`, if the ref exists.
fn read_ref(repo: &Repository, refname: &str) -> Option<(Oid, Vec<UserRecord>)> {
    let oid = repo.refname_to_id(refname).ok()?;
    let commit = repo.find_commit(oid).ok()?;
    let tree = commit.tree().ok()?;
    let entry = tree.get_name(STORE_FILE)?;
    let blob = repo.find_blob(entry.id()).ok()?;
    let records = serde_json::from_slice(blob.content()).ok()?;
    Some((oid, records))
}

/// Commit `records` as the sole file of a fresh tree on the local sync ref.
fn commit_records(
    repo: &Repository,
    records: &[UserRecord],
    parent: Option<Oid>,
) -> Result<Oid, PersistError> {
    let contents = serde_json::to_vec_pretty(records).map_err(PersistError::Encode)?;
    let blob = repo.blob(&contents)?;

    let mut builder = repo.treebuilder(None)?;
    builder.insert(STORE_FILE, blob, 0o100_644)?;
    let tree = repo.find_tree(builder.write()?)?;

    let sig = repo
        .signature()
        .or_else(|_| git2::Signature::now("dots-ledger", "dots-ledger@localhost"))?;
    let message = format!("dots(store): {} users", records.len());

    let parent_commit = match parent {
        Some(oid) => Some(repo.find_commit(oid)?),
        None => None,
    };
    let parents: Vec<_> = parent_commit.iter().collect();

    let oid = repo.commit(Some(LOCAL_REF), &sig, &sig, &message, &tree, &parents)?;
    Ok(oid)
}

/// Push the local sync ref to origin. `Ok` with no origin configured: the
/// local ref alone still gives crash durability.
fn push(repo: &Repository) -> Result<(), PersistError> {
    let Ok(mut remote) = repo.find_remote("origin") else {
        tracing::debug!("no origin remote configured, keeping sync ref local");
        return Ok(());
    };

    let rejected = std::cell::Cell::new(false);
    let mut callbacks = credentials_callbacks(repo);
    callbacks.push_update_reference(|_refname, status| {
        if status.is_some() {
            rejected.set(true);
        }
        Ok(())
    });
    let mut po = git2::PushOptions::new();
    po.remote_callbacks(callbacks);

    let refspec = format!("{LOCAL_REF}:{LOCAL_REF}");
    remote.push(&[refspec.as_str()], Some(&mut po))?;
    if rejected.get() {
        return Err(PersistError::NonFastForward);
    }
    Ok(())
}

/// Fetch, merge with whatever the freshest ref holds, commit, push.
/// Retries on non-fast-forward (another instance pushed in between).
fn sync_push(repo_path: &Path, records: &[UserRecord]) -> Result<(), PersistError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| PersistError::OpenRepo(repo_path.to_owned(), e))?;

    for attempt in 0..PUSH_ATTEMPTS {
        fetch(&repo);
        let base = read_ref(&repo, REMOTE_REF).or_else(|| read_ref(&repo, LOCAL_REF));
        let (parent, base_records) = match base {
            Some((oid, records)) => (Some(oid), records),
            None => (None, Vec::new()),
        };

        let merged = join_sets([records.to_vec(), base_records]);
        commit_records(&repo, &merged, parent)?;

        match push(&repo) {
            Ok(()) => return Ok(()),
            Err(PersistError::NonFastForward) if attempt + 1 < PUSH_ATTEMPTS => {
                tracing::debug!(attempt, "push rejected, refetching and retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(PersistError::NonFastForward)
}

/// Union of record sets, joining duplicates per user id.
fn join_sets<I: IntoIterator<Item = Vec<UserRecord>>>(sets: I) -> Vec<UserRecord> {
    let mut by_id: BTreeMap<UserId, UserRecord> = BTreeMap::new();
    for set in sets {
        for record in set {
            by_id
                .entry(record.id)
                .and_modify(|existing| *existing = UserRecord::join(existing, &record))
                .or_insert(record);
        }
    }
    by_id.into_values().collect()
}

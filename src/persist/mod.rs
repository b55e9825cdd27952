//! Durable backends: make the record set outlive the process.
//!
//! Three variants share one capability set {load, save}:
//! - [`RemoteStore`]: REST row store reached over HTTP, one upsert per save.
//! - [`SnapshotStore`]: full record set serialized to a local JSON file.
//! - [`GitStore`]: snapshot file synchronized through a git remote, with a
//!   rate-limited push worker off the request path.
//!
//! Shared contract: `save` makes a best-effort durable copy, `load` returns
//! the most recent successfully saved set or empty if none exists. Failures
//! are logged by the caller and never surfaced to end users; the in-memory
//! store stays authoritative.

mod git;
mod remote;
mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub use git::{GitStore, PushWorkerHandle};
pub use remote::RemoteStore;
pub use snapshot::SnapshotStore;

use crate::config::PersistConfig;
use crate::core::UserRecord;
use crate::error::Transience;

/// Errors from durable backend I/O.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PersistError {
    #[error("row store request failed: {0}")]
    Http(String),

    #[error("row store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode snapshot {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to open repository at {0}: {1}")]
    OpenRepo(PathBuf, #[source] git2::Error),

    #[error("push rejected (non-fast-forward)")]
    NonFastForward,

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("push worker is gone")]
    WorkerGone,

    #[error("unknown backend {0:?}")]
    UnknownBackend(String),
}

impl PersistError {
    /// Whether retrying may succeed.
    pub fn transience(&self) -> Transience {
        match self {
            PersistError::Http(_)
            | PersistError::Status { .. }
            | PersistError::NonFastForward => Transience::Retryable,

            PersistError::Io { .. }
            | PersistError::OpenRepo(_, _)
            | PersistError::WorkerGone => Transience::Unknown,

            PersistError::Decode { .. }
            | PersistError::Encode(_)
            | PersistError::Git(_)
            | PersistError::UnknownBackend(_) => Transience::Permanent,
        }
    }
}

/// Capability set shared by all durable backends.
pub trait Backend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Most recent successfully saved record set, or empty if none exists.
    fn load(&self) -> Result<Vec<UserRecord>, PersistError>;

    /// Best-effort durable copy of the current record set.
    ///
    /// `changed` is the record this save was triggered for; `all` is the
    /// full current set. Row-store backends upsert `changed`, file backends
    /// rewrite `all`.
    fn save(&self, changed: &UserRecord, all: &[UserRecord]) -> Result<(), PersistError>;
}

/// Handle to a backend plus whatever background machinery it spawned.
pub struct BackendHandle {
    pub backend: Arc<dyn Backend>,
    /// Present for the git backend; used for final flush at shutdown.
    pub push_worker: Option<PushWorkerHandle>,
}

/// Build the configured backend.
pub fn from_config(cfg: &PersistConfig) -> Result<BackendHandle, PersistError> {
    match cfg.backend.as_str() {
        "remote" => Ok(BackendHandle {
            backend: Arc::new(RemoteStore::new(&cfg.remote)),
            push_worker: None,
        }),
        "snapshot" => Ok(BackendHandle {
            backend: Arc::new(SnapshotStore::new(cfg.snapshot_path.clone())),
            push_worker: None,
        }),
        "git" => {
            let (store, worker) = GitStore::spawn(&cfg.git)?;
            Ok(BackendHandle {
                backend: Arc::new(store),
                push_worker: Some(worker),
            })
        }
        other => Err(PersistError::UnknownBackend(other.to_string())),
    }
}

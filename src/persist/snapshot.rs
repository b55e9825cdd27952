//! Local snapshot backend: the full record set as one JSON file.
//!
//! Written atomically (temp file + rename) on every save so a crash mid-write
//! never leaves a torn file. A missing file is the empty initial state, not
//! an error.

use std::fs;
use std::path::{Path, PathBuf};

use super::{Backend, PersistError};
use crate::core::UserRecord;

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn read(&self) -> Result<Vec<UserRecord>, PersistError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        serde_json::from_str(&contents).map_err(|e| PersistError::Decode {
            path: self.path.clone(),
            source: e,
        })
    }

    pub(crate) fn write(&self, records: &[UserRecord]) -> Result<(), PersistError> {
        let contents =
            serde_json::to_string_pretty(records).map_err(PersistError::Encode)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| PersistError::Io {
            path: dir.to_owned(),
            source: e,
        })?;
        let temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PersistError::Io {
            path: dir.to_owned(),
            source: e,
        })?;
        fs::write(temp.path(), contents.as_bytes()).map_err(|e| PersistError::Io {
            path: temp.path().to_owned(),
            source: e,
        })?;
        temp.persist(&self.path).map_err(|e| PersistError::Io {
            path: self.path.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}

impl Backend for SnapshotStore {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn load(&self) -> Result<Vec<UserRecord>, PersistError> {
        self.read()
    }

    fn save(&self, _changed: &UserRecord, all: &[UserRecord]) -> Result<(), PersistError> {
        self.write(all)
    }
}

//! Snapshot Persistence
//!
//! `SAVE` and `LOAD` go through the [`Persistence`] trait. [`FileSnapshot`]
//! keeps the blob from [`storage::snapshot::export`](crate::storage::snapshot::export)
//! in a single file. Writes go to a sibling `.tmp` file that is then renamed
//! over the target, so a failed save leaves the previous file intact.
//!
//! These calls are synchronous and run while the command lock is held, so
//! every other client waits for the duration of the file I/O.

use crate::storage::snapshot::{self, Snapshot, SnapshotError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Somewhere a snapshot can be saved to and loaded from.
pub trait Persistence: Send {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError>;

    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Snapshot>, PersistError>;

    /// Human-readable location, used in logs and replies.
    fn location(&self) -> String;
}

/// Persists snapshots to one file.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Persistence for FileSnapshot {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        let blob = snapshot::export(snapshot);

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, &blob).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), bytes = blob.len(), "Snapshot written");
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        let blob = match fs::read(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        debug!(path = %self.path.display(), bytes = blob.len(), "Snapshot read");
        Ok(Some(snapshot::import(&blob)?))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoredValue;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileSnapshot) {
        let dir = TempDir::new().unwrap();
        let file = FileSnapshot::new(dir.path().join("data.bin"));
        (dir, file)
    }

    #[test]
    fn test_missing_file_loads_nothing() {
        let (_dir, file) = setup();
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, file) = setup();

        let mut snapshot = Snapshot::default();
        snapshot
            .data
            .insert(Bytes::from("k"), StoredValue::Bytes(Bytes::from("v")));
        file.save(&snapshot).unwrap();

        assert_eq!(file.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_save_overwrites() {
        let (_dir, file) = setup();

        let mut first = Snapshot::default();
        first.data.insert(Bytes::from("a"), StoredValue::Integer(1));
        file.save(&first).unwrap();
        file.save(&Snapshot::default()).unwrap();

        assert_eq!(file.load().unwrap(), Some(Snapshot::default()));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let (_dir, file) = setup();
        fs::write(file.path(), b"not a snapshot").unwrap();
        assert!(matches!(file.load(), Err(PersistError::Snapshot(_))));
    }

    #[test]
    fn test_unwritable_location_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = FileSnapshot::new(dir.path().join("missing").join("data.bin"));
        assert!(matches!(
            file.save(&Snapshot::default()),
            Err(PersistError::Io { .. })
        ));
    }
}

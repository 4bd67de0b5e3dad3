use std::{fs, path::Path, path::PathBuf};

use tracing::warn;

use crate::errors::BackupError;

/// Live embedded-database lifecycle object, owned by the hosting application.
///
/// The backup subsystem only consumes this interface: it never opens the
/// engine itself and never reinitializes it after a restore. Closing is
/// expected to trigger a final implicit checkpoint.
pub trait DatabaseHandle: Send {
    /// Forces a full checkpoint of the write-ahead log into the primary file.
    fn checkpoint(&self) -> Result<(), BackupError>;
    /// Closes the engine, releasing its hold on the on-disk file set.
    fn close(&mut self) -> Result<(), BackupError>;
    fn is_open(&self) -> bool;
    /// Absolute path of the primary database file.
    fn primary_path(&self) -> &Path;
}

/// The on-disk triple an embedded engine maintains: primary file plus the
/// write-ahead log and shared-memory index sidecars.
///
/// During restore the three files must be removed together before the
/// replacement copy begins, or a reopened engine may see a corrupt hybrid of
/// old sidecars over new primary bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseFileSet {
    pub primary: PathBuf,
    pub wal: PathBuf,
    pub shm: PathBuf,
}

impl DatabaseFileSet {
    /// Derives the sidecar paths from the primary file path.
    pub fn for_primary(primary: &Path) -> Self {
        let name = primary
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("database");
        let parent = primary.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            primary: primary.to_path_buf(),
            wal: parent.join(format!("{name}-wal")),
            shm: parent.join(format!("{name}-shm")),
        }
    }

    /// Deletes the full file set, tolerating absent sidecars.
    ///
    /// A missing file is not an error; a deletion that fails outright is
    /// logged and reported through the return value, but does not stop the
    /// remaining files from being attempted. Once the first file is gone the
    /// original data set is unrecoverable by this subsystem.
    pub fn delete_all(&self) -> DeletionReport {
        let mut report = DeletionReport::default();
        for (label, path) in [
            ("primary", &self.primary),
            ("wal", &self.wal),
            ("shm", &self.shm),
        ] {
            if !path.exists() {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => report.deleted.push(path.clone()),
                Err(err) => {
                    warn!(file = label, path = %path.display(), %err, "failed to delete database file");
                    report.failed.push(path.clone());
                }
            }
        }
        report
    }

    /// True while any member of the file set is still present on disk.
    pub fn any_present(&self) -> bool {
        self.primary.exists() || self.wal.exists() || self.shm.exists()
    }
}

/// Outcome of deleting a database file set.
#[derive(Debug, Default)]
pub struct DeletionReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_set_derives_sidecar_names() {
        let set = DatabaseFileSet::for_primary(Path::new("/data/accounts.db"));
        assert_eq!(set.wal, PathBuf::from("/data/accounts.db-wal"));
        assert_eq!(set.shm, PathBuf::from("/data/accounts.db-shm"));
    }

    #[test]
    fn delete_all_tolerates_missing_sidecars() {
        let temp = TempDir::new().expect("temp dir");
        let primary = temp.path().join("accounts.db");
        fs::write(&primary, b"data").expect("write primary");

        let set = DatabaseFileSet::for_primary(&primary);
        let report = set.delete_all();

        assert_eq!(report.deleted, vec![primary.clone()]);
        assert!(report.failed.is_empty());
        assert!(!set.any_present());
    }
}

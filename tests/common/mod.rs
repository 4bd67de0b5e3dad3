use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use backup_core::{
    database::{DatabaseFileSet, DatabaseHandle},
    errors::BackupError,
    permissions::{Permission, PermissionGate},
};
use once_cell::sync::Lazy;
use tempfile::TempDir;

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Creates a unique directory that outlives the calling test.
pub fn setup_test_dir() -> PathBuf {
    let temp = TempDir::new().expect("create temp dir");
    let path = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);
    path
}

/// File-backed stand-in for the live embedded database engine.
///
/// The primary file holds committed bytes; anything staged through
/// [`FakeDatabase::stage_in_wal`] lives in the `-wal` sidecar until a
/// checkpoint folds it into the primary. Closing triggers the implicit final
/// checkpoint, matching real engine behavior.
pub struct FakeDatabase {
    file_set: DatabaseFileSet,
    open: bool,
    pub fail_close: bool,
}

impl FakeDatabase {
    pub fn create(dir: &Path, name: &str, contents: &[u8]) -> Self {
        let primary = dir.join(name);
        fs::write(&primary, contents).expect("write primary file");
        let file_set = DatabaseFileSet::for_primary(&primary);
        fs::write(&file_set.shm, b"shm-index").expect("write shm sidecar");
        Self {
            file_set,
            open: true,
            fail_close: false,
        }
    }

    /// Appends bytes to the write-ahead log without touching the primary file.
    pub fn stage_in_wal(&self, bytes: &[u8]) {
        let mut wal = fs::read(&self.file_set.wal).unwrap_or_default();
        wal.extend_from_slice(bytes);
        fs::write(&self.file_set.wal, wal).expect("write wal sidecar");
    }

    /// Overwrites committed content directly, simulating later mutations.
    pub fn commit(&self, contents: &[u8]) {
        fs::write(&self.file_set.primary, contents).expect("write primary file");
    }

    /// Reinitializes the engine against the current on-disk file set.
    pub fn reopen(&mut self) {
        self.open = true;
    }

    pub fn read_primary(&self) -> Vec<u8> {
        fs::read(&self.file_set.primary).expect("read primary file")
    }

    pub fn file_set(&self) -> &DatabaseFileSet {
        &self.file_set
    }
}

impl DatabaseHandle for FakeDatabase {
    fn checkpoint(&self) -> Result<(), BackupError> {
        if self.file_set.wal.exists() {
            let staged = fs::read(&self.file_set.wal)?;
            let mut primary = fs::read(&self.file_set.primary)?;
            primary.extend_from_slice(&staged);
            fs::write(&self.file_set.primary, primary)?;
            fs::remove_file(&self.file_set.wal)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackupError> {
        if self.fail_close {
            return Err(BackupError::EngineClose("engine is busy".into()));
        }
        self.checkpoint()?;
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn primary_path(&self) -> &Path {
        &self.file_set.primary
    }
}

/// Permission gate with a fixed grant set.
pub struct StaticGate {
    granted: Vec<Permission>,
}

impl StaticGate {
    pub fn allowing(granted: Vec<Permission>) -> Self {
        Self { granted }
    }

    pub fn denying_all() -> Self {
        Self {
            granted: Vec::new(),
        }
    }
}

impl PermissionGate for StaticGate {
    fn is_granted(&self, permission: Permission) -> bool {
        self.granted.contains(&permission)
    }
}

use std::{fs::File, io, path::Path, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    database::{DatabaseFileSet, DatabaseHandle},
    errors::BackupError,
    storage::StorageProvider,
};

use super::item::BackupItem;

/// Replaces the live database file set with a chosen backup's bytes.
///
/// The sequence is linear and never branches back: close the engine, delete
/// the live file set, copy the backup into the primary path, report. Once
/// the deletion step has started the original data is gone; a copy failure
/// after that point surfaces as [`BackupError::DataLossWindow`] and leaves
/// the application without a usable database. On success the caller must
/// reinitialize the engine and restart the hosting process before resuming
/// normal database access.
pub struct RestoreExecutor {
    provider: Arc<dyn StorageProvider>,
}

impl RestoreExecutor {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    pub fn restore(
        &self,
        db: &mut dyn DatabaseHandle,
        item: &BackupItem,
    ) -> Result<(), BackupError> {
        let file_set = DatabaseFileSet::for_primary(db.primary_path());
        info!(
            backup = %item.name,
            primary = %file_set.primary.display(),
            "starting database restore"
        );

        // Closing is expected to trigger a final implicit checkpoint. A
        // failure here aborts with the live files still intact.
        if db.is_open() {
            db.close()
                .map_err(|err| BackupError::EngineClose(err.to_string()))?;
        } else {
            debug!("database already closed");
        }

        // Point of no return: the file set is removed as a unit and there is
        // no rollback past this line.
        let report = file_set.delete_all();
        if !report.failed.is_empty() {
            warn!(
                failed = report.failed.len(),
                "some live database files could not be deleted"
            );
        }

        self.copy_backup(&file_set.primary, item)
            .map_err(|err| BackupError::DataLossWindow(err.to_string()))?;

        info!("database restore complete; the engine must be reinitialized by the caller");
        Ok(())
    }

    fn copy_backup(&self, primary: &Path, item: &BackupItem) -> Result<u64, BackupError> {
        let mut input = self.provider.open_input(&item.handle)?;
        let mut output = File::create(primary)?;
        let bytes = io::copy(&mut input, &mut output)?;
        output.sync_all()?;
        debug!(bytes, "backup bytes copied into primary file");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fs,
        io::Write as _,
        path::{Path, PathBuf},
    };

    use tempfile::TempDir;

    use crate::storage::{DirectStorage, StorageHandle};

    struct FileDatabase {
        primary: PathBuf,
        open: bool,
        fail_close: bool,
    }

    impl DatabaseHandle for FileDatabase {
        fn checkpoint(&self) -> Result<(), BackupError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), BackupError> {
            if self.fail_close {
                return Err(BackupError::EngineClose("engine is busy".into()));
            }
            self.open = false;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn primary_path(&self) -> &Path {
            &self.primary
        }
    }

    fn seed_live_files(dir: &Path) -> FileDatabase {
        let primary = dir.join("accounts.db");
        fs::write(&primary, b"live-bytes").expect("write primary");
        fs::write(dir.join("accounts.db-wal"), b"wal").expect("write wal");
        fs::write(dir.join("accounts.db-shm"), b"shm").expect("write shm");
        FileDatabase {
            primary,
            open: true,
            fail_close: false,
        }
    }

    fn backup_in(provider: &DirectStorage, contents: &[u8]) -> BackupItem {
        let stored = provider
            .insert(
                "backup_accounts.db_20240101_080000.db",
                "application/octet-stream",
            )
            .expect("insert backup");
        provider
            .open_output(&stored.handle)
            .expect("open output")
            .write_all(contents)
            .expect("write backup");
        BackupItem {
            handle: stored.handle,
            name: stored.name,
            timestamp: 0,
        }
    }

    #[test]
    fn restore_replaces_the_full_file_set() {
        let data_dir = TempDir::new().expect("data dir");
        let shared = TempDir::new().expect("shared dir");
        let mut db = seed_live_files(data_dir.path());

        let provider = Arc::new(DirectStorage::new(shared.path().to_path_buf()));
        let item = backup_in(&provider, b"backup-bytes");

        let executor = RestoreExecutor::new(provider);
        executor.restore(&mut db, &item).expect("restore");

        assert_eq!(
            fs::read(data_dir.path().join("accounts.db")).expect("read primary"),
            b"backup-bytes"
        );
        assert!(!data_dir.path().join("accounts.db-wal").exists());
        assert!(!data_dir.path().join("accounts.db-shm").exists());
        assert!(!db.is_open());
    }

    #[test]
    fn close_failure_aborts_before_any_deletion() {
        let data_dir = TempDir::new().expect("data dir");
        let shared = TempDir::new().expect("shared dir");
        let mut db = seed_live_files(data_dir.path());
        db.fail_close = true;

        let provider = Arc::new(DirectStorage::new(shared.path().to_path_buf()));
        let item = backup_in(&provider, b"backup-bytes");

        let executor = RestoreExecutor::new(provider);
        assert!(matches!(
            executor.restore(&mut db, &item),
            Err(BackupError::EngineClose(_))
        ));

        assert_eq!(
            fs::read(data_dir.path().join("accounts.db")).expect("read primary"),
            b"live-bytes"
        );
        assert!(data_dir.path().join("accounts.db-wal").exists());
        assert!(data_dir.path().join("accounts.db-shm").exists());
    }

    #[test]
    fn revoked_backup_handle_reports_data_loss_window() {
        let data_dir = TempDir::new().expect("data dir");
        let shared = TempDir::new().expect("shared dir");
        let mut db = seed_live_files(data_dir.path());

        let provider = Arc::new(DirectStorage::new(shared.path().to_path_buf()));
        let item = BackupItem {
            handle: StorageHandle::Path(shared.path().join("revoked.db")),
            name: "revoked.db".into(),
            timestamp: 0,
        };

        let executor = RestoreExecutor::new(provider);
        let err = executor.restore(&mut db, &item).expect_err("restore fails");
        assert!(err.is_fatal());
        // The documented non-atomic failure mode: live files are gone and no
        // replacement was written.
        assert!(!data_dir.path().join("accounts.db").exists());
    }
}

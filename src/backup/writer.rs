use std::{fs::File, io, sync::Arc};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    database::DatabaseHandle,
    errors::BackupError,
    storage::{StorageHandle, StorageProvider},
};

use super::item::{backup_file_name, BackupItem, BACKUP_MIME_TYPE};

/// Streams the live database's primary file into a new timestamped backup
/// object in shared storage.
pub struct BackupWriter {
    provider: Arc<dyn StorageProvider>,
    database_name: String,
}

impl BackupWriter {
    pub fn new(provider: Arc<dyn StorageProvider>, database_name: impl Into<String>) -> Self {
        Self {
            provider,
            database_name: database_name.into(),
        }
    }

    /// Creates one backup of the given database.
    ///
    /// The checkpoint is best-effort: an un-checkpointed backup is still a
    /// valid, if slightly stale, snapshot. A missing primary file is a hard
    /// failure. If the copy fails partway, the partially created storage
    /// object is removed before the error surfaces, so the catalog never
    /// sees a truncated artifact.
    pub fn create_backup(&self, db: &dyn DatabaseHandle) -> Result<BackupItem, BackupError> {
        if let Err(err) = db.checkpoint() {
            warn!(%err, "WAL checkpoint failed; backing up the current primary file anyway");
        }

        let primary = db.primary_path();
        if !primary.exists() {
            error!(path = %primary.display(), "database file not found for backup");
            return Err(BackupError::NotFound(primary.to_path_buf()));
        }

        let created_at = Utc::now();
        let name = backup_file_name(&self.database_name, created_at);
        // The provider uniquifies colliding names; the stored record carries
        // the name that actually landed.
        let stored = self.provider.insert(&name, BACKUP_MIME_TYPE)?;

        match self.copy_primary(&stored.handle, primary) {
            Ok(bytes) => {
                info!(name = %stored.name, bytes, "backup created");
                Ok(BackupItem {
                    handle: stored.handle,
                    name: stored.name,
                    timestamp: created_at.timestamp(),
                })
            }
            Err(err) => {
                error!(name = %stored.name, %err, "backup copy failed");
                if let Err(cleanup_err) = self.provider.delete(&stored.handle) {
                    warn!(name = %stored.name, %cleanup_err, "failed to clean up partial backup object");
                }
                Err(err)
            }
        }
    }

    fn copy_primary(
        &self,
        handle: &StorageHandle,
        primary: &std::path::Path,
    ) -> Result<u64, BackupError> {
        let mut input = File::open(primary)?;
        let mut output = self.provider.open_output(handle)?;
        let bytes = io::copy(&mut input, &mut output)?;
        output.flush()?;
        Ok(bytes)
    }
}

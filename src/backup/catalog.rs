use std::sync::Arc;

use tracing::{debug, error};

use crate::storage::StorageProvider;

use super::item::{backup_prefix, parse_backup_timestamp, BackupItem};

/// Enumerates existing backup objects matching the subsystem's naming
/// convention, newest first.
pub struct BackupCatalog {
    provider: Arc<dyn StorageProvider>,
    database_name: String,
}

impl BackupCatalog {
    pub fn new(provider: Arc<dyn StorageProvider>, database_name: impl Into<String>) -> Self {
        Self {
            provider,
            database_name: database_name.into(),
        }
    }

    /// Lists available backups. Never fails: query errors are logged and
    /// produce an empty listing.
    ///
    /// On the legacy storage model the read permission must already be
    /// granted; requesting it is the permission coordinator's job.
    pub fn list_backups(&self) -> Vec<BackupItem> {
        let prefix = backup_prefix(&self.database_name);
        let objects = match self.provider.query(&prefix) {
            Ok(objects) => objects,
            Err(err) => {
                error!(%err, "error querying backups");
                return Vec::new();
            }
        };

        let mut items: Vec<BackupItem> = objects
            .into_iter()
            // The provider matches on name prefix alone; require the suffix
            // too so partial or foreign matches never surface.
            .filter(|object| object.name.ends_with(".db"))
            .map(|object| BackupItem {
                timestamp: parse_backup_timestamp(&object.name),
                handle: object.handle,
                name: object.name,
            })
            .collect();

        // The provider reports newest-modified first; this sort is stable, so
        // entries without a parseable timestamp keep that order.
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        debug!(count = items.len(), "found backups");
        items
    }
}

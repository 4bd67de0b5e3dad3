use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    errors::BackupError,
    storage::{ConsentIntent, StorageProvider},
};

use super::item::BackupItem;

/// How a delete request concluded at the subsystem boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The object was removed directly.
    Deleted,
    /// The platform requires a system-mediated confirmation; the caller must
    /// launch the consent UI and report back via
    /// [`BackupDeleter::resolve_consent`].
    ConsentRequired(ConsentIntent),
}

/// Removes backup objects, choosing between a direct delete and a
/// consent-mediated delete depending on platform capability.
pub struct BackupDeleter {
    provider: Arc<dyn StorageProvider>,
}

impl BackupDeleter {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    /// Deletes one backup.
    ///
    /// On consent-mediated platforms the consent path is taken before any
    /// direct-delete attempt. If the consent intent itself cannot be built
    /// (for example a malformed handle), exactly one direct delete is
    /// attempted rather than surfacing a dead end.
    pub fn delete(&self, item: &BackupItem) -> Result<DeleteOutcome, BackupError> {
        if self.provider.requires_delete_consent(&item.handle) {
            match self
                .provider
                .request_delete_consent(std::slice::from_ref(&item.handle))
            {
                Ok(intent) => return Ok(DeleteOutcome::ConsentRequired(intent)),
                Err(err) => {
                    warn!(name = %item.name, %err, "could not prepare delete consent; falling back to a direct delete");
                }
            }
        }
        self.direct_delete(item).map(|_| DeleteOutcome::Deleted)
    }

    /// Completes a consent-mediated delete once the system UI has resolved.
    pub fn resolve_consent(
        &self,
        intent: &ConsentIntent,
        granted: bool,
    ) -> Result<(), BackupError> {
        if !granted {
            return Err(BackupError::ConsentDeclined);
        }
        let rows = self.provider.execute_consented_delete(intent)?;
        if rows == 0 {
            return Err(BackupError::Storage(
                "consented delete removed no objects".into(),
            ));
        }
        info!(rows, "consent-mediated delete completed");
        Ok(())
    }

    fn direct_delete(&self, item: &BackupItem) -> Result<(), BackupError> {
        let rows = self.provider.delete(&item.handle)?;
        if rows == 0 {
            return Err(BackupError::Storage(format!(
                "backup `{}` not found",
                item.name
            )));
        }
        info!(name = %item.name, "backup deleted");
        Ok(())
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Error type that captures the backup subsystem's failure taxonomy.
///
/// Every variant except [`BackupError::DataLossWindow`] is locally
/// recoverable: the caller reports it and returns to its previous phase with
/// no data touched. `DataLossWindow` means a restore failed after the live
/// database files were already deleted, leaving no usable database behind.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("database file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("storage permission denied: {0}")]
    PermissionDenied(String),
    #[error("delete consent declined by the user")]
    ConsentDeclined,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to close database engine: {0}")]
    EngineClose(String),
    #[error("restore failed after live database files were removed: {0}")]
    DataLossWindow(String),
    #[error("storage provider error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl BackupError {
    /// True when the failure left the application without a usable database.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackupError::DataLossWindow(_))
    }
}

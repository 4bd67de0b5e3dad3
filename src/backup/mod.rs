pub mod catalog;
pub mod deleter;
pub mod item;
pub mod restore;
pub mod writer;

pub use catalog::BackupCatalog;
pub use deleter::{BackupDeleter, DeleteOutcome};
pub use item::{backup_file_name, backup_prefix, BackupItem, BACKUP_MIME_TYPE};
pub use restore::RestoreExecutor;
pub use writer::BackupWriter;

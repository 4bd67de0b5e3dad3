use chrono::{DateTime, NaiveDateTime, Utc};

use crate::storage::StorageHandle;

pub const BACKUP_MIME_TYPE: &str = "application/octet-stream";
const BACKUP_EXTENSION: &str = ".db";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Identifies one backup artifact in shared storage.
///
/// The handle is owned by the storage adapter and never mutated. The
/// timestamp is best-effort, parsed back out of the display name; `0` means
/// unknown and ordering then falls back to provider modification order.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupItem {
    pub handle: StorageHandle,
    pub name: String,
    pub timestamp: i64,
}

/// Display-name prefix shared by every backup of the given database.
pub fn backup_prefix(database_name: &str) -> String {
    format!("backup_{database_name}_")
}

/// Builds the `backup_<dbname>_<yyyyMMdd>_<HHmmss>.db` artifact name.
pub fn backup_file_name(database_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        backup_prefix(database_name),
        at.format(BACKUP_TIMESTAMP_FORMAT),
        BACKUP_EXTENSION
    )
}

/// Best-effort parse of the creation time embedded in a backup name.
///
/// Returns seconds since the epoch, or `0` when the name does not carry a
/// well-formed `<yyyyMMdd>_<HHmmss>` suffix.
pub fn parse_backup_timestamp(name: &str) -> i64 {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() < 3 {
        return 0;
    }
    let date_part = parts[parts.len() - 2];
    let time_part = parts[parts.len() - 1];
    if !is_digits(date_part, 8) || !time_part.ends_with(BACKUP_EXTENSION) {
        return 0;
    }
    let time_digits = &time_part[..time_part.len() - BACKUP_EXTENSION.len()];
    if !is_digits(time_digits, 6) {
        return 0;
    }
    let raw = format!("{date_part}{time_digits}");
    NaiveDateTime::parse_from_str(&raw, "%Y%m%d%H%M%S")
        .map(|naive| naive.and_utc().timestamp())
        .unwrap_or(0)
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

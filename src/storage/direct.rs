use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use crate::errors::BackupError;

use super::{ConsentIntent, Result, StorageHandle, StorageProvider, StoredObject};

/// Legacy direct-filesystem storage: objects are plain files under a public
/// shared folder and handles are their paths.
///
/// This model predates consent-mediated deletion; the app is expected to hold
/// the legacy read/write storage permissions before calling in (enforced by
/// the permission coordinator, not here).
#[derive(Debug, Clone)]
pub struct DirectStorage {
    shared_dir: PathBuf,
}

impl DirectStorage {
    pub fn new(shared_dir: PathBuf) -> Self {
        Self { shared_dir }
    }

    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    fn resolve(&self, handle: &StorageHandle) -> Result<PathBuf> {
        match handle {
            StorageHandle::Path(path) => Ok(path.clone()),
            StorageHandle::Object(id) => Err(BackupError::Storage(format!(
                "direct storage cannot resolve managed object handle {id}"
            ))),
        }
    }
}

impl StorageProvider for DirectStorage {
    fn insert(&self, name: &str, _mime_type: &str) -> Result<StoredObject> {
        if !self.shared_dir.exists() {
            fs::create_dir_all(&self.shared_dir)?;
        }
        // Backup names only carry second granularity, so collisions are
        // possible; a colliding name must never truncate an earlier object.
        let name =
            super::deduplicate_name(name, |candidate| self.shared_dir.join(candidate).exists());
        let path = self.shared_dir.join(&name);
        File::create(&path)?;
        debug!(path = %path.display(), "created direct storage entry");
        let modified_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or(0);
        Ok(StoredObject {
            handle: StorageHandle::Path(path),
            name,
            modified_at,
        })
    }

    fn open_output(&self, handle: &StorageHandle) -> Result<Box<dyn Write + Send>> {
        let path = self.resolve(handle)?;
        Ok(Box::new(File::create(path)?))
    }

    fn open_input(&self, handle: &StorageHandle) -> Result<Box<dyn Read + Send>> {
        let path = self.resolve(handle)?;
        if !path.exists() {
            return Err(BackupError::NotFound(path));
        }
        Ok(Box::new(File::open(path)?))
    }

    fn query(&self, name_prefix: &str) -> Result<Vec<StoredObject>> {
        if !self.shared_dir.exists() {
            return Ok(Vec::new());
        }
        let mut objects = Vec::new();
        for entry in fs::read_dir(&self.shared_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if !name.starts_with(name_prefix) {
                continue;
            }
            let modified_at = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| elapsed.as_secs() as i64)
                .unwrap_or(0);
            objects.push(StoredObject {
                handle: StorageHandle::Path(path),
                name,
                modified_at,
            });
        }
        objects.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(objects)
    }

    fn requires_delete_consent(&self, _handle: &StorageHandle) -> bool {
        false
    }

    fn request_delete_consent(&self, _handles: &[StorageHandle]) -> Result<ConsentIntent> {
        Err(BackupError::Storage(
            "direct storage does not mediate deletes through consent".into(),
        ))
    }

    fn execute_consented_delete(&self, _intent: &ConsentIntent) -> Result<usize> {
        Err(BackupError::Storage(
            "direct storage does not mediate deletes through consent".into(),
        ))
    }

    fn delete(&self, handle: &StorageHandle) -> Result<usize> {
        let path = self.resolve(handle)?;
        if !path.exists() {
            return Ok(0);
        }
        fs::remove_file(&path)?;
        debug!(path = %path.display(), "deleted direct storage entry");
        Ok(1)
    }
}

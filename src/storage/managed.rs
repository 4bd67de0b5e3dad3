use std::{
    collections::HashMap,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::BackupError;

use super::{ConsentIntent, Result, StorageHandle, StorageProvider, StoredObject};

const REGISTRY_FILE: &str = ".objects.json";

/// Managed shared-storage provider: objects are addressed through opaque ids
/// resolved by a registry the provider persists alongside the object bytes.
///
/// Each object records the identity that created it. On platforms where the
/// OS brokers deletion of shared objects, removing an object another identity
/// owns must go through the consent flow; a direct delete is refused.
pub struct ManagedStorage {
    shared_dir: PathBuf,
    owner: String,
    consent_mediated_delete: bool,
    registry: Mutex<Registry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    objects: HashMap<Uuid, RegistryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryEntry {
    name: String,
    owner: String,
    mime_type: String,
    modified_at: i64,
}

impl ManagedStorage {
    pub fn new(
        shared_dir: PathBuf,
        owner: impl Into<String>,
        consent_mediated_delete: bool,
    ) -> Result<Self> {
        if !shared_dir.exists() {
            fs::create_dir_all(&shared_dir)?;
        }
        let registry = load_registry(&shared_dir.join(REGISTRY_FILE))?;
        Ok(Self {
            shared_dir,
            owner: owner.into(),
            consent_mediated_delete,
            registry: Mutex::new(registry),
        })
    }

    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    fn registry_path(&self) -> PathBuf {
        self.shared_dir.join(REGISTRY_FILE)
    }

    fn object_id(handle: &StorageHandle) -> Result<Uuid> {
        match handle {
            StorageHandle::Object(id) => Ok(*id),
            StorageHandle::Path(path) => Err(BackupError::Storage(format!(
                "managed storage cannot resolve direct path handle {}",
                path.display()
            ))),
        }
    }

    fn object_path(&self, entry: &RegistryEntry) -> PathBuf {
        self.shared_dir.join(&entry.name)
    }

    fn persist(&self, registry: &Registry) -> Result<()> {
        let data = serde_json::to_string_pretty(registry)?;
        let path = self.registry_path();
        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(data.as_bytes())?;
        file.flush()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Removes one object's bytes and registry record, returning rows affected.
    fn remove_object(&self, registry: &mut Registry, id: Uuid) -> Result<usize> {
        let entry = match registry.objects.remove(&id) {
            Some(entry) => entry,
            None => return Ok(0),
        };
        let path = self.object_path(&entry);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        self.persist(registry)?;
        debug!(name = %entry.name, "deleted managed storage object");
        Ok(1)
    }
}

impl StorageProvider for ManagedStorage {
    fn insert(&self, name: &str, mime_type: &str) -> Result<StoredObject> {
        let mut registry = self.registry.lock().expect("registry lock poisoned");
        // Backup names only carry second granularity, so collisions are
        // possible; reusing a taken name would alias two ids to one file.
        let name = super::deduplicate_name(name, |candidate| {
            registry
                .objects
                .values()
                .any(|entry| entry.name == candidate)
                || self.shared_dir.join(candidate).exists()
        });
        let id = Uuid::new_v4();
        let entry = RegistryEntry {
            name,
            owner: self.owner.clone(),
            mime_type: mime_type.to_string(),
            modified_at: Utc::now().timestamp(),
        };
        File::create(self.object_path(&entry))?;
        let stored = StoredObject {
            handle: StorageHandle::Object(id),
            name: entry.name.clone(),
            modified_at: entry.modified_at,
        };
        registry.objects.insert(id, entry);
        self.persist(&registry)?;
        debug!(%id, name = %stored.name, "created managed storage entry");
        Ok(stored)
    }

    fn open_output(&self, handle: &StorageHandle) -> Result<Box<dyn Write + Send>> {
        let id = Self::object_id(handle)?;
        let mut registry = self.registry.lock().expect("registry lock poisoned");
        let entry = registry
            .objects
            .get_mut(&id)
            .ok_or_else(|| BackupError::Storage(format!("unknown storage object {id}")))?;
        entry.modified_at = Utc::now().timestamp();
        let path = self.shared_dir.join(&entry.name);
        self.persist(&registry)?;
        Ok(Box::new(File::create(path)?))
    }

    fn open_input(&self, handle: &StorageHandle) -> Result<Box<dyn Read + Send>> {
        let id = Self::object_id(handle)?;
        let registry = self.registry.lock().expect("registry lock poisoned");
        let entry = registry
            .objects
            .get(&id)
            .ok_or_else(|| BackupError::Storage(format!("unknown storage object {id}")))?;
        let path = self.object_path(entry);
        if !path.exists() {
            return Err(BackupError::NotFound(path));
        }
        Ok(Box::new(File::open(path)?))
    }

    fn query(&self, name_prefix: &str) -> Result<Vec<StoredObject>> {
        let registry = self.registry.lock().expect("registry lock poisoned");
        let mut objects: Vec<StoredObject> = registry
            .objects
            .iter()
            .filter(|(_, entry)| entry.name.starts_with(name_prefix))
            .filter(|(_, entry)| self.object_path(entry).exists())
            .map(|(id, entry)| StoredObject {
                handle: StorageHandle::Object(*id),
                name: entry.name.clone(),
                modified_at: entry.modified_at,
            })
            .collect();
        objects.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(objects)
    }

    fn requires_delete_consent(&self, handle: &StorageHandle) -> bool {
        if !self.consent_mediated_delete {
            return false;
        }
        let id = match handle {
            StorageHandle::Object(id) => *id,
            StorageHandle::Path(_) => return false,
        };
        let registry = self.registry.lock().expect("registry lock poisoned");
        registry
            .objects
            .get(&id)
            .map(|entry| entry.owner != self.owner)
            .unwrap_or(false)
    }

    fn request_delete_consent(&self, handles: &[StorageHandle]) -> Result<ConsentIntent> {
        let registry = self.registry.lock().expect("registry lock poisoned");
        for handle in handles {
            let id = Self::object_id(handle)?;
            if !registry.objects.contains_key(&id) {
                return Err(BackupError::Storage(format!(
                    "cannot build delete consent for unknown object {id}"
                )));
            }
        }
        Ok(ConsentIntent::new(handles.to_vec()))
    }

    fn execute_consented_delete(&self, intent: &ConsentIntent) -> Result<usize> {
        let mut registry = self.registry.lock().expect("registry lock poisoned");
        let mut rows = 0;
        for handle in &intent.handles {
            let id = Self::object_id(handle)?;
            rows += self.remove_object(&mut registry, id)?;
        }
        Ok(rows)
    }

    fn delete(&self, handle: &StorageHandle) -> Result<usize> {
        if self.requires_delete_consent(handle) {
            return Err(BackupError::PermissionDenied(
                "object is not owned by this app; deletion requires user consent".into(),
            ));
        }
        let id = Self::object_id(handle)?;
        let mut registry = self.registry.lock().expect("registry lock poisoned");
        self.remove_object(&mut registry, id)
    }
}

fn load_registry(path: &Path) -> Result<Registry> {
    if !path.exists() {
        return Ok(Registry::default());
    }
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

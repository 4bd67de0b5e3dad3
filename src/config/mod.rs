use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::BackupError,
    storage::{DirectStorage, ManagedStorage, StorageProvider},
};

const CONFIG_FILE: &str = "backup.json";
const DEFAULT_DATABASE_NAME: &str = "accounts.db";

/// Which physical storage-access model the platform exposes.
///
/// `Direct` is the legacy model: plain files under a public shared folder,
/// gated by explicit read/write permissions. `Managed` is the scoped model:
/// a shared-storage provider resolving opaque handles, with OS-mediated
/// delete consent for objects the app does not own. The model is decided
/// once here; call sites never re-probe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageModel {
    Direct,
    Managed,
}

/// Stores the backup subsystem's configurable settings and platform capability flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "BackupConfig::default_database_name")]
    pub database_name: String,
    /// Optional override for the shared backup folder. Defaults to the
    /// platform's downloads directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_dir: Option<PathBuf>,
    #[serde(default = "BackupConfig::default_storage_model")]
    pub storage_model: StorageModel,
    /// Legacy platforms need explicit read/write grants before touching the
    /// shared folder.
    #[serde(default)]
    pub require_legacy_permissions: bool,
    /// Whether the platform brokers deletion of shared objects through a
    /// per-object consent flow.
    #[serde(default)]
    pub consent_mediated_delete: bool,
    /// Identity recorded against objects this app creates in managed storage.
    #[serde(default = "BackupConfig::default_app_identity")]
    pub app_identity: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            database_name: Self::default_database_name(),
            shared_dir: None,
            storage_model: Self::default_storage_model(),
            require_legacy_permissions: false,
            consent_mediated_delete: true,
            app_identity: Self::default_app_identity(),
        }
    }
}

impl BackupConfig {
    fn default_database_name() -> String {
        DEFAULT_DATABASE_NAME.into()
    }

    fn default_storage_model() -> StorageModel {
        StorageModel::Managed
    }

    fn default_app_identity() -> String {
        "backup_core".into()
    }

    /// Resolves the shared backup folder, preferring the configured override.
    pub fn shared_dir(&self) -> PathBuf {
        self.shared_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Constructs the storage provider matching the configured model.
    ///
    /// Called once at wiring time; the returned provider is the only place
    /// the two access models diverge.
    pub fn build_provider(&self) -> Result<Arc<dyn StorageProvider>, BackupError> {
        let shared_dir = self.shared_dir();
        match self.storage_model {
            StorageModel::Direct => Ok(Arc::new(DirectStorage::new(shared_dir))),
            StorageModel::Managed => Ok(Arc::new(ManagedStorage::new(
                shared_dir,
                self.app_identity.clone(),
                self.consent_mediated_delete,
            )?)),
        }
    }
}

/// Handles persistence for [`BackupConfig`].
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn with_base_dir(base: PathBuf) -> Result<Self, BackupError> {
        fs::create_dir_all(&base)?;
        Ok(Self::new(base.join(CONFIG_FILE)))
    }

    /// Uses the platform config directory, e.g. `~/.config/backup_core`.
    pub fn new_default() -> Result<Self, BackupError> {
        let base = dirs::config_dir()
            .map(|dir| dir.join("backup_core"))
            .unwrap_or_else(|| PathBuf::from(".backup_core"));
        Self::with_base_dir(base)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> Result<BackupConfig, BackupError> {
        if self.config_path.exists() {
            let data = fs::read_to_string(&self.config_path)?;
            Ok(serde_json::from_str(&data)?)
        } else {
            Ok(BackupConfig::default())
        }
    }

    pub fn save(&self, config: &BackupConfig) -> Result<(), BackupError> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(config)?;
        let tmp = self.config_path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(data.as_bytes())?;
        file.flush()?;
        fs::rename(&tmp, &self.config_path)?;
        Ok(())
    }
}

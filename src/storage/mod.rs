pub mod direct;
pub mod managed;

use std::{
    io::{Read, Write},
    path::PathBuf,
};

use uuid::Uuid;

use crate::errors::BackupError;

pub type Result<T> = std::result::Result<T, BackupError>;

/// Opaque reference to a stored object.
///
/// The direct-filesystem model addresses objects by path; the managed
/// provider hands out indirect object ids that only it can resolve. Handles
/// are never mutated, only replaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageHandle {
    Path(PathBuf),
    Object(Uuid),
}

/// Raw provider record for one stored object, prior to domain mapping.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub handle: StorageHandle,
    pub name: String,
    /// Provider-reported modification time, seconds since the epoch.
    pub modified_at: i64,
}

/// Token for an OS-brokered delete confirmation covering one or more objects.
///
/// Opaque to the UI layer: it is carried through the "launch system consent
/// UI" effect and handed back unchanged once the user has responded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentIntent {
    pub id: Uuid,
    pub handles: Vec<StorageHandle>,
}

impl ConsentIntent {
    pub fn new(handles: Vec<StorageHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            handles,
        }
    }
}

/// Abstraction over the platform's shared-storage access point.
///
/// Two physical implementations exist: [`direct::DirectStorage`] for the
/// legacy direct-filesystem model and [`managed::ManagedStorage`] for the
/// managed shared-storage provider. The caller picks one at construction
/// time; call sites never re-probe OS capabilities.
pub trait StorageProvider: Send + Sync {
    /// Creates a new empty storage object and returns its record.
    ///
    /// A requested display name that is already taken is uniquified rather
    /// than reused, so no two handles ever alias the same bytes; the record
    /// carries the name actually stored.
    fn insert(&self, name: &str, mime_type: &str) -> Result<StoredObject>;

    /// Opens a writer over an object created by [`StorageProvider::insert`].
    fn open_output(&self, handle: &StorageHandle) -> Result<Box<dyn Write + Send>>;

    /// Opens a reader over an existing object.
    fn open_input(&self, handle: &StorageHandle) -> Result<Box<dyn Read + Send>>;

    /// Returns objects whose display name starts with `name_prefix`, newest
    /// modification first.
    fn query(&self, name_prefix: &str) -> Result<Vec<StoredObject>>;

    /// Whether deleting this object must go through a consent flow.
    fn requires_delete_consent(&self, handle: &StorageHandle) -> bool;

    /// Builds the consent token for a mediated delete of `handles`.
    fn request_delete_consent(&self, handles: &[StorageHandle]) -> Result<ConsentIntent>;

    /// Performs the delete a granted consent intent authorizes.
    fn execute_consented_delete(&self, intent: &ConsentIntent) -> Result<usize>;

    /// Directly deletes an object, returning the number of rows affected.
    fn delete(&self, handle: &StorageHandle) -> Result<usize>;
}

pub use direct::DirectStorage;
pub use managed::ManagedStorage;

/// Picks a display name not already taken, suffixing " (n)" before the
/// extension the way managed media providers resolve collisions.
fn deduplicate_name(requested: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(requested) {
        return requested.to_string();
    }
    let (stem, ext) = match requested.rfind('.') {
        Some(dot) => requested.split_at(dot),
        None => (requested, ""),
    };
    let mut counter = 1u32;
    loop {
        let candidate = format!("{stem} ({counter}){ext}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

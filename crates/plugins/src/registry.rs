//! Installed-plugin registry.
//!
//! The whole registry is loaded for every operation, modified in memory and
//! written back in full. [`FileStore`] writes through a temp file and a
//! rename, so a crash never leaves a torn store behind.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{error::RegistryError, types::InstallationRecord};

/// Store format version written by this crate.
pub const STORE_VERSION: u32 = 1;

/// On-disk shape of the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryData {
    pub version: u32,
    #[serde(default)]
    pub plugins: BTreeMap<String, InstallationRecord>,
}

impl Default for RegistryData {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            plugins: BTreeMap::new(),
        }
    }
}

/// Durable backing for the registry.
pub trait RegistryStore: Send + Sync {
    /// Load the full registry. A store that does not exist yet is empty.
    fn load(&self) -> Result<RegistryData, RegistryError>;

    /// Replace the full registry.
    fn save(&self, data: &RegistryData) -> Result<(), RegistryError>;

    /// Where the store lives, for error messages.
    fn location(&self) -> &Path;
}

/// JSON file store with atomic writes.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryStore for FileStore {
    fn load(&self) -> Result<RegistryData, RegistryError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RegistryData::default());
            },
            Err(source) => {
                return Err(RegistryError::StoreUnreadable {
                    path: self.path.clone(),
                    source,
                });
            },
        };
        serde_json::from_str(&content).map_err(|e| RegistryError::StoreCorrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn save(&self, data: &RegistryData) -> Result<(), RegistryError> {
        let unwritable = |source| RegistryError::StoreUnwritable {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(unwritable)?;
        }
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| unwritable(std::io::Error::other(e)))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(unwritable)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            unwritable(e)
        })?;
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<RegistryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> Result<RegistryData, RegistryError> {
        Ok(self.data.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, data: &RegistryData) -> Result<(), RegistryError> {
        *self.data.lock().unwrap_or_else(|e| e.into_inner()) = data.clone();
        Ok(())
    }

    fn location(&self) -> &Path {
        Path::new(":memory:")
    }
}

/// CRUD over installation records keyed by plugin name.
pub struct Registry {
    store: Box<dyn RegistryStore>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("store", &self.store.location())
            .finish()
    }
}

impl Registry {
    pub fn new(store: impl RegistryStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Registry backed by a JSON file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(FileStore::new(path))
    }

    pub fn location(&self) -> &Path {
        self.store.location()
    }

    fn load(&self) -> Result<RegistryData, RegistryError> {
        let mut data = self.store.load()?;
        if data.version != STORE_VERSION {
            return Err(RegistryError::StoreCorrupt {
                path: self.store.location().to_path_buf(),
                reason: format!("unsupported store version {}", data.version),
            });
        }
        for (name, record) in &mut data.plugins {
            record.name.clone_from(name);
        }
        Ok(data)
    }

    pub fn get(&self, name: &str) -> Result<InstallationRecord, RegistryError> {
        self.find(name)?.ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn find(&self, name: &str) -> Result<Option<InstallationRecord>, RegistryError> {
        Ok(self.load()?.plugins.remove(name))
    }

    /// All records, ordered by name.
    pub fn list(&self) -> Result<Vec<InstallationRecord>, RegistryError> {
        Ok(self.load()?.plugins.into_values().collect())
    }

    /// Insert or replace the record under `record.name`.
    pub fn upsert(&self, record: InstallationRecord) -> Result<(), RegistryError> {
        let mut data = self.load()?;
        debug!(plugin = %record.name, "registry upsert");
        data.plugins.insert(record.name.clone(), record);
        self.store.save(&data)
    }

    /// Delete a record, returning the target paths it owned.
    pub fn remove(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        let mut data = self.load()?;
        let record = data
            .plugins
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })?;
        self.store.save(&data)?;
        debug!(plugin = %name, "registry remove");
        Ok(record.paths)
    }
}

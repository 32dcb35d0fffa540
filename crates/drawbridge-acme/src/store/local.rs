//! Single-file JSON store with atomic writes

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{Store, StoreTransaction};
use crate::errors::StoreError;
use crate::types::StoredData;

/// Keeps everything in one JSON file, the classic `acme.json` layout.
///
/// The file holds private keys, so on Unix it must not be readable by
/// group or others. Loading a file with looser permissions is a hard
/// error rather than a warning.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredData, StoreError> {
        if !self.path.exists() {
            return Ok(StoredData::default());
        }
        check_permissions(&self.path)?;
        let raw = std::fs::read(&self.path)?;
        if raw.is_empty() {
            return Ok(StoredData::default());
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Writes a temp file with 0600 permissions, then renames it over the
    /// target so readers never observe a partial document.
    pub fn save(&self, data: &StoredData) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(data)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)?;
        debug!("Persisted certificate state to {}", self.path.display());
        Ok(())
    }
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    if mode & 0o077 != 0 {
        return Err(StoreError::Permissions {
            path: path.display().to_string(),
            mode: mode & 0o777,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[async_trait]
impl Store for LocalStore {
    async fn load(&self) -> Result<StoredData, StoreError> {
        self.read()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let data = self.read()?;
        Ok(Box::new(LocalTransaction {
            store: self.clone(),
            data,
        }))
    }
}

struct LocalTransaction {
    store: LocalStore,
    data: StoredData,
}

#[async_trait]
impl StoreTransaction for LocalTransaction {
    fn data(&mut self) -> &mut StoredData {
        &mut self.data
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.store.save(&self.data)
    }
}

//! Local storage layout for audio files
//!
//! Every asset owns exactly one file at `<storage-dir>/<asset-id>.<ext>`.
//! The naming is what lets an embedded blob be restored onto the same path
//! later, so it must not change.

use crate::models::{AssetId, LocalFile};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Flat directory of per-asset audio files
#[derive(Debug, Clone)]
pub struct LocalStorage {
    dir: PathBuf,
}

impl LocalStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ensure the storage directory exists
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Conventional path of an asset's file
    pub fn path_for(&self, id: &AssetId, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, extension))
    }

    /// Reserve a descriptor for a new asset under a fresh identifier
    ///
    /// Nothing is created on disk; callers create the file themselves.
    pub fn allocate(&self, extension: &str) -> LocalFile {
        let id = AssetId::new();
        LocalFile::new(id, self.path_for(&id, extension))
    }

    /// Find the file backing an asset, whatever its extension
    pub fn locator_for(&self, id: &AssetId) -> Option<PathBuf> {
        let stem = id.to_string();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Storage directory {} unreadable: {}", self.dir.display(), e);
                return None;
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.is_file()
                    && path
                        .file_stem()
                        .map(|s| s.to_string_lossy() == stem)
                        .unwrap_or(false)
            })
    }

    /// Write restored bytes onto the asset's conventional path
    pub fn materialize(&self, file: &LocalFile, bytes: &[u8]) -> io::Result<()> {
        self.ensure_dir()?;
        let partial = file
            .path
            .with_extension(format!("{}.partial", file.extension()));
        if let Err(e) = fs::write(&partial, bytes).and_then(|_| fs::rename(&partial, &file.path)) {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        debug!("Materialized {} bytes to {}", bytes.len(), file.path.display());
        Ok(())
    }

    /// Remove the file backing an asset; a missing file is not an error
    pub fn remove(&self, id: &AssetId) -> io::Result<bool> {
        match self.locator_for(id) {
            Some(path) => self.remove_path(&path),
            None => {
                warn!("No local file to remove for asset {}", id);
                Ok(false)
            }
        }
    }

    /// Remove a file by path, wherever its name came from
    pub fn remove_path(&self, path: &Path) -> io::Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

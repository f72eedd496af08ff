//! Import of external audio files
//!
//! The source is copied into local storage under a fresh identifier and the
//! duration is read from the copy, never from the source. A failed import
//! leaves nothing behind in local storage.

use super::probe::{is_usable, DurationReader, HeaderReader, MetadataReader};
use crate::error::{AudioError, Result};
use crate::models::{LocalFile, TakeFile, DEFAULT_EXTENSION};
use crate::storage::LocalStorage;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Access bracket for files outside the application's own storage
///
/// A portal-provided document may only be readable between these two calls.
pub trait SecurityScope: Send + Sync + 'static {
    /// Returns whether access was granted and must be ended later
    fn begin_access(&self, source: &Path) -> bool;
    fn end_access(&self, source: &Path);
}

/// Plain filesystem paths need no bracket
pub struct Unscoped;

impl SecurityScope for Unscoped {
    fn begin_access(&self, _source: &Path) -> bool {
        false
    }

    fn end_access(&self, _source: &Path) {}
}

/// Holds scoped access for as long as it lives
struct ScopedAccess {
    scope: Arc<dyn SecurityScope>,
    source: PathBuf,
    granted: bool,
}

impl ScopedAccess {
    fn acquire(scope: Arc<dyn SecurityScope>, source: &Path) -> Self {
        let granted = scope.begin_access(source);
        Self {
            scope,
            source: source.to_path_buf(),
            granted,
        }
    }
}

impl Drop for ScopedAccess {
    fn drop(&mut self) {
        if self.granted {
            self.scope.end_access(&self.source);
        }
    }
}

/// A destination file removed on drop unless kept
struct PendingFile {
    path: PathBuf,
    keep: bool,
}

impl PendingFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            keep: false,
        }
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed incomplete import {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// Copies external files into local storage and measures them
pub struct ImportPipeline {
    storage: LocalStorage,
    scope: Arc<dyn SecurityScope>,
    primary: Arc<dyn DurationReader>,
    fallback: Arc<dyn DurationReader>,
}

impl ImportPipeline {
    pub fn new(storage: LocalStorage) -> Self {
        Self {
            storage,
            scope: Arc::new(Unscoped),
            primary: Arc::new(MetadataReader),
            fallback: Arc::new(HeaderReader),
        }
    }

    /// Use a different access bracket for sources
    pub fn with_scope(mut self, scope: Arc<dyn SecurityScope>) -> Self {
        self.scope = scope;
        self
    }

    /// Replace the duration readers
    pub fn with_readers(
        mut self,
        primary: Arc<dyn DurationReader>,
        fallback: Arc<dyn DurationReader>,
    ) -> Self {
        self.primary = primary;
        self.fallback = fallback;
        self
    }

    /// Copy `source` into local storage and read its duration
    pub async fn import(&self, source: &Path) -> Result<TakeFile> {
        let _access = ScopedAccess::acquire(self.scope.clone(), source);

        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_EXTENSION);
        let dest = self.storage.allocate(extension);

        let pending = self.copy_in(source, &dest).await?;

        let duration = self.probe(&dest.path).await.map_err(|e| {
            warn!("Rejecting import of {}: {}", source.display(), e);
            AudioError::InvalidAudioFormat(e)
        })?;

        pending.keep();
        info!(
            "Imported {} as {} ({:.2}s)",
            source.display(),
            dest.path.display(),
            duration
        );
        Ok(TakeFile {
            file: dest,
            duration,
        })
    }

    async fn copy_in(&self, source: &Path, dest: &LocalFile) -> Result<PendingFile> {
        self.storage
            .ensure_dir()
            .map_err(|e| AudioError::CopyFailed(format!("Storage unavailable: {}", e)))?;

        if tokio::fs::try_exists(&dest.path).await.unwrap_or(false) {
            warn!("Destination {} already exists, replacing", dest.path.display());
            tokio::fs::remove_file(&dest.path)
                .await
                .map_err(|e| AudioError::CopyFailed(format!("Cannot replace destination: {}", e)))?;
        }

        let pending = PendingFile::new(&dest.path);
        let bytes = tokio::fs::copy(source, &dest.path).await.map_err(|e| {
            AudioError::CopyFailed(format!("{}: {}", source.display(), e))
        })?;
        debug!("Copied {} bytes to {}", bytes, dest.path.display());

        Ok(pending)
    }

    /// Primary reader first, header fallback when it yields nothing usable
    async fn probe(&self, path: &Path) -> std::result::Result<f64, String> {
        let primary = self.primary.clone();
        let fallback = self.fallback.clone();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            match primary.read(&path) {
                Ok(duration) if is_usable(duration) => return Ok(duration),
                Ok(duration) => debug!("Metadata duration {} unusable, reading header", duration),
                Err(e) => debug!("Metadata probe failed ({}), reading header", e),
            }

            match fallback.read(&path) {
                Ok(duration) if is_usable(duration) => Ok(duration),
                Ok(duration) => Err(format!("No usable duration (header reports {})", duration)),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| format!("Probe task failed: {}", e))?
    }
}

//! JSON-based store for groups and takes
//!
//! Stores metadata in a JSON file at ~/.local/share/takebook/library.json.
//! The whole catalog is held in memory and rewritten after every mutation.

use super::migrations::{self, CURRENT_VERSION};
use crate::audio::AssetResolver;
use crate::error::StoreError;
use crate::models::{AssetId, AudioAsset, Group, GroupId, LocalFile, StorageLocator, TakeFile, TakeStatus};
use crate::settings::Settings;
use crate::storage::LocalStorage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type Result<T> = std::result::Result<T, StoreError>;

/// On-disk document
#[derive(Debug, Clone, Deserialize)]
struct Catalog {
    version: u32,
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    assets: Vec<AudioAsset>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            groups: Vec::new(),
            assets: Vec::new(),
        }
    }
}

/// Store for groups and their takes
pub struct AssetStore {
    path: PathBuf,
    storage: LocalStorage,
    embed_audio: bool,
    catalog: RwLock<Catalog>,
}

impl AssetStore {
    /// Open the library described by `settings`
    pub fn load(settings: &Settings) -> Result<Self> {
        Ok(Self::open(settings.library_path(), settings.storage())?.with_embedding(settings.embed_audio))
    }

    /// Open (or start) the library at `path`, migrating older files
    pub fn open(path: impl Into<PathBuf>, storage: LocalStorage) -> Result<Self> {
        let path = path.into();
        let (catalog, migrated) = if path.exists() {
            Self::read(&path)?
        } else {
            info!("Starting new library at {}", path.display());
            (Catalog::default(), false)
        };

        let store = Self {
            path,
            storage,
            embed_audio: false,
            catalog: RwLock::new(catalog),
        };
        if migrated {
            // Persist so the upgrade only runs once
            store.save(&store.read_catalog())?;
        }
        Ok(store)
    }

    /// Keep a durable copy of each new take inside the library file
    pub fn with_embedding(mut self, embed_audio: bool) -> Self {
        self.embed_audio = embed_audio;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    fn read(path: &Path) -> Result<(Catalog, bool)> {
        let contents = fs::read_to_string(path)?;
        let mut doc: serde_json::Value = serde_json::from_str(&contents)?;
        let migrated = migrations::migrate(&mut doc)?;

        let catalog: Catalog = serde_json::from_value(doc)?;
        debug!(
            "Loaded v{} library: {} groups and {} takes from {}",
            catalog.version,
            catalog.groups.len(),
            catalog.assets.len(),
            path.display()
        );
        Ok((catalog, migrated))
    }

    /// Ensure the database directory exists
    fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Write the catalog through a temporary file
    fn save(&self, catalog: &Catalog) -> Result<()> {
        self.ensure_dir()?;

        let doc = CatalogRef {
            version: CURRENT_VERSION,
            groups: &catalog.groups,
            assets: &catalog.assets,
        };
        let contents = serde_json::to_string_pretty(&doc)?;

        let partial = self.path.with_extension("json.partial");
        fs::write(&partial, contents)?;
        fs::rename(&partial, &self.path)?;
        Ok(())
    }

    fn read_catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_catalog(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `f` to a copy and persist it; memory only changes once the save lands
    fn mutate<T>(&self, f: impl FnOnce(&mut Catalog) -> Result<T>) -> Result<T> {
        let mut catalog = self.write_catalog();
        let mut next = catalog.clone();
        let out = f(&mut next)?;
        self.save(&next)?;
        *catalog = next;
        Ok(out)
    }

    // Groups

    pub fn create_group(&self, title: &str) -> Result<Group> {
        let group = Group::new(title.trim());
        self.mutate(|catalog| {
            catalog.groups.push(group.clone());
            Ok(())
        })?;
        info!("Created group {} ({})", group.title, group.id);
        Ok(group)
    }

    /// Groups whose title contains `search` (ignoring case), newest first
    pub fn groups(&self, search: Option<&str>) -> Vec<Group> {
        let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let mut groups: Vec<Group> = self
            .read_catalog()
            .groups
            .iter()
            .filter(|g| match &needle {
                Some(needle) => g.title.to_lowercase().contains(needle),
                None => true,
            })
            .cloned()
            .collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        groups
    }

    pub fn group(&self, id: &GroupId) -> Option<Group> {
        self.read_catalog().groups.iter().find(|g| g.id == *id).cloned()
    }

    /// Look a group up by id or, failing that, by exact title ignoring case
    pub fn find_group(&self, query: &str) -> Result<Group> {
        let catalog = self.read_catalog();
        let by_id = query.parse::<GroupId>().ok();
        catalog
            .groups
            .iter()
            .find(|g| Some(g.id) == by_id)
            .or_else(|| catalog.groups.iter().find(|g| g.title.eq_ignore_ascii_case(query.trim())))
            .cloned()
            .ok_or_else(|| StoreError::UnknownGroup(query.to_string()))
    }

    /// Delete a group and its takes' records; returns the removed take ids
    ///
    /// Backing files are left to the caller.
    pub fn delete_group(&self, id: &GroupId) -> Result<Vec<AssetId>> {
        let removed = self.mutate(|catalog| {
            let before = catalog.groups.len();
            catalog.groups.retain(|g| g.id != *id);
            if catalog.groups.len() == before {
                return Err(StoreError::UnknownGroup(id.to_string()));
            }

            let removed: Vec<AssetId> = catalog
                .assets
                .iter()
                .filter(|a| a.group_id == *id)
                .map(|a| a.id)
                .collect();
            catalog.assets.retain(|a| a.group_id != *id);
            Ok(removed)
        })?;
        info!("Deleted group {} with {} takes", id, removed.len());
        Ok(removed)
    }

    // Takes

    /// Record a finished take
    ///
    /// The take's file must be readable; with embedding on, its bytes are
    /// copied into the library as well.
    pub fn create_asset(&self, title: &str, take: &TakeFile, group: &GroupId) -> Result<AudioAsset> {
        let mut asset = AudioAsset::new(title.trim(), take, *group);

        if self.embed_audio {
            asset.audio_data = Some(fs::read(&take.file.path)?);
        } else {
            fs::metadata(&take.file.path)?;
        }

        self.mutate(|catalog| {
            if !catalog.groups.iter().any(|g| g.id == *group) {
                return Err(StoreError::UnknownGroup(group.to_string()));
            }
            catalog.assets.push(asset.clone());
            Ok(())
        })?;
        info!(
            "Stored take {} ({:.2}s) in group {}",
            asset.id, asset.duration, group
        );
        Ok(asset)
    }

    /// Takes in a group, newest first
    pub fn assets_in(&self, group: &GroupId) -> Vec<AudioAsset> {
        let mut assets: Vec<AudioAsset> = self
            .read_catalog()
            .assets
            .iter()
            .filter(|a| a.group_id == *group)
            .cloned()
            .collect();
        assets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        assets
    }

    pub fn asset(&self, id: &AssetId) -> Option<AudioAsset> {
        self.read_catalog().assets.iter().find(|a| a.id == *id).cloned()
    }

    fn update_asset(&self, id: &AssetId, f: impl FnOnce(&mut AudioAsset)) -> Result<()> {
        self.mutate(|catalog| {
            let asset = catalog
                .assets
                .iter_mut()
                .find(|a| a.id == *id)
                .ok_or_else(|| StoreError::UnknownAsset(id.to_string()))?;
            f(asset);
            Ok(())
        })
    }

    pub fn rename_asset(&self, id: &AssetId, title: &str) -> Result<()> {
        let title = title.trim().to_string();
        self.update_asset(id, |asset| asset.title = title)
    }

    pub fn set_status(&self, id: &AssetId, status: TakeStatus) -> Result<()> {
        self.update_asset(id, |asset| asset.status = status)
    }

    /// Copy a take's local file into its durable blob
    pub fn embed_audio(&self, id: &AssetId) -> Result<()> {
        let file = self
            .resolve_local_file(id)
            .ok_or_else(|| StoreError::UnknownAsset(id.to_string()))?;
        let bytes = fs::read(&file.path)?;
        debug!("Embedding {} bytes for {}", bytes.len(), id);
        self.update_asset(id, |asset| asset.audio_data = Some(bytes))
    }

    /// Remove a take's record; the backing file is left to the caller
    pub fn delete_asset(&self, id: &AssetId) -> Result<AudioAsset> {
        self.mutate(|catalog| {
            let index = catalog
                .assets
                .iter()
                .position(|a| a.id == *id)
                .ok_or_else(|| StoreError::UnknownAsset(id.to_string()))?;
            Ok(catalog.assets.remove(index))
        })
    }

    /// Where a take's bytes currently live, if anywhere
    pub fn locate(&self, id: &AssetId) -> Option<StorageLocator> {
        let asset = self.asset(id)?;
        if let Some(file) = self.resolve_local_file(id).filter(LocalFile::exists) {
            return Some(StorageLocator::LocalFile(file.path));
        }
        if let Some(path) = self.storage.locator_for(id) {
            return Some(StorageLocator::LocalFile(path));
        }
        if asset.has_blob() {
            return Some(StorageLocator::Embedded);
        }
        warn!("Take {} has no local file and no embedded copy", id);
        None
    }
}

/// Borrowed view used when writing
#[derive(Serialize)]
struct CatalogRef<'a> {
    version: u32,
    groups: &'a [Group],
    assets: &'a [AudioAsset],
}

impl AssetResolver for AssetStore {
    fn resolve_local_file(&self, id: &AssetId) -> Option<LocalFile> {
        let catalog = self.read_catalog();
        let asset = catalog.assets.iter().find(|a| a.id == *id)?;
        let path = match &asset.file_name {
            Some(name) => self.storage.dir().join(name),
            None => self.storage.path_for(id, asset.extension()),
        };
        Some(LocalFile::new(*id, path))
    }

    fn resolve_durable_blob(&self, id: &AssetId) -> Option<Vec<u8>> {
        self.read_catalog()
            .assets
            .iter()
            .find(|a| a.id == *id)
            .and_then(|a| a.audio_data.clone())
    }
}

//! Library flows tying capture, import and playback to the store
//!
//! The audio core only ever produces a local file plus a duration; this is
//! where those become stored takes, and where deleting a take also releases
//! playback and removes its file.

use crate::audio::{
    CaptureConfig, CaptureSession, ImportPipeline, InputBackend, OutputBackend, PlaybackEngine,
};
use crate::error::{AudioError, LibraryError, StoreError};
use crate::models::{AssetId, AudioAsset, GroupId, StorageLocator, TakeFile};
use crate::permission::PermissionGate;
use crate::settings::Settings;
use crate::state::AssetStore;
use crate::storage::LocalStorage;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;

type Result<T> = std::result::Result<T, LibraryError>;

/// One user's library of takes
pub struct Library {
    settings: Settings,
    store: Arc<AssetStore>,
    storage: LocalStorage,
    importer: ImportPipeline,
    player: PlaybackEngine,
    gate: PermissionGate,
    input: Arc<dyn InputBackend>,
}

impl Library {
    /// Open the library described by `settings`
    ///
    /// Must be called from within a tokio runtime; the playback engine is
    /// spawned onto it.
    pub fn open(
        settings: Settings,
        gate: PermissionGate,
        input: Arc<dyn InputBackend>,
        output: Arc<dyn OutputBackend>,
    ) -> Result<Self> {
        let store = Arc::new(AssetStore::load(&settings)?);
        let storage = settings.storage();
        let player = PlaybackEngine::spawn(store.clone(), output, storage.clone());

        info!(
            "Library at {} (takes in {})",
            store.path().display(),
            storage.dir().display()
        );

        Ok(Self {
            importer: ImportPipeline::new(storage.clone()),
            settings,
            store,
            storage,
            player,
            gate,
            input,
        })
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    pub fn player(&self) -> &PlaybackEngine {
        &self.player
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A fresh capture session writing into this library's storage
    pub fn capture_session(&self) -> CaptureSession {
        let config = CaptureConfig {
            sample_rate: self.settings.sample_rate,
            meter_interval: self.settings.meter_interval,
        };
        CaptureSession::new(
            self.gate.clone(),
            self.input.clone(),
            self.storage.clone(),
            config,
        )
    }

    /// Store a finished recording; the file is removed if that fails
    pub async fn save_recording(
        &self,
        take: TakeFile,
        title: Option<&str>,
        group: &GroupId,
    ) -> Result<AudioAsset> {
        let title = title
            .map(str::to_string)
            .unwrap_or_else(AudioAsset::default_title);
        self.store_take(take, title, *group).await
    }

    /// Import an external file into a group
    pub async fn import_take(
        &self,
        source: &Path,
        title: Option<&str>,
        group: &GroupId,
    ) -> Result<AudioAsset> {
        if self.store.group(group).is_none() {
            return Err(StoreError::UnknownGroup(group.to_string()).into());
        }

        let take = self.importer.import(source).await?;
        let title = title.map(str::to_string).unwrap_or_else(|| {
            source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(AudioAsset::default_title)
        });
        self.store_take(take, title, *group).await
    }

    async fn store_take(&self, take: TakeFile, title: String, group: GroupId) -> Result<AudioAsset> {
        let store = self.store.clone();
        let stored = tokio::task::spawn_blocking(move || {
            let result = store.create_asset(&title, &take, &group);
            if result.is_err() {
                if let Err(e) = std::fs::remove_file(&take.file.path) {
                    warn!("Failed to remove unsaved take {}: {}", take.file.path.display(), e);
                }
            }
            result
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        Ok(stored)
    }

    /// Play a stored take
    pub async fn play(&self, id: &AssetId) -> Result<()> {
        if self.store.asset(id).is_none() {
            return Err(AudioError::AssetUnavailable(format!("unknown take {}", id)).into());
        }
        Ok(self.player.play(*id).await?)
    }

    /// Delete a take: stop it if playing, remove its file, drop the record
    pub async fn delete_take(&self, id: &AssetId) -> Result<AudioAsset> {
        if self.store.asset(id).is_none() {
            return Err(StoreError::UnknownAsset(id.to_string()).into());
        }
        self.release(id).await?;
        let asset = self.store.delete_asset(id)?;
        info!("Deleted take {} ({})", asset.title, id);
        Ok(asset)
    }

    /// Delete a group along with every take in it; returns the take count
    pub async fn delete_group(&self, id: &GroupId) -> Result<usize> {
        if self.store.group(id).is_none() {
            return Err(StoreError::UnknownGroup(id.to_string()).into());
        }
        let takes: Vec<AssetId> = self.store.assets_in(id).iter().map(|a| a.id).collect();
        for take in &takes {
            self.release(take).await?;
        }
        let removed = self.store.delete_group(id)?;
        Ok(removed.len())
    }

    /// Stop playback of `id` and remove its local file
    ///
    /// The file is found through the record, so takes whose file name is not
    /// their id (migrated libraries) are removed too.
    async fn release(&self, id: &AssetId) -> Result<()> {
        if self.player.state().asset() == Some(*id) {
            self.player.stop().await;
        }
        match self.store.locate(id) {
            Some(StorageLocator::LocalFile(path)) => {
                self.storage.remove_path(&path).map_err(StoreError::from)?;
            }
            _ => debug!("No local file to remove for take {}", id),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{granted_gate, write_sine_wav, FakeInput, FakeOutput};
    use crate::audio::PlaybackState;
    use std::time::Duration;

    struct Fixture {
        dir: tempfile::TempDir,
        output: Arc<FakeOutput>,
        library: Library,
    }

    fn fixture(embed_audio: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default().with_data_dir(dir.path());
        settings.sample_rate = 8_000;
        settings.meter_interval = Duration::from_millis(10);
        settings.embed_audio = embed_audio;

        let output = FakeOutput::new();
        let library = Library::open(settings, granted_gate(), FakeInput::new(), output.clone()).unwrap();
        Fixture {
            dir,
            output,
            library,
        }
    }

    fn takes_on_disk(library: &Library) -> usize {
        std::fs::read_dir(library.settings().storage_dir.clone())
            .map(|d| d.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_record_save_and_play() {
        let fx = fixture(false);
        let group = fx.library.store().create_group("Demo").unwrap();

        let mut session = fx.library.capture_session();
        session.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let take = session.stop().await.unwrap();

        let asset = fx
            .library
            .save_recording(take.clone(), Some("Riff"), &group.id)
            .await
            .unwrap();
        assert_eq!(asset.id, take.file.id);
        assert_eq!(asset.extension(), "wav");
        assert_eq!(fx.library.store().assets_in(&group.id), vec![asset.clone()]);

        fx.library.play(&asset.id).await.unwrap();
        assert_eq!(fx.library.player().state(), PlaybackState::Playing(asset.id));
        fx.library.player().stop().await;
    }

    #[tokio::test]
    async fn test_failed_save_removes_file() {
        let fx = fixture(false);
        let mut session = fx.library.capture_session();
        session.start().await.unwrap();
        let take = session.stop().await.unwrap();
        assert!(take.file.exists());

        let err = fx
            .library
            .save_recording(take.clone(), None, &GroupId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::Store(StoreError::UnknownGroup(_))));
        assert!(!take.file.exists());
    }

    #[tokio::test]
    async fn test_import_into_group() {
        let fx = fixture(true);
        let group = fx.library.store().create_group("Imports").unwrap();
        let source = fx.dir.path().join("Bridge idea.wav");
        write_sine_wav(&source, 2.0, 8_000, 1);

        let asset = fx.library.import_take(&source, None, &group.id).await.unwrap();
        assert_eq!(asset.title, "Bridge idea");
        assert!((asset.duration - 2.0).abs() < 0.01);
        assert!(asset.has_blob());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_import_into_unknown_group_copies_nothing() {
        let fx = fixture(false);
        let source = fx.dir.path().join("x.wav");
        write_sine_wav(&source, 1.0, 8_000, 1);

        let err = fx
            .library
            .import_take(&source, None, &GroupId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::Store(StoreError::UnknownGroup(_))));
        assert_eq!(takes_on_disk(&fx.library), 0);
    }

    #[tokio::test]
    async fn test_delete_playing_take() {
        let fx = fixture(false);
        let group = fx.library.store().create_group("g").unwrap();
        let source = fx.dir.path().join("long.wav");
        write_sine_wav(&source, 5.0, 8_000, 1);
        let asset = fx.library.import_take(&source, None, &group.id).await.unwrap();

        fx.library.play(&asset.id).await.unwrap();
        fx.library.delete_take(&asset.id).await.unwrap();

        assert_eq!(fx.library.player().state(), PlaybackState::Idle);
        assert_eq!(fx.output.active(), 0);
        assert_eq!(takes_on_disk(&fx.library), 0);
        assert!(fx.library.store().asset(&asset.id).is_none());
        assert!(matches!(
            fx.library.play(&asset.id).await,
            Err(LibraryError::Audio(AudioError::AssetUnavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_delete_group_removes_files() {
        let fx = fixture(false);
        let keep = fx.library.store().create_group("keep").unwrap();
        let doomed = fx.library.store().create_group("doomed").unwrap();
        let source = fx.dir.path().join("s.wav");
        write_sine_wav(&source, 1.0, 8_000, 1);

        let kept = fx.library.import_take(&source, None, &keep.id).await.unwrap();
        fx.library.import_take(&source, None, &doomed.id).await.unwrap();
        fx.library.import_take(&source, None, &doomed.id).await.unwrap();

        assert_eq!(fx.library.delete_group(&doomed.id).await.unwrap(), 2);
        assert_eq!(takes_on_disk(&fx.library), 1);
        assert!(matches!(
            fx.library.store().locate(&kept.id),
            Some(StorageLocator::LocalFile(_))
        ));
        assert!(fx.library.store().group(&doomed.id).is_none());
    }

    #[tokio::test]
    async fn test_embedded_take_survives_lost_file() {
        let fx = fixture(true);
        let group = fx.library.store().create_group("g").unwrap();
        let source = fx.dir.path().join("s.wav");
        write_sine_wav(&source, 1.0, 8_000, 1);
        let asset = fx.library.import_take(&source, None, &group.id).await.unwrap();

        let path = fx.library.store().storage().path_for(&asset.id, "wav");
        std::fs::remove_file(&path).unwrap();
        assert_eq!(fx.library.store().locate(&asset.id), Some(StorageLocator::Embedded));

        fx.library.play(&asset.id).await.unwrap();
        assert!(path.exists());
        fx.library.player().stop().await;
    }

    #[tokio::test]
    async fn test_delete_migrated_take_removes_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let takes = dir.path().join("takes");
        std::fs::create_dir_all(&takes).unwrap();

        // Older libraries named files independently of the record id
        let group = GroupId::new();
        let asset = AssetId::new();
        let file_name = format!("{}.wav", AssetId::new());
        write_sine_wav(&takes.join(&file_name), 1.0, 8_000, 1);
        let v1 = serde_json::json!({
            "groups": [{ "id": group, "title": "Old", "created_at": "2024-05-01T10:00:00Z" }],
            "assets": [{
                "id": asset,
                "title": "Old take",
                "created_at": "2024-05-01T10:05:00Z",
                "url": format!("file:///home/me/takes/{}", file_name),
                "duration": 1.0,
                "group_id": group
            }]
        });
        std::fs::write(dir.path().join("library.json"), v1.to_string()).unwrap();

        let settings = Settings::default().with_data_dir(dir.path());
        let library =
            Library::open(settings, granted_gate(), FakeInput::new(), FakeOutput::new()).unwrap();
        assert_eq!(
            library.store().locate(&asset),
            Some(StorageLocator::LocalFile(takes.join(&file_name)))
        );

        library.delete_take(&asset).await.unwrap();
        assert!(!takes.join(&file_name).exists());
        assert_eq!(takes_on_disk(&library), 0);
    }
}

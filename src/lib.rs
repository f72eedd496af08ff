//! Takebook - a voice memo recorder that files takes under named groups
//!
//! The audio core records from the microphone, imports external files and
//! plays stored takes back. It never owns metadata: finished takes are handed
//! to the [`AssetStore`] as a local file plus a duration, and playback finds
//! bytes through the [`AssetResolver`] seam.

pub mod audio;
pub mod error;
pub mod library;
pub mod models;
pub mod permission;
pub mod settings;
pub mod state;
pub mod storage;

pub use audio::{AssetResolver, CaptureSession, ImportPipeline, PlaybackEngine, PlaybackState};
pub use error::{AudioError, LibraryError, StoreError};
pub use library::Library;
pub use models::{AssetId, AudioAsset, Group, GroupId, LocalFile, StorageLocator, TakeFile, TakeStatus};
pub use permission::{Capability, ConsolePrompt, PermissionGate, PermissionState};
pub use settings::Settings;
pub use state::AssetStore;
pub use storage::LocalStorage;

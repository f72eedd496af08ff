//! Error types for the audio core, the asset store and the library flows
//!
//! Audio errors carry detail strings rather than sources so they stay `Clone`
//! and can be fanned out over broadcast channels.

use thiserror::Error;

/// Failures surfaced by capture, import and playback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Microphone access was refused
    #[error("Microphone permission denied")]
    PermissionDenied,

    /// The capture or playback device could not be configured
    #[error("Audio device setup failed: {0}")]
    DeviceSetupFailed(String),

    /// `stop()` was called without a recording in progress
    #[error("No active recording session")]
    NoActiveSession,

    /// The recording could not be finalized on disk
    #[error("Recording failed: {0}")]
    RecordingFailed(String),

    /// An imported file could not be copied into local storage
    #[error("Failed to copy audio file: {0}")]
    CopyFailed(String),

    /// No usable duration could be read from the file
    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),

    /// Neither a local file nor an embedded blob exists for the asset
    #[error("Audio asset unavailable: {0}")]
    AssetUnavailable(String),

    /// Playback could not be started
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    /// The stream broke while playing
    #[error("Audio decode error: {0}")]
    DecodeError(String),
}

/// Convenience Result type for the audio core
pub type Result<T> = std::result::Result<T, AudioError>;

/// Failures of the JSON asset store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse store: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Store migration failed: {0}")]
    Migration(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),
}

/// Anything a library flow can fail with
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

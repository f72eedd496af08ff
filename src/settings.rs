//! Application settings persistence using dconf
//!
//! Settings are stored in dconf under `/com/takebook/recorder/`. Every getter
//! falls back to a default when dconf is missing or the key is unset.

use crate::permission::PermissionState;
use crate::storage::LocalStorage;
use log::error;
use std::path::PathBuf;
use std::time::Duration;

const DCONF_PATH: &str = "/com/takebook/recorder/";

/// Keys for dconf settings
mod keys {
    pub const STORAGE_DIR: &str = "storage-dir";
    pub const METER_INTERVAL_MS: &str = "meter-interval-ms";
    pub const SAMPLE_RATE: &str = "sample-rate";
    pub const EMBED_AUDIO: &str = "embed-audio";
    pub const MICROPHONE_PERMISSION: &str = "microphone-permission";
}

pub const DEFAULT_METER_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

fn key(name: &str) -> String {
    format!("{}{}", DCONF_PATH, name)
}

/// Runtime configuration of the recorder
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root for the library file and the takes directory
    pub data_dir: PathBuf,
    /// Directory holding one audio file per take
    pub storage_dir: PathBuf,
    /// Cadence of the live level meter
    pub meter_interval: Duration,
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Keep a durable copy of each take inside the library file
    pub embed_audio: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            storage_dir: data_dir.join("takes"),
            data_dir,
            meter_interval: DEFAULT_METER_INTERVAL,
            sample_rate: DEFAULT_SAMPLE_RATE,
            embed_audio: true,
        }
    }
}

impl Settings {
    /// Read settings from dconf, using defaults for anything unset
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            storage_dir: get_storage_dir().unwrap_or(defaults.storage_dir),
            data_dir: defaults.data_dir,
            meter_interval: get_meter_interval().unwrap_or(defaults.meter_interval),
            sample_rate: get_sample_rate().unwrap_or(defaults.sample_rate),
            embed_audio: get_embed_audio().unwrap_or(defaults.embed_audio),
        }
    }

    /// Relocate everything under a different data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self.storage_dir = self.data_dir.join("takes");
        self
    }

    /// Path of the JSON library
    pub fn library_path(&self) -> PathBuf {
        self.data_dir.join("library.json")
    }

    pub fn storage(&self) -> LocalStorage {
        LocalStorage::new(&self.storage_dir)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("takebook")
}

/// Numeric settings are stored as strings
fn get_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    dconf_rs::get_string(&key(name))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Get the storage directory override from dconf
pub fn get_storage_dir() -> Option<PathBuf> {
    dconf_rs::get_string(&key(keys::STORAGE_DIR))
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// Get the level meter interval from dconf
pub fn get_meter_interval() -> Option<Duration> {
    get_number::<u64>(keys::METER_INTERVAL_MS)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Get the capture sample rate from dconf
pub fn get_sample_rate() -> Option<u32> {
    get_number::<u32>(keys::SAMPLE_RATE).filter(|rate| *rate > 0)
}

/// Get the embed-audio setting from dconf
pub fn get_embed_audio() -> Option<bool> {
    dconf_rs::get_boolean(&key(keys::EMBED_AUDIO)).ok()
}

/// Set the embed-audio setting in dconf
pub fn set_embed_audio(embed: bool) {
    if let Err(e) = dconf_rs::set_boolean(&key(keys::EMBED_AUDIO), embed) {
        error!("Failed to save embed audio setting to dconf: {}", e);
    }
}

/// Get the remembered microphone decision from dconf
pub fn get_microphone_permission() -> PermissionState {
    match dconf_rs::get_string(&key(keys::MICROPHONE_PERMISSION)).as_deref() {
        Ok("granted") => PermissionState::Granted,
        Ok("denied") => PermissionState::Denied,
        _ => PermissionState::Undetermined,
    }
}

/// Remember the microphone decision in dconf
pub fn set_microphone_permission(granted: bool) {
    let value = if granted { "granted" } else { "denied" };
    if let Err(e) = dconf_rs::set_string(&key(keys::MICROPHONE_PERMISSION), value) {
        error!("Failed to save microphone permission to dconf: {}", e);
    }
}

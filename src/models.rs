use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Extension used when an imported file has none
pub const DEFAULT_EXTENSION: &str = "m4a";

/// Extension of files written by the recorder
pub const RECORDING_EXTENSION: &str = "wav";

/// Identifier of an audio asset; also the stem of its local file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(Uuid);

impl AssetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssetId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of a group (song) that takes are filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Descriptive status of a take; the audio core never looks at it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TakeStatus {
    #[default]
    Draft,
    Favorite,
    Final,
}

impl TakeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TakeStatus::Draft => "draft",
            TakeStatus::Favorite => "favorite",
            TakeStatus::Final => "final",
        }
    }
}

impl fmt::Display for TakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TakeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(TakeStatus::Draft),
            "favorite" => Ok(TakeStatus::Favorite),
            "final" => Ok(TakeStatus::Final),
            other => Err(format!("unknown status '{}' (expected draft, favorite or final)", other)),
        }
    }
}

/// A local audio file named `<id>.<ext>` inside the storage directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub id: AssetId,
    pub path: PathBuf,
}

impl LocalFile {
    pub fn new(id: AssetId, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_EXTENSION)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// A finished recording or import, ready to be handed to the store
#[derive(Debug, Clone, PartialEq)]
pub struct TakeFile {
    pub file: LocalFile,
    /// Seconds
    pub duration: f64,
}

/// Where the bytes of an asset currently live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocator {
    /// A file in local storage
    LocalFile(PathBuf),
    /// Only the embedded copy in the store is left
    Embedded,
}

/// A named group of takes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            title: title.into(),
            created_at: Utc::now(),
        }
    }
}

/// A recorded or imported take
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioAsset {
    pub id: AssetId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// `<id>.<ext>` inside the storage directory
    pub file_name: Option<String>,
    pub duration: f64,
    #[serde(default)]
    pub status: TakeStatus,
    pub group_id: GroupId,
    /// Durable copy of the audio bytes
    #[serde(default, with = "blob", skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<Vec<u8>>,
}

impl AudioAsset {
    pub fn new(title: impl Into<String>, take: &TakeFile, group_id: GroupId) -> Self {
        Self {
            id: take.file.id,
            title: title.into(),
            created_at: Utc::now(),
            file_name: Some(take.file.file_name()),
            duration: take.duration,
            status: TakeStatus::Draft,
            group_id,
            audio_data: None,
        }
    }

    /// Extension of the backing file, `m4a` when none was recorded
    pub fn extension(&self) -> &str {
        self.file_name
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_EXTENSION)
    }

    pub fn has_blob(&self) -> bool {
        self.audio_data.is_some()
    }

    /// Default title for a take created now, e.g. "Take 2026-01-31 14:05"
    pub fn default_title() -> String {
        Utc::now().format("Take %Y-%m-%d %H:%M").to_string()
    }
}

/// Base64 encoding for embedded audio blobs in the JSON store
mod blob {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

//! Library file migrations
//!
//! The library is a JSON document carrying a `version` field. Older documents
//! are upgraded in place, one step at a time, before being deserialized.
//!
//! # Migration Guidelines
//!
//! 1. Never modify an existing step; add a new one and bump `CURRENT_VERSION`
//! 2. Steps must be idempotent: running one on already-migrated data is a no-op
//! 3. A document without a `version` field is version 1

use crate::error::StoreError;
use log::{info, warn};
use serde_json::{Map, Value};
use std::path::Path;

/// Version written by this build
pub const CURRENT_VERSION: u32 = 3;

/// One upgrade step between two adjacent versions
pub struct Migration {
    pub from: u32,
    pub to: u32,
    pub description: &'static str,
    pub apply: fn(&mut Value) -> Result<(), String>,
}

/// All steps, ordered by source version
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        from: 1,
        to: 2,
        description: "add take status",
        apply: add_status,
    },
    Migration {
        from: 2,
        to: 3,
        description: "replace url with file name, allow embedded audio",
        apply: url_to_file_name,
    },
];

/// Version of a raw library document
pub fn version_of(doc: &Value) -> u32 {
    doc.get("version")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(1)
}

/// Upgrade `doc` to `CURRENT_VERSION`; returns whether anything changed
pub fn migrate(doc: &mut Value) -> Result<bool, StoreError> {
    let current = version_of(doc);

    if current == CURRENT_VERSION {
        return Ok(false);
    }

    if current > CURRENT_VERSION {
        warn!(
            "Library version ({}) is newer than this build ({})",
            current, CURRENT_VERSION
        );
        warn!("Unknown fields will be dropped on the next save");
        return Ok(false);
    }

    info!("Migrating library: v{} -> v{}", current, CURRENT_VERSION);

    let mut version = current;
    for step in MIGRATIONS.iter().filter(|m| m.from >= current) {
        if step.from != version {
            return Err(StoreError::Migration(format!(
                "no step from v{} (next step starts at v{})",
                version, step.from
            )));
        }
        (step.apply)(doc).map_err(|e| {
            StoreError::Migration(format!("v{} -> v{} ({}): {}", step.from, step.to, step.description, e))
        })?;
        version = step.to;
        set_version(doc, version)?;
        info!("Migration v{} -> v{} completed: {}", step.from, step.to, step.description);
    }

    if version != CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "stopped at v{}, expected v{}",
            version, CURRENT_VERSION
        )));
    }
    Ok(true)
}

fn set_version(doc: &mut Value, version: u32) -> Result<(), StoreError> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| StoreError::Migration("library root is not an object".to_string()))?;
    root.insert("version".to_string(), Value::from(version));
    Ok(())
}

/// Mutable access to every asset object in the document
fn assets_mut(doc: &mut Value) -> Result<Vec<&mut Map<String, Value>>, String> {
    match doc.get_mut("assets") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(assets)) => assets
            .iter_mut()
            .map(|a| a.as_object_mut().ok_or_else(|| "asset is not an object".to_string()))
            .collect(),
        Some(_) => Err("`assets` is not an array".to_string()),
    }
}

/// v1 -> v2: every take gets a status, starting as draft
fn add_status(doc: &mut Value) -> Result<(), String> {
    for asset in assets_mut(doc)? {
        asset
            .entry("status")
            .or_insert_with(|| Value::from("draft"));
    }
    Ok(())
}

/// v2 -> v3: absolute urls become bare file names
///
/// Only the last path component survives, so a library copied between
/// machines keeps resolving against the local storage directory.
fn url_to_file_name(doc: &mut Value) -> Result<(), String> {
    for asset in assets_mut(doc)? {
        let Some(url) = asset.remove("url") else {
            continue;
        };
        if asset.contains_key("file_name") {
            continue;
        }
        let file_name = url
            .as_str()
            .map(|u| u.strip_prefix("file://").unwrap_or(u))
            .and_then(|p| Path::new(p).file_name())
            .and_then(|n| n.to_str())
            .map(|n| Value::from(n.to_string()))
            .unwrap_or(Value::Null);
        asset.insert("file_name".to_string(), file_name);
    }
    Ok(())
}

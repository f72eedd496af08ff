//! Persistent library of groups and takes

mod database;
pub mod migrations;

pub use database::AssetStore;

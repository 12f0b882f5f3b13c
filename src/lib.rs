//! Mezmur - offline playback and download caching core
//!
//! - `player`: the coordinator owning the single playback session
//! - `download` / `cache`: offline downloads and their per-user registry
//! - `audio`: the playback engine (rodio)
//! - `backend` / `database`: catalog, favorites and registry storage
//! - `library`: catalog and favorites facade

pub mod audio;
pub mod backend;
pub mod cache;
pub mod database;
pub mod download;
pub mod error;
pub mod library;
pub mod player;
pub mod settings;
pub mod utils;

#[cfg(test)]
mod testing;

pub use error::{DownloadError, PersistenceError, PlayerError};
pub use library::Library;
pub use player::{Player, PlayerSnapshot, PlayerStatus};
pub use settings::Settings;

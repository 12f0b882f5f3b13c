//! Catalog and per-user records
//! These models map directly to SQLite tables and to the hosted backend's JSON rows

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a track
    TrackId
);
string_id!(
    /// Identifier of a signed-in user
    UserId
);
string_id!(
    /// Identifier of a category
    CategoryId
);

/// Track category (e.g. a liturgical season or a choir)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    /// Icon name or URI
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Playable track metadata, read-only on the client
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: Option<String>,
    pub category_id: Option<CategoryId>,
    /// Canonical remote audio location
    pub audio_url: String,
    /// Lyrics / poem text
    pub poem: Option<String>,
    /// Nominal duration in seconds
    pub duration: i64,
    /// Artwork URI
    pub image_url: Option<String>,
    pub play_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Embedded category, present when fetched with a join
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl Track {
    /// Nominal duration in milliseconds, used until the engine reports the real one
    pub fn nominal_duration_ms(&self) -> u64 {
        (self.duration.max(0) as u64).saturating_mul(1000)
    }
}

/// A track marked as favorite by a user
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Favorite {
    pub id: String,
    pub user_id: UserId,
    #[serde(alias = "mezmur_id")]
    pub track_id: TrackId,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default, alias = "mezmur", skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,
}

/// Registry entry mapping (user, track) to a downloaded file
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub user_id: UserId,
    #[serde(alias = "mezmur_id")]
    pub track_id: TrackId,
    pub local_path: String,
    pub downloaded_at: DateTime<Utc>,
}

impl DownloadRecord {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.local_path)
    }
}

// ============ Input structs for creating new records ============

/// Input for seeding a category into the local catalog
#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Input for seeding a track into the local catalog
#[derive(Debug, Clone, Deserialize)]
pub struct NewTrack {
    pub id: TrackId,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub audio_url: String,
    #[serde(default)]
    pub poem: Option<String>,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Catalog file accepted by the `import` command
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogImport {
    #[serde(default)]
    pub categories: Vec<NewCategory>,
    #[serde(default)]
    pub tracks: Vec<NewTrack>,
}

//! Catalog and favorites facade for the presentation layer

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::database::{Category, CategoryId, Favorite, Track, TrackId, UserId};
use crate::error::{PersistenceError, PlayerError, Result};

/// Read access to the catalog plus the bound user's favorites
#[derive(Clone)]
pub struct Library {
    backend: Arc<dyn Backend>,
    identity: Arc<RwLock<Option<UserId>>>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("identity", &*self.identity.read())
            .finish_non_exhaustive()
    }
}

impl Library {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            identity: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_identity(&self, user_id: Option<UserId>) {
        *self.identity.write() = user_id;
    }

    fn identity(&self) -> Option<UserId> {
        self.identity.read().clone()
    }

    /// All tracks, newest first
    pub async fn tracks(&self) -> Result<Vec<Track>> {
        Ok(self.backend.fetch_tracks().await.map_err(PersistenceError)?)
    }

    pub async fn tracks_in_category(&self, category_id: &CategoryId) -> Result<Vec<Track>> {
        Ok(self
            .backend
            .fetch_tracks_by_category(category_id)
            .await
            .map_err(PersistenceError)?)
    }

    pub async fn track(&self, track_id: &TrackId) -> Result<Option<Track>> {
        Ok(self
            .backend
            .fetch_track(track_id)
            .await
            .map_err(PersistenceError)?)
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        Ok(self
            .backend
            .fetch_categories()
            .await
            .map_err(PersistenceError)?)
    }

    /// Title/artist search; blank queries match nothing
    pub async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Searching for {:?}", query);
        Ok(self
            .backend
            .search_tracks(query)
            .await
            .map_err(PersistenceError)?)
    }

    /// The bound user's favorites, newest first
    pub async fn favorites(&self) -> Result<Vec<Favorite>> {
        let user_id = self.identity().ok_or(PlayerError::AuthRequired)?;
        Ok(self
            .backend
            .list_favorites(&user_id)
            .await
            .map_err(PersistenceError)?)
    }

    /// False without a user or when the lookup fails
    pub async fn is_favorite(&self, track_id: &TrackId) -> bool {
        let Some(user_id) = self.identity() else {
            return false;
        };
        match self.backend.is_favorite(&user_id, track_id).await {
            Ok(favorite) => favorite,
            Err(e) => {
                warn!("Favorite lookup failed for {}: {}", track_id, e);
                false
            }
        }
    }

    /// Flip the favorite flag, returning the new value
    pub async fn toggle_favorite(&self, track_id: &TrackId) -> Result<bool> {
        let user_id = self.identity().ok_or(PlayerError::AuthRequired)?;
        let favorite = self
            .backend
            .is_favorite(&user_id, track_id)
            .await
            .map_err(PersistenceError)?;

        if favorite {
            self.backend
                .remove_favorite(&user_id, track_id)
                .await
                .map_err(PersistenceError)?;
        } else {
            self.backend
                .add_favorite(&user_id, track_id)
                .await
                .map_err(PersistenceError)?;
        }
        Ok(!favorite)
    }
}

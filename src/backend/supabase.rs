//! Hosted backend over PostgREST
//!
//! Tables follow the hosted schema: `mezmurs` (tracks), `categories`,
//! `favorites` and `downloads`, the latter two keyed by `user_id` and
//! `mezmur_id`. Row-level security is enforced server side; requests carry
//! the project key and, when signed in, the user's access token.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use super::Backend;
use crate::database::{Category, CategoryId, DownloadRecord, Favorite, Track, TrackId, UserId};

const TRACKS: &str = "mezmurs";
const CATEGORIES: &str = "categories";
const FAVORITES: &str = "favorites";
const DOWNLOADS: &str = "downloads";

const TRACK_SELECT: &str = "*,category:categories(*)";
const FAVORITE_SELECT: &str = "*,mezmur:mezmurs(*,category:categories(*))";

/// Quote a value for use inside a PostgREST logical filter
///
/// Commas and parentheses are reserved in `or=(...)` expressions, so the
/// value is wrapped in double quotes with inner quotes and backslashes escaped.
pub(crate) fn postgrest_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// `or` filter matching title or artist case-insensitively
pub(crate) fn search_filter(query: &str) -> String {
    let pattern = postgrest_quote(&format!("*{}*", query));
    format!("(title.ilike.{pattern},artist.ilike.{pattern})")
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[derive(Debug, Deserialize)]
struct PlayCountRow {
    play_count: i64,
}

#[derive(Debug, Deserialize)]
struct LocalPathRow {
    local_path: String,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    #[allow(dead_code)]
    id: serde_json::Value,
}

/// PostgREST client for the hosted catalog
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    rest_url: Url,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("rest_url", &self.rest_url.as_str())
            .field("signed_in", &self.access_token.read().is_some())
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    /// Create a client for the project at `base_url` (e.g. `https://xyz.supabase.co`)
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self> {
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let rest_url = Url::parse(&base)
            .and_then(|u| u.join("rest/v1/"))
            .with_context(|| format!("invalid backend url: {}", base_url))?;

        Ok(Self {
            http: reqwest::Client::new(),
            rest_url,
            anon_key: anon_key.into(),
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Set or clear the signed-in user's access token
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.rest_url
            .join(path)
            .with_context(|| format!("invalid endpoint: {}", path))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let bearer = self
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());

        Ok(self
            .http
            .request(method, self.endpoint(path)?)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        debug!("select {} {:?}", table, query);
        let rows = self
            .request(Method::GET, table)?
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<T>>()
            .await?;
        Ok(rows)
    }

    async fn delete(&self, table: &str, query: &[(&str, String)]) -> Result<()> {
        self.request(Method::DELETE, table)?
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Read-increment-write fallback for when the counter RPC is unavailable
    async fn increment_play_count_fallback(&self, track_id: &TrackId) -> Result<()> {
        let rows: Vec<PlayCountRow> = self
            .select(
                TRACKS,
                &[
                    ("select", "play_count".to_string()),
                    ("id", eq(track_id.as_str())),
                ],
            )
            .await?;

        let Some(row) = rows.first() else {
            return Ok(());
        };

        self.request(Method::PATCH, TRACKS)?
            .query(&[("id", eq(track_id.as_str()))])
            .json(&json!({ "play_count": row.play_count + 1 }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Backend for SupabaseClient {
    async fn fetch_tracks(&self) -> Result<Vec<Track>> {
        self.select(
            TRACKS,
            &[
                ("select", TRACK_SELECT.to_string()),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn fetch_tracks_by_category(&self, category_id: &CategoryId) -> Result<Vec<Track>> {
        self.select(
            TRACKS,
            &[
                ("select", TRACK_SELECT.to_string()),
                ("category_id", eq(category_id.as_str())),
                ("order", "title.asc".to_string()),
            ],
        )
        .await
    }

    async fn search_tracks(&self, query: &str) -> Result<Vec<Track>> {
        self.select(
            TRACKS,
            &[
                ("select", TRACK_SELECT.to_string()),
                ("or", search_filter(query)),
                ("order", "title.asc".to_string()),
            ],
        )
        .await
    }

    async fn fetch_track(&self, track_id: &TrackId) -> Result<Option<Track>> {
        let mut rows: Vec<Track> = self
            .select(
                TRACKS,
                &[
                    ("select", TRACK_SELECT.to_string()),
                    ("id", eq(track_id.as_str())),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.pop())
    }

    async fn fetch_categories(&self) -> Result<Vec<Category>> {
        self.select(
            CATEGORIES,
            &[
                ("select", "*".to_string()),
                ("order", "name.asc".to_string()),
            ],
        )
        .await
    }

    async fn increment_play_count(&self, track_id: &TrackId) -> Result<()> {
        let rpc = async {
            self.request(Method::POST, "rpc/increment_play_count")?
                .json(&json!({ "mezmur_id": track_id }))
                .send()
                .await?
                .error_for_status()?;
            anyhow::Ok(())
        };

        if let Err(e) = rpc.await {
            warn!("play count RPC failed for {}, falling back: {}", track_id, e);
            self.increment_play_count_fallback(track_id).await?;
        }
        Ok(())
    }

    async fn list_favorites(&self, user_id: &UserId) -> Result<Vec<Favorite>> {
        self.select(
            FAVORITES,
            &[
                ("select", FAVORITE_SELECT.to_string()),
                ("user_id", eq(user_id.as_str())),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn add_favorite(&self, user_id: &UserId, track_id: &TrackId) -> Result<()> {
        self.request(Method::POST, FAVORITES)?
            .header("Prefer", "return=minimal")
            .json(&json!([{ "user_id": user_id, "mezmur_id": track_id }]))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn remove_favorite(&self, user_id: &UserId, track_id: &TrackId) -> Result<()> {
        self.delete(
            FAVORITES,
            &[
                ("user_id", eq(user_id.as_str())),
                ("mezmur_id", eq(track_id.as_str())),
            ],
        )
        .await
    }

    async fn is_favorite(&self, user_id: &UserId, track_id: &TrackId) -> Result<bool> {
        let rows: Vec<IdRow> = self
            .select(
                FAVORITES,
                &[
                    ("select", "id".to_string()),
                    ("user_id", eq(user_id.as_str())),
                    ("mezmur_id", eq(track_id.as_str())),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_downloads(&self, user_id: &UserId) -> Result<Vec<DownloadRecord>> {
        self.select(
            DOWNLOADS,
            &[
                ("select", "*".to_string()),
                ("user_id", eq(user_id.as_str())),
            ],
        )
        .await
    }

    async fn add_download(
        &self,
        user_id: &UserId,
        track_id: &TrackId,
        local_path: &str,
    ) -> Result<()> {
        self.request(Method::POST, DOWNLOADS)?
            .query(&[("on_conflict", "user_id,mezmur_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&json!([{
                "user_id": user_id,
                "mezmur_id": track_id,
                "local_path": local_path,
            }]))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn remove_download(&self, user_id: &UserId, track_id: &TrackId) -> Result<()> {
        self.delete(
            DOWNLOADS,
            &[
                ("user_id", eq(user_id.as_str())),
                ("mezmur_id", eq(track_id.as_str())),
            ],
        )
        .await
    }

    async fn lookup_download(
        &self,
        user_id: &UserId,
        track_id: &TrackId,
    ) -> Result<Option<String>> {
        let mut rows: Vec<LocalPathRow> = self
            .select(
                DOWNLOADS,
                &[
                    ("select", "local_path".to_string()),
                    ("user_id", eq(user_id.as_str())),
                    ("mezmur_id", eq(track_id.as_str())),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.pop().map(|row| row.local_path))
    }
}

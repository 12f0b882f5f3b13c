//! Track catalog operations

use std::collections::HashMap;

use anyhow::Result;
use sqlx::{Pool, Sqlite};

use super::{current_timestamp, get_categories};
use crate::database::{CategoryId, NewTrack, Track, TrackId};

/// Insert or update a track, keeping its play count
pub async fn upsert_track(pool: &Pool<Sqlite>, track: &NewTrack) -> Result<()> {
    let now = current_timestamp();

    sqlx::query(
        r#"
        INSERT INTO tracks (id, title, artist, category_id, audio_url, poem, duration, image_url, play_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            artist = excluded.artist,
            category_id = excluded.category_id,
            audio_url = excluded.audio_url,
            poem = excluded.poem,
            duration = excluded.duration,
            image_url = excluded.image_url,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&track.id)
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.category_id)
    .bind(&track.audio_url)
    .bind(&track.poem)
    .bind(track.duration)
    .bind(&track.image_url)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fill in the embedded category of each track
async fn with_categories(pool: &Pool<Sqlite>, mut tracks: Vec<Track>) -> Result<Vec<Track>> {
    if tracks.iter().all(|t| t.category_id.is_none()) {
        return Ok(tracks);
    }

    let categories: HashMap<CategoryId, _> = get_categories(pool)
        .await?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();

    for track in &mut tracks {
        track.category = track
            .category_id
            .as_ref()
            .and_then(|id| categories.get(id).cloned());
    }
    Ok(tracks)
}

/// Get all tracks, newest first
pub async fn get_tracks(pool: &Pool<Sqlite>) -> Result<Vec<Track>> {
    let tracks = sqlx::query_as::<_, Track>("SELECT * FROM tracks ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    with_categories(pool, tracks).await
}

/// Get tracks of one category, by title
pub async fn get_tracks_by_category(
    pool: &Pool<Sqlite>,
    category_id: &CategoryId,
) -> Result<Vec<Track>> {
    let tracks =
        sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE category_id = ? ORDER BY title")
            .bind(category_id)
            .fetch_all(pool)
            .await?;
    with_categories(pool, tracks).await
}

/// Search tracks by title or artist (case-insensitive substring)
///
/// SQLite `LIKE` folds ASCII only, so matching happens on Unicode
/// lowercased text here instead.
pub async fn search_tracks(pool: &Pool<Sqlite>, query: &str) -> Result<Vec<Track>> {
    let needle = query.to_lowercase();
    let tracks = sqlx::query_as::<_, Track>("SELECT * FROM tracks ORDER BY title")
        .fetch_all(pool)
        .await?;
    let matches = tracks
        .into_iter()
        .filter(|track| {
            track.title.to_lowercase().contains(&needle)
                || track
                    .artist
                    .as_deref()
                    .is_some_and(|artist| artist.to_lowercase().contains(&needle))
        })
        .collect();
    with_categories(pool, matches).await
}

/// Get track by id
pub async fn get_track(pool: &Pool<Sqlite>, id: &TrackId) -> Result<Option<Track>> {
    let track = sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match track {
        Some(track) => Ok(with_categories(pool, vec![track]).await?.pop()),
        None => Ok(None),
    }
}

/// Atomically bump the play counter
pub async fn increment_play_count(pool: &Pool<Sqlite>, id: &TrackId) -> Result<()> {
    sqlx::query("UPDATE tracks SET play_count = play_count + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

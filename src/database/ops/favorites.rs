//! Per-user favorites

use anyhow::Result;
use sqlx::{Pool, Sqlite};

use super::{current_timestamp, get_track};
use crate::database::{Favorite, TrackId, UserId};

/// Mark a track as favorite (no-op if already marked)
pub async fn add_favorite(pool: &Pool<Sqlite>, user_id: &UserId, track_id: &TrackId) -> Result<()> {
    sqlx::query(
        "INSERT INTO favorites (user_id, track_id, created_at) VALUES (?, ?, ?) ON CONFLICT(user_id, track_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(track_id)
    .bind(current_timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_favorite(
    pool: &Pool<Sqlite>,
    user_id: &UserId,
    track_id: &TrackId,
) -> Result<()> {
    sqlx::query("DELETE FROM favorites WHERE user_id = ? AND track_id = ?")
        .bind(user_id)
        .bind(track_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn is_favorite(pool: &Pool<Sqlite>, user_id: &UserId, track_id: &TrackId) -> Result<bool> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT id FROM favorites WHERE user_id = ? AND track_id = ?")
            .bind(user_id)
            .bind(track_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

/// List a user's favorites, newest first, with their tracks attached
pub async fn get_favorites(pool: &Pool<Sqlite>, user_id: &UserId) -> Result<Vec<Favorite>> {
    let mut favorites = sqlx::query_as::<_, Favorite>(
        "SELECT * FROM favorites WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    for favorite in &mut favorites {
        favorite.track = get_track(pool, &favorite.track_id).await?;
    }
    Ok(favorites)
}

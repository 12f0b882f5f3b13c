//! Download registry operations

use anyhow::Result;
use sqlx::{Pool, Sqlite};

use super::current_timestamp;
use crate::database::{DownloadRecord, TrackId, UserId};

/// Register a downloaded file, replacing any previous entry for the same track
pub async fn add_download(
    pool: &Pool<Sqlite>,
    user_id: &UserId,
    track_id: &TrackId,
    local_path: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO downloads (user_id, track_id, local_path, downloaded_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id, track_id) DO UPDATE SET
            local_path = excluded.local_path,
            downloaded_at = excluded.downloaded_at
        "#,
    )
    .bind(user_id)
    .bind(track_id)
    .bind(local_path)
    .bind(current_timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_download(
    pool: &Pool<Sqlite>,
    user_id: &UserId,
    track_id: &TrackId,
) -> Result<()> {
    sqlx::query("DELETE FROM downloads WHERE user_id = ? AND track_id = ?")
        .bind(user_id)
        .bind(track_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Stored local path for a track, whether or not the file still exists
pub async fn lookup_download(
    pool: &Pool<Sqlite>,
    user_id: &UserId,
    track_id: &TrackId,
) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT local_path FROM downloads WHERE user_id = ? AND track_id = ?")
            .bind(user_id)
            .bind(track_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(path,)| path))
}

pub async fn get_downloads(pool: &Pool<Sqlite>, user_id: &UserId) -> Result<Vec<DownloadRecord>> {
    let downloads = sqlx::query_as::<_, DownloadRecord>(
        "SELECT * FROM downloads WHERE user_id = ? ORDER BY downloaded_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(downloads)
}

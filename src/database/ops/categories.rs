//! Category operations

use anyhow::Result;
use sqlx::{Pool, Sqlite};

use super::current_timestamp;
use crate::database::{Category, NewCategory};

/// Insert or update a category
pub async fn upsert_category(pool: &Pool<Sqlite>, category: &NewCategory) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO categories (id, name, description, icon, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            icon = excluded.icon
        "#,
    )
    .bind(&category.id)
    .bind(&category.name)
    .bind(&category.description)
    .bind(&category.icon)
    .bind(current_timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// Get all categories ordered by name
pub async fn get_categories(pool: &Pool<Sqlite>) -> Result<Vec<Category>> {
    let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(categories)
}

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};

use shared::domain::{GeoCoordinates, Place, PlaceId, PlaceImage};

/// SQLite persistence for the catalog and the user's selected list. The
/// selection is stored as position-ordered references into the catalog.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS places (
                id        TEXT PRIMARY KEY,
                title     TEXT NOT NULL,
                image_src TEXT NOT NULL,
                image_alt TEXT NOT NULL,
                lat       REAL,
                lon       REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure places table exists")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_places (
                position INTEGER PRIMARY KEY,
                place_id TEXT NOT NULL UNIQUE REFERENCES places(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure user_places table exists")?;

        Ok(())
    }

    pub async fn upsert_place(&self, place: &Place) -> Result<()> {
        sqlx::query(
            "INSERT INTO places (id, title, image_src, image_alt, lat, lon)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title=excluded.title,
                 image_src=excluded.image_src,
                 image_alt=excluded.image_alt,
                 lat=excluded.lat,
                 lon=excluded.lon",
        )
        .bind(place.id.as_str())
        .bind(&place.title)
        .bind(&place.image.src)
        .bind(&place.image.alt)
        .bind(place.coordinates.map(|c| c.lat))
        .bind(place.coordinates.map(|c| c.lon))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_catalog(&self) -> Result<Vec<Place>> {
        let rows = sqlx::query(
            "SELECT id, title, image_src, image_alt, lat, lon FROM places ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(place_from_row).collect()
    }

    pub async fn catalog_place(&self, place_id: &PlaceId) -> Result<Option<Place>> {
        let row = sqlx::query(
            "SELECT id, title, image_src, image_alt, lat, lon FROM places WHERE id = ?",
        )
        .bind(place_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(place_from_row).transpose()
    }

    pub async fn selected_places(&self) -> Result<Vec<Place>> {
        let rows = sqlx::query(
            "SELECT p.id, p.title, p.image_src, p.image_alt, p.lat, p.lon
             FROM user_places u
             JOIN places p ON p.id = u.place_id
             ORDER BY u.position",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(place_from_row).collect()
    }

    /// Replaces the stored selection wholesale, preserving the order of
    /// `ids`. Every id must reference a catalog row.
    pub async fn replace_selected_places(&self, ids: &[PlaceId]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM user_places")
            .execute(&mut *tx)
            .await?;
        for (position, id) in ids.iter().enumerate() {
            sqlx::query("INSERT INTO user_places (position, place_id) VALUES (?, ?)")
                .bind(position as i64)
                .bind(id.as_str())
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to store selected place '{id}'"))?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn place_from_row(row: &SqliteRow) -> Result<Place> {
    let lat: Option<f64> = row.try_get("lat")?;
    let lon: Option<f64> = row.try_get("lon")?;
    Ok(Place {
        id: PlaceId::new(row.try_get::<String, _>("id")?),
        title: row.try_get("title")?,
        image: PlaceImage {
            src: row.try_get("image_src")?,
            alt: row.try_get("image_alt")?,
        },
        coordinates: match (lat, lon) {
            (Some(lat), Some(lon)) => Some(GeoCoordinates { lat, lon }),
            _ => None,
        },
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

use crate::models::{Click, Link, NewClick, NewLink};
use crate::storage::{now_epoch, Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

const LINK_COLUMNS: &str =
    "id, title, slug, destination_url, is_active, cloaking_enabled, cloaking_url, created_at";

const CLICK_COLUMNS: &str = "id, link_id, ip_address, user_agent, referrer, inferred_source, \
     source_confidence, query_params, request_uri, accept_language, country_code, country_name, \
     city, device_type, browser, browser_version, os, os_version, fingerprint, is_unique, is_bot, \
     created_at";

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                destination_url TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                cloaking_enabled BOOLEAN NOT NULL DEFAULT 0,
                cloaking_url TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clicks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link_id INTEGER NOT NULL REFERENCES links(id) ON DELETE CASCADE,
                ip_address TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                referrer TEXT,
                inferred_source TEXT,
                source_confidence TEXT NOT NULL DEFAULT 'none',
                query_params TEXT,
                request_uri TEXT,
                accept_language TEXT,
                country_code TEXT,
                country_name TEXT,
                city TEXT,
                device_type TEXT NOT NULL,
                browser TEXT NOT NULL,
                browser_version TEXT,
                os TEXT NOT NULL,
                os_version TEXT,
                fingerprint TEXT NOT NULL,
                is_unique BOOLEAN NOT NULL DEFAULT 0,
                is_bot BOOLEAN NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_clicks_link_fingerprint ON clicks(link_id, fingerprint)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_clicks_created_at ON clicks(created_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn find_active_link(&self, slug: &str) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE slug = ? AND is_active = 1"
        ))
        .bind(slug)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn count_clicks_by_fingerprint(&self, link_id: i64, fingerprint: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM clicks
            WHERE link_id = ? AND fingerprint = ?
            "#,
        )
        .bind(link_id)
        .bind(fingerprint)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn insert_click(&self, click: &NewClick) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clicks
                (link_id, ip_address, user_agent, referrer, inferred_source, source_confidence,
                 query_params, request_uri, accept_language,
                 country_code, country_name, city,
                 device_type, browser, browser_version, os, os_version,
                 fingerprint, is_unique, is_bot, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(click.link_id)
        .bind(&click.ip_address)
        .bind(&click.user_agent)
        .bind(&click.referrer)
        .bind(&click.inferred_source)
        .bind(&click.source_confidence)
        .bind(&click.query_params)
        .bind(&click.request_uri)
        .bind(&click.accept_language)
        .bind(&click.country_code)
        .bind(&click.country_name)
        .bind(&click.city)
        .bind(&click.device_type)
        .bind(&click.browser)
        .bind(&click.browser_version)
        .bind(&click.os)
        .bind(&click.os_version)
        .bind(&click.fingerprint)
        .bind(click.is_unique)
        .bind(click.is_bot)
        .bind(now_epoch())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_link(&self, link: &NewLink) -> StorageResult<Link> {
        let cloaking_url = if link.cloaking_enabled {
            link.cloaking_url.as_deref()
        } else {
            None
        };

        let result = sqlx::query(
            r#"
            INSERT INTO links (title, slug, destination_url, is_active, cloaking_enabled, cloaking_url, created_at)
            VALUES (?, ?, ?, 1, ?, ?, ?)
            ON CONFLICT(slug) DO NOTHING
            "#,
        )
        .bind(&link.title)
        .bind(&link.slug)
        .bind(&link.destination_url)
        .bind(link.cloaking_enabled)
        .bind(cloaking_url)
        .bind(now_epoch())
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        let created = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE slug = ?"
        ))
        .bind(&link.slug)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        Ok(created)
    }

    async fn get_link(&self, slug: &str) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE slug = ?"
        ))
        .bind(slug)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn set_link_active(&self, slug: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE links SET is_active = ? WHERE slug = ?")
            .bind(active)
            .bind(slug)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_link(&self, slug: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM clicks WHERE link_id IN (SELECT id FROM links WHERE slug = ?)")
            .bind(slug)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM links WHERE slug = ?")
            .bind(slug)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_links(&self) -> Result<Vec<Link>> {
        let links = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(links)
    }

    async fn list_clicks(&self, link_id: i64, limit: i64) -> Result<Vec<Click>> {
        let clicks = sqlx::query_as::<_, Click>(&format!(
            "SELECT {CLICK_COLUMNS} FROM clicks WHERE link_id = ? ORDER BY id DESC LIMIT ?"
        ))
        .bind(link_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(clicks)
    }

    async fn purge_clicks(&self, link_id: Option<i64>) -> Result<u64> {
        let result = match link_id {
            Some(id) => {
                sqlx::query("DELETE FROM clicks WHERE link_id = ?")
                    .bind(id)
                    .execute(self.pool.as_ref())
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM clicks")
                    .execute(self.pool.as_ref())
                    .await?
            }
        };

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> SqliteStorage {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        storage
    }

    fn new_link(slug: &str) -> NewLink {
        NewLink {
            title: "Test".to_string(),
            slug: slug.to_string(),
            destination_url: "https://example.com".to_string(),
            cloaking_enabled: false,
            cloaking_url: Some("https://ignored.example".to_string()),
        }
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let storage = setup().await;
        storage.init().await.unwrap();
    }

    #[tokio::test]
    async fn test_cloaking_url_dropped_when_disabled() {
        let storage = setup().await;
        let link = storage.create_link(&new_link("offers")).await.unwrap();
        assert!(!link.cloaking_enabled);
        assert_eq!(link.cloaking_url, None);
        assert!(link.is_active);
    }

    #[tokio::test]
    async fn test_find_active_link_skips_inactive() {
        let storage = setup().await;
        storage.create_link(&new_link("offers")).await.unwrap();
        assert!(storage.find_active_link("offers").await.unwrap().is_some());

        assert!(storage.set_link_active("offers", false).await.unwrap());
        assert!(storage.find_active_link("offers").await.unwrap().is_none());
        assert!(storage.get_link("offers").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_link_active_unknown_slug() {
        let storage = setup().await;
        assert!(!storage.set_link_active("missing", true).await.unwrap());
    }
}

use crate::models::{Click, Link, NewClick, NewLink};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("slug already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Fetch the active link whose slug matches exactly
    async fn find_active_link(&self, slug: &str) -> Result<Option<Link>>;

    /// Number of clicks already recorded for this visitor on this link
    async fn count_clicks_by_fingerprint(&self, link_id: i64, fingerprint: &str) -> Result<i64>;

    /// Insert one click row
    async fn insert_click(&self, click: &NewClick) -> Result<()>;

    /// Create a link; fails with `Conflict` when the slug is taken
    async fn create_link(&self, link: &NewLink) -> StorageResult<Link>;

    /// Fetch a link by slug regardless of its active flag
    async fn get_link(&self, slug: &str) -> Result<Option<Link>>;

    /// Activate or deactivate a link. Returns false if no such slug.
    async fn set_link_active(&self, slug: &str, active: bool) -> Result<bool>;

    /// Delete a link together with its click history
    async fn delete_link(&self, slug: &str) -> Result<bool>;

    /// List all links, newest first
    async fn list_links(&self) -> Result<Vec<Link>>;

    /// Most recent clicks for a link, newest first
    async fn list_clicks(&self, link_id: i64, limit: i64) -> Result<Vec<Click>>;

    /// Bulk-delete clicks for one link, or for every link when `link_id` is None.
    /// Returns the number of rows removed.
    async fn purge_clicks(&self, link_id: Option<i64>) -> Result<u64>;
}

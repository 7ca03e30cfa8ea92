use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkValidationError {
    #[error("title is required")]
    MissingTitle,
    #[error("slug can only contain lowercase letters, numbers, and hyphens")]
    InvalidSlug,
    #[error("invalid destination URL: {0}")]
    InvalidDestination(String),
    #[error("invalid cloaking URL: {0}")]
    InvalidCloakingUrl(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub destination_url: String,
    pub is_active: bool,
    pub cloaking_enabled: bool,
    pub cloaking_url: Option<String>,
    pub created_at: i64,
}

impl Link {
    /// Cloaking URL that is actually in effect: `None` when cloaking is
    /// disabled, even if a URL is still stored.
    pub fn effective_cloaking_url(&self) -> Option<&str> {
        if !self.cloaking_enabled {
            return None;
        }
        self.cloaking_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLink {
    pub title: String,
    pub slug: String,
    pub destination_url: String,
    pub cloaking_enabled: bool,
    pub cloaking_url: Option<String>,
}

impl NewLink {
    pub fn validate(&self) -> Result<(), LinkValidationError> {
        if self.title.trim().is_empty() {
            return Err(LinkValidationError::MissingTitle);
        }
        if !is_valid_slug(&self.slug) {
            return Err(LinkValidationError::InvalidSlug);
        }
        if !is_valid_url(&self.destination_url) {
            return Err(LinkValidationError::InvalidDestination(
                self.destination_url.clone(),
            ));
        }
        if let Some(cloaking_url) = self.cloaking_url.as_deref().filter(|_| self.cloaking_enabled) {
            if !is_valid_url(cloaking_url) {
                return Err(LinkValidationError::InvalidCloakingUrl(cloaking_url.to_string()));
            }
        }
        Ok(())
    }
}

/// Lowercase, replace anything outside `[a-z0-9-]` with `-`, collapse and trim hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.trim().to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug.trim_matches('-').to_string()
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_valid_url(raw: &str) -> bool {
    match url::Url::parse(raw.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

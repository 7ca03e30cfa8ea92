use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted click row. Never updated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Click {
    pub id: i64,
    pub link_id: i64,
    pub ip_address: String,
    pub user_agent: String,
    pub referrer: Option<String>,
    pub inferred_source: Option<String>,
    pub source_confidence: String,
    pub query_params: Option<String>,
    pub request_uri: Option<String>,
    pub accept_language: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub city: Option<String>,
    pub device_type: String,
    pub browser: String,
    pub browser_version: Option<String>,
    pub os: String,
    pub os_version: Option<String>,
    pub fingerprint: String,
    pub is_unique: bool,
    pub is_bot: bool,
    pub created_at: i64,
}

/// Everything the tracker gathered about one redirect, ready to insert.
#[derive(Debug, Clone, Serialize)]
pub struct NewClick {
    pub link_id: i64,
    pub ip_address: String,
    pub user_agent: String,
    pub referrer: Option<String>,
    pub inferred_source: Option<String>,
    pub source_confidence: String,
    pub query_params: Option<String>,
    pub request_uri: Option<String>,
    pub accept_language: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub city: Option<String>,
    pub device_type: String,
    pub browser: String,
    pub browser_version: Option<String>,
    pub os: String,
    pub os_version: Option<String>,
    pub fingerprint: String,
    pub is_unique: bool,
    pub is_bot: bool,
}

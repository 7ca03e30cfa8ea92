use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Salt used when `FINGERPRINT_SALT` is not provided. Fingerprints stay stable,
/// but anyone who knows this value can correlate them, so deployments should set their own.
pub const PLACEHOLDER_FINGERPRINT_SALT: &str = "tracklink-change-me";

const DEFAULT_GEOIP_API_URL: &str =
    "http://ip-api.com/json/{ip}?fields=status,countryCode,country,city";

/// Crawler, unfurler, HTTP-client and headless-browser markers matched
/// case-insensitively against the user agent.
pub const DEFAULT_BOT_TOKENS: &[&str] = &[
    // search engines
    "googlebot",
    "bingbot",
    "slurp",
    "duckduckbot",
    "baiduspider",
    "yandexbot",
    "sogou",
    "exabot",
    "facebot",
    "ia_archiver",
    "semrushbot",
    "ahrefsbot",
    "mj12bot",
    "dotbot",
    // generic
    "bot",
    "crawler",
    "spider",
    "scraper",
    // http clients
    "curl",
    "wget",
    "python-requests",
    "java/",
    "go-http-client",
    "postman",
    "insomnia",
    "httpie",
    "okhttp",
    "apache-httpclient",
    // link unfurlers
    "facebookexternalhit",
    "twitterbot",
    "linkedinbot",
    "whatsapp",
    "telegrambot",
    "discordbot",
    "slackbot",
    "zoomindex",
    "applebot",
    "bingpreview",
    // seo tooling
    "moz.com",
    "blexbot",
    "petalbot",
    // headless browsers and automation
    "headless",
    "phantom",
    "selenium",
    "webdriver",
    "puppeteer",
    "playwright",
    "cypress",
    "chromedriver",
    "geckodriver",
];

/// Datacenter ranges of well-known crawlers. Illustrative rather than complete;
/// override with `BOT_IP_PREFIXES`.
pub const DEFAULT_BOT_IP_PREFIXES: &[&str] = &[
    "205.169.39.", // Microsoft datacenter
    "40.77.",      // Bing
    "157.55.",     // Microsoft
    "207.46.",     // Microsoft
    "66.249.",     // Google
    "17.0.",       // Apple
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub tracking: TrackingConfig,
    pub geoip: GeoIpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Settings threaded into the tracking pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub bot_tokens: Vec<String>,
    /// Plain string prefixes (`66.249.`) or CIDR blocks (`66.249.64.0/19`).
    pub bot_ip_prefixes: Vec<String>,
    pub geo_enabled: bool,
    pub geo_cache_ttl: Duration,
    pub fingerprint_salt: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            bot_tokens: DEFAULT_BOT_TOKENS.iter().map(|s| s.to_string()).collect(),
            bot_ip_prefixes: DEFAULT_BOT_IP_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            geo_enabled: true,
            geo_cache_ttl: Duration::from_secs(86_400),
            fingerprint_salt: PLACEHOLDER_FINGERPRINT_SALT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeoIpMethod {
    IpApi,
    MaxMind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoCacheBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    pub method: GeoIpMethod,
    /// Lookup URL with an `{ip}` placeholder
    pub api_url: String,
    pub timeout_ms: u64,
    #[serde(default)]
    pub maxmind_db_path: Option<String>,
    pub cache_backend: GeoCacheBackend,
    pub cache_path: String,
    pub cache_capacity: u64,
}

impl GeoIpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            method: GeoIpMethod::IpApi,
            api_url: DEFAULT_GEOIP_API_URL.to_string(),
            timeout_ms: 2_000,
            maxmind_db_path: None,
            cache_backend: GeoCacheBackend::File,
            cache_path: "./cache".to_string(),
            cache_capacity: 10_000,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./tracklink.db?mode=rwc".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let tracking = tracking_from_env()?;
        let geoip = geoip_from_env()?;

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            tracking,
            geoip,
        })
    }
}

fn tracking_from_env() -> anyhow::Result<TrackingConfig> {
    let mut tracking = TrackingConfig::default();

    if let Ok(extra) = std::env::var("BOT_USER_AGENTS") {
        for token in split_list(&extra) {
            let token = token.to_lowercase();
            if !tracking.bot_tokens.contains(&token) {
                tracking.bot_tokens.push(token);
            }
        }
    }

    if let Ok(prefixes) = std::env::var("BOT_IP_PREFIXES") {
        tracking.bot_ip_prefixes = split_list(&prefixes);
    }

    if let Ok(enabled) = std::env::var("GEOIP_ENABLED") {
        tracking.geo_enabled = parse_bool(&enabled);
    }

    if let Ok(ttl) = std::env::var("GEOIP_CACHE_TIME") {
        let secs = ttl
            .parse::<u64>()
            .context("GEOIP_CACHE_TIME must be a number of seconds")?;
        tracking.geo_cache_ttl = Duration::from_secs(secs);
    }

    match std::env::var("FINGERPRINT_SALT") {
        Ok(salt) if !salt.is_empty() => tracking.fingerprint_salt = salt,
        _ => tracing::warn!(
            "FINGERPRINT_SALT is not set, using the built-in placeholder salt"
        ),
    }

    Ok(tracking)
}

fn geoip_from_env() -> anyhow::Result<GeoIpConfig> {
    let mut geoip = GeoIpConfig::default();

    if let Ok(method) = std::env::var("GEOIP_METHOD") {
        geoip.method = match method.to_lowercase().as_str() {
            "ip-api" | "ipapi" => GeoIpMethod::IpApi,
            "maxmind" => GeoIpMethod::MaxMind,
            other => {
                tracing::warn!(
                    "Unknown GEOIP_METHOD '{other}', falling back to 'ip-api'. Supported values: ip-api, maxmind"
                );
                GeoIpMethod::IpApi
            }
        };
    }

    if let Ok(url) = std::env::var("GEOIP_API_URL") {
        geoip.api_url = url;
    }

    if let Ok(timeout) = std::env::var("GEOIP_TIMEOUT_MS") {
        geoip.timeout_ms = timeout
            .parse::<u64>()
            .context("GEOIP_TIMEOUT_MS must be a number of milliseconds")?;
    }

    geoip.maxmind_db_path = std::env::var("MAXMIND_DATABASE_PATH").ok();
    if geoip.method == GeoIpMethod::MaxMind && geoip.maxmind_db_path.is_none() {
        anyhow::bail!("MAXMIND_DATABASE_PATH must be set when GEOIP_METHOD=maxmind");
    }

    if let Ok(backend) = std::env::var("GEOIP_CACHE_BACKEND") {
        geoip.cache_backend = match backend.to_lowercase().as_str() {
            "memory" => GeoCacheBackend::Memory,
            _ => GeoCacheBackend::File,
        };
    }

    if let Ok(path) = std::env::var("CACHE_PATH") {
        geoip.cache_path = path;
    }

    if let Ok(capacity) = std::env::var("GEOIP_CACHE_CAPACITY") {
        geoip.cache_capacity = capacity
            .parse::<u64>()
            .context("GEOIP_CACHE_CAPACITY must be a positive integer")?;
    }

    Ok(geoip)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

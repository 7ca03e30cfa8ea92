use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::analytics::GeoResolver;
use crate::config::TrackingConfig;
use crate::models::{Link, NewClick};
use crate::storage::Storage;
use crate::tracking::bot::BotClassifier;
use crate::tracking::cloaking::resolve_target;
use crate::tracking::fingerprint::fingerprint;
use crate::tracking::referrer::infer_source;
use crate::tracking::user_agent::parse_user_agent;

/// Everything the tracker needs from one incoming redirect request.
#[derive(Debug, Clone)]
pub struct ClickRequest {
    /// Raw path segment, before sanitising
    pub slug: String,
    pub client_ip: IpAddr,
    pub user_agent: String,
    pub referrer: Option<String>,
    pub query_string: Option<String>,
    pub request_uri: Option<String>,
    pub accept_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Redirect {
        target: String,
        /// Whether the click row made it into storage
        recorded: bool,
    },
    /// No active link for the slug; nothing was recorded
    NotFound,
    /// The link lookup itself failed, so there is nowhere to send the visitor
    LookupFailed,
}

/// Strip everything outside `[A-Za-z0-9-]`.
pub fn sanitize_slug(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

pub struct Tracker {
    storage: Arc<dyn Storage>,
    bots: BotClassifier,
    geo: GeoResolver,
    fingerprint_salt: String,
}

impl Tracker {
    pub fn new(storage: Arc<dyn Storage>, config: &TrackingConfig, geo: GeoResolver) -> Self {
        Self {
            storage,
            bots: BotClassifier::from_config(config),
            geo,
            fingerprint_salt: config.fingerprint_salt.clone(),
        }
    }

    /// Run the whole pipeline for one request. Only the link lookup can
    /// change the outcome; every enrichment step degrades to defaults.
    pub async fn track(&self, request: ClickRequest) -> TrackOutcome {
        let link = match self.resolve_link(&request.slug).await {
            Ok(Some(link)) => link,
            Ok(None) => return TrackOutcome::NotFound,
            Err(e) => {
                error!(slug = %request.slug, error = %e, "failed to fetch link");
                return TrackOutcome::LookupFailed;
            }
        };

        let is_bot = self
            .bots
            .is_bot(&request.user_agent, Some(request.client_ip));
        let target = resolve_target(&link, is_bot).to_string();

        let click = self.build_click(&link, &request, is_bot).await;
        let recorded = self.record_click(&click).await;

        debug!(
            slug = %link.slug,
            is_bot,
            is_unique = click.is_unique,
            recorded,
            "redirecting"
        );

        TrackOutcome::Redirect { target, recorded }
    }

    async fn resolve_link(&self, raw_slug: &str) -> anyhow::Result<Option<Link>> {
        let slug = sanitize_slug(raw_slug);
        if slug.is_empty() {
            return Ok(None);
        }
        self.storage.find_active_link(&slug).await
    }

    async fn build_click(&self, link: &Link, request: &ClickRequest, is_bot: bool) -> NewClick {
        let ip = request.client_ip.to_string();
        let ua = parse_user_agent(&request.user_agent);
        let inferred = infer_source(request.referrer.as_deref(), request.query_string.as_deref());
        let location = self.geo.resolve(request.client_ip).await;
        let fingerprint = fingerprint(&ip, &request.user_agent, &self.fingerprint_salt);
        let is_unique = self.is_unique_visitor(link.id, &fingerprint).await;

        NewClick {
            link_id: link.id,
            ip_address: ip,
            user_agent: request.user_agent.clone(),
            referrer: request.referrer.clone(),
            inferred_source: inferred.source,
            source_confidence: inferred.confidence.as_str().to_string(),
            query_params: request.query_string.clone(),
            request_uri: request.request_uri.clone(),
            accept_language: request.accept_language.clone(),
            country_code: location.country_code,
            country_name: location.country_name,
            city: location.city,
            device_type: ua.device.as_str().to_string(),
            browser: ua.browser,
            browser_version: ua.browser_version,
            os: ua.os,
            os_version: ua.os_version,
            fingerprint,
            is_unique,
            is_bot,
        }
    }

    /// First click for a (link, fingerprint) pair is unique. The check and the
    /// later insert are not atomic, so simultaneous first clicks may both count.
    async fn is_unique_visitor(&self, link_id: i64, fingerprint: &str) -> bool {
        match self
            .storage
            .count_clicks_by_fingerprint(link_id, fingerprint)
            .await
        {
            Ok(count) => count == 0,
            Err(e) => {
                warn!(link_id, error = %e, "failed to check unique visitor");
                false
            }
        }
    }

    async fn record_click(&self, click: &NewClick) -> bool {
        match self.storage.insert_click(click).await {
            Ok(()) => true,
            Err(e) => {
                warn!(link_id = click.link_id, error = %e, "failed to record click");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Click, NewLink};
    use crate::storage::{SqliteStorage, StorageResult};
    use async_trait::async_trait;

    const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const BOT_UA: &str = "Mozilla/5.0 (compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm)";

    /// Delegates everything except click reads/writes, which fail.
    struct BrokenClicks {
        inner: Arc<dyn Storage>,
    }

    #[async_trait]
    impl Storage for BrokenClicks {
        async fn init(&self) -> anyhow::Result<()> {
            self.inner.init().await
        }
        async fn find_active_link(&self, slug: &str) -> anyhow::Result<Option<Link>> {
            self.inner.find_active_link(slug).await
        }
        async fn count_clicks_by_fingerprint(&self, _: i64, _: &str) -> anyhow::Result<i64> {
            anyhow::bail!("clicks table unavailable")
        }
        async fn insert_click(&self, _: &NewClick) -> anyhow::Result<()> {
            anyhow::bail!("UNIQUE constraint failed: clicks.id")
        }
        async fn create_link(&self, link: &NewLink) -> StorageResult<Link> {
            self.inner.create_link(link).await
        }
        async fn get_link(&self, slug: &str) -> anyhow::Result<Option<Link>> {
            self.inner.get_link(slug).await
        }
        async fn set_link_active(&self, slug: &str, active: bool) -> anyhow::Result<bool> {
            self.inner.set_link_active(slug, active).await
        }
        async fn delete_link(&self, slug: &str) -> anyhow::Result<bool> {
            self.inner.delete_link(slug).await
        }
        async fn list_links(&self) -> anyhow::Result<Vec<Link>> {
            self.inner.list_links().await
        }
        async fn list_clicks(&self, link_id: i64, limit: i64) -> anyhow::Result<Vec<Click>> {
            self.inner.list_clicks(link_id, limit).await
        }
        async fn purge_clicks(&self, link_id: Option<i64>) -> anyhow::Result<u64> {
            self.inner.purge_clicks(link_id).await
        }
    }

    async fn storage_with_link(cloak: bool) -> Arc<dyn Storage> {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        storage
            .create_link(&NewLink {
                title: "Spring sale".to_string(),
                slug: "spring-sale".to_string(),
                destination_url: "https://shop.example/sale".to_string(),
                cloaking_enabled: cloak,
                cloaking_url: Some("https://blog.example/review".to_string()),
            })
            .await
            .unwrap();
        Arc::new(storage)
    }

    fn tracker(storage: Arc<dyn Storage>) -> Tracker {
        Tracker::new(storage, &TrackingConfig::default(), GeoResolver::disabled())
    }

    fn request(slug: &str, ua: &str) -> ClickRequest {
        ClickRequest {
            slug: slug.to_string(),
            client_ip: "203.0.113.10".parse().unwrap(),
            user_agent: ua.to_string(),
            referrer: None,
            query_string: Some("gclid=abc&utm_source=news".to_string()),
            request_uri: Some(format!("/{slug}?gclid=abc&utm_source=news")),
            accept_language: Some("en-US,en;q=0.9".to_string()),
        }
    }

    #[test]
    fn test_sanitize_slug() {
        assert_eq!(sanitize_slug("spring-sale"), "spring-sale");
        assert_eq!(sanitize_slug("spring-sale';--"), "spring-sale--");
        assert_eq!(sanitize_slug("../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_slug("über"), "ber");
    }

    #[tokio::test]
    async fn test_first_click_unique_then_repeat() {
        let storage = storage_with_link(false).await;
        let tracker = tracker(Arc::clone(&storage));

        for _ in 0..2 {
            let outcome = tracker.track(request("spring-sale", BROWSER_UA)).await;
            assert_eq!(
                outcome,
                TrackOutcome::Redirect {
                    target: "https://shop.example/sale".to_string(),
                    recorded: true
                }
            );
        }

        let link = storage.get_link("spring-sale").await.unwrap().unwrap();
        let clicks = storage.list_clicks(link.id, 10).await.unwrap();
        assert_eq!(clicks.len(), 2);
        // newest first
        assert!(!clicks[0].is_unique);
        assert!(clicks[1].is_unique);
        assert_eq!(clicks[0].fingerprint, clicks[1].fingerprint);
    }

    #[tokio::test]
    async fn test_click_row_contents() {
        let storage = storage_with_link(false).await;
        let tracker = tracker(Arc::clone(&storage));

        tracker.track(request("spring-sale", BROWSER_UA)).await;

        let link = storage.get_link("spring-sale").await.unwrap().unwrap();
        let click = storage.list_clicks(link.id, 1).await.unwrap().remove(0);
        assert_eq!(click.ip_address, "203.0.113.10");
        assert_eq!(click.inferred_source.as_deref(), Some("Google Ads"));
        assert_eq!(click.source_confidence, "high");
        assert_eq!(click.browser, "Chrome");
        assert_eq!(click.browser_version.as_deref(), Some("120"));
        assert_eq!(click.os, "Windows 10");
        assert_eq!(click.device_type, "desktop");
        assert_eq!(click.accept_language.as_deref(), Some("en-US,en;q=0.9"));
        assert_eq!(click.country_code, None);
        assert!(!click.is_bot);
    }

    #[tokio::test]
    async fn test_bot_is_cloaked() {
        let storage = storage_with_link(true).await;
        let tracker = tracker(Arc::clone(&storage));

        let bot = tracker.track(request("spring-sale", BOT_UA)).await;
        assert_eq!(
            bot,
            TrackOutcome::Redirect {
                target: "https://blog.example/review".to_string(),
                recorded: true
            }
        );

        let human = tracker.track(request("spring-sale", BROWSER_UA)).await;
        assert_eq!(
            human,
            TrackOutcome::Redirect {
                target: "https://shop.example/sale".to_string(),
                recorded: true
            }
        );
    }

    #[tokio::test]
    async fn test_datacenter_ip_is_cloaked() {
        let storage = storage_with_link(true).await;
        let tracker = tracker(storage);

        let mut req = request("spring-sale", BROWSER_UA);
        req.client_ip = "66.249.66.1".parse().unwrap();

        match tracker.track(req).await {
            TrackOutcome::Redirect { target, .. } => {
                assert_eq!(target, "https://blog.example/review")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_slugs() {
        let storage = storage_with_link(false).await;
        let tracker = tracker(Arc::clone(&storage));

        assert_eq!(
            tracker.track(request("nope", BROWSER_UA)).await,
            TrackOutcome::NotFound
        );
        assert_eq!(
            tracker.track(request("%%%", BROWSER_UA)).await,
            TrackOutcome::NotFound
        );

        storage.set_link_active("spring-sale", false).await.unwrap();
        assert_eq!(
            tracker.track(request("spring-sale", BROWSER_UA)).await,
            TrackOutcome::NotFound
        );

        let link = storage.get_link("spring-sale").await.unwrap().unwrap();
        assert!(storage.list_clicks(link.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recording_failure_still_redirects() {
        let inner = storage_with_link(false).await;
        let tracker = tracker(Arc::new(BrokenClicks { inner }));

        assert_eq!(
            tracker.track(request("spring-sale", BROWSER_UA)).await,
            TrackOutcome::Redirect {
                target: "https://shop.example/sale".to_string(),
                recorded: false
            }
        );
    }
}

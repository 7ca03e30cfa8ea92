use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analytics::geo_cache::{cache_key, FileGeoCache, GeoCache, MemoryGeoCache};
use crate::analytics::ip_extractor::is_public_ip;
use crate::analytics::models::GeoLocation;
use crate::analytics::{IpApiProvider, MaxMindProvider};
use crate::config::{GeoCacheBackend, GeoIpConfig, GeoIpMethod, TrackingConfig};

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geolocation lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("geolocation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("geolocation provider reported failure: {0}")]
    Status(String),
    #[error("malformed geolocation response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("GeoIP database error: {0}")]
    Database(String),
}

/// A source of IP geolocation data.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn lookup(&self, ip: IpAddr) -> Result<GeoLocation, GeoError>;
}

/// Resolves client IPs to locations with caching. Never returns an error:
/// every failure is logged and becomes an unknown location.
pub struct GeoResolver {
    provider: Option<Arc<dyn GeoProvider>>,
    cache: Arc<dyn GeoCache>,
    ttl: Duration,
    timeout: Duration,
}

impl GeoResolver {
    pub fn new(
        provider: Arc<dyn GeoProvider>,
        cache: Arc<dyn GeoCache>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            provider: Some(provider),
            cache,
            ttl,
            timeout,
        }
    }

    /// A resolver that never performs lookups.
    pub fn disabled() -> Self {
        Self {
            provider: None,
            cache: Arc::new(MemoryGeoCache::new(1)),
            ttl: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }

    pub async fn from_config(
        tracking: &TrackingConfig,
        geoip: &GeoIpConfig,
    ) -> anyhow::Result<Self> {
        if !tracking.geo_enabled {
            tracing::info!("Geolocation is disabled");
            return Ok(Self::disabled());
        }

        let provider: Arc<dyn GeoProvider> = match geoip.method {
            GeoIpMethod::IpApi => Arc::new(IpApiProvider::new(&geoip.api_url, geoip.timeout())?),
            GeoIpMethod::MaxMind => {
                let path = geoip.maxmind_db_path.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("MAXMIND_DATABASE_PATH must be set when GEOIP_METHOD=maxmind")
                })?;
                Arc::new(MaxMindProvider::new(path)?)
            }
        };

        let cache = build_cache(geoip).await?;

        tracing::info!(
            provider = provider.name(),
            ttl_secs = tracking.geo_cache_ttl.as_secs(),
            "Geolocation enabled"
        );

        Ok(Self::new(
            provider,
            cache,
            tracking.geo_cache_ttl,
            geoip.timeout(),
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn resolve(&self, ip: IpAddr) -> GeoLocation {
        let Some(provider) = self.provider.as_ref() else {
            return GeoLocation::default();
        };

        if !is_public_ip(ip) {
            return GeoLocation::default();
        }

        let key = cache_key(&ip.to_string());

        match self.cache.get(&key).await {
            Ok(Some(entry)) => return entry.value,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "geolocation cache read failed"),
        }

        let result = match tokio::time::timeout(self.timeout, provider.lookup(ip)).await {
            Ok(result) => result,
            Err(_) => Err(GeoError::Timeout(self.timeout)),
        };

        match result {
            Ok(location) => {
                debug!(provider = provider.name(), ?location, "geolocation resolved");
                if let Err(e) = self.cache.set(&key, &location, self.ttl).await {
                    warn!(error = %e, "geolocation cache write failed");
                }
                location
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "geolocation lookup failed");
                GeoLocation::default()
            }
        }
    }
}

pub async fn build_cache(geoip: &GeoIpConfig) -> anyhow::Result<Arc<dyn GeoCache>> {
    let cache: Arc<dyn GeoCache> = match geoip.cache_backend {
        GeoCacheBackend::File => Arc::new(FileGeoCache::new(&geoip.cache_path).await?),
        GeoCacheBackend::Memory => Arc::new(MemoryGeoCache::new(geoip.cache_capacity)),
    };
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        response: Result<GeoLocation, String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn ok(location: GeoLocation) -> Self {
            Self {
                response: Ok(location),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err("fail".to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                response: Ok(paris()),
                delay,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GeoProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn lookup(&self, _ip: IpAddr) -> Result<GeoLocation, GeoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.response.clone().map_err(GeoError::Status)
        }
    }

    fn paris() -> GeoLocation {
        GeoLocation {
            country_code: Some("FR".to_string()),
            country_name: Some("France".to_string()),
            city: Some("Paris".to_string()),
        }
    }

    fn resolver(provider: Arc<ScriptedProvider>) -> GeoResolver {
        GeoResolver::new(
            provider,
            Arc::new(MemoryGeoCache::new(100)),
            Duration::from_secs(3600),
            Duration::from_millis(200),
        )
    }

    fn public_ip() -> IpAddr {
        "81.2.69.160".parse().unwrap()
    }

    #[tokio::test]
    async fn test_lookup_is_cached() {
        let provider = Arc::new(ScriptedProvider::ok(paris()));
        let resolver = resolver(Arc::clone(&provider));

        assert_eq!(resolver.resolve(public_ip()).await, paris());
        assert_eq!(resolver.resolve(public_ip()).await, paris());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_private_ip_skips_provider() {
        let provider = Arc::new(ScriptedProvider::ok(paris()));
        let resolver = resolver(Arc::clone(&provider));

        let location = resolver.resolve("192.168.1.20".parse().unwrap()).await;
        assert!(location.is_unknown());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let provider = Arc::new(ScriptedProvider::failing());
        let resolver = resolver(Arc::clone(&provider));

        assert!(resolver.resolve(public_ip()).await.is_unknown());
        assert!(resolver.resolve(public_ip()).await.is_unknown());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_yields_unknown() {
        let provider = Arc::new(ScriptedProvider::slow(Duration::from_secs(5)));
        let resolver = resolver(Arc::clone(&provider));

        let started = std::time::Instant::now();
        let location = resolver.resolve(public_ip()).await;
        assert!(location.is_unknown());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_disabled_resolver() {
        let resolver = GeoResolver::disabled();
        assert!(!resolver.is_enabled());
        assert!(resolver.resolve(public_ip()).await.is_unknown());
    }
}

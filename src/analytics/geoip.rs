//! GeoIP lookup using a local MaxMind GeoLite2/GeoIP2 City database
//!
//! The database is memory-mapped once and shared; lookups never touch the
//! network.

use anyhow::{Context, Result};
use async_trait::async_trait;
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use crate::analytics::models::GeoLocation;
use crate::analytics::resolver::{GeoError, GeoProvider};

#[derive(Clone)]
pub struct MaxMindProvider {
    reader: Arc<Reader<Mmap>>,
}

impl MaxMindProvider {
    /// Open a GeoLite2-City or GeoIP2-City `.mmdb` file
    pub fn new(city_path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(city_path) }
            .with_context(|| format!("Failed to open GeoIP City database at {}", city_path))?;

        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    fn lookup_sync(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        let mut location = GeoLocation::default();

        let result = self
            .reader
            .lookup(ip)
            .map_err(|e| GeoError::Database(e.to_string()))?;

        // Addresses missing from the database are not an error.
        if let Some(city) = result
            .decode::<geoip2::City>()
            .map_err(|e| GeoError::Database(e.to_string()))?
        {
            location.country_code = city.country.iso_code.map(|s| s.to_string());
            location.country_name = city.country.names.english.map(|s| s.to_string());
            location.city = city.city.names.english.map(|s| s.to_string());
        }

        Ok(location)
    }
}

#[async_trait]
impl GeoProvider for MaxMindProvider {
    fn name(&self) -> &'static str {
        "maxmind"
    }

    async fn lookup(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        self.lookup_sync(ip)
    }
}

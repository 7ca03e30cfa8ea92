//! Visitor geolocation and client address handling.
//!
//! Lookups go through a [`GeoResolver`], which never fails: provider errors,
//! timeouts and cache problems all degrade to an unknown location.

pub mod geo_cache;
pub mod geoip;
pub mod ip_api;
pub mod ip_extractor;
pub mod models;
pub mod resolver;

pub use geo_cache::{CacheEntry, CacheError, FileGeoCache, GeoCache, MemoryGeoCache};
pub use geoip::MaxMindProvider;
pub use ip_api::IpApiProvider;
pub use ip_extractor::{extract_client_ip, is_public_ip};
pub use models::GeoLocation;
pub use resolver::{GeoError, GeoProvider, GeoResolver};

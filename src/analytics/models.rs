//! Data models for geolocation

use serde::{Deserialize, Serialize};

/// Location resolved for a client IP. Every field is optional; an all-`None`
/// value means "unknown", never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB")
    pub country_code: Option<String>,

    /// Country name
    pub country_name: Option<String>,

    /// City name
    pub city: Option<String>,
}

impl GeoLocation {
    pub fn is_unknown(&self) -> bool {
        self.country_code.is_none() && self.country_name.is_none() && self.city.is_none()
    }
}

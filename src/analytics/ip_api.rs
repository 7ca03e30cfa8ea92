//! HTTP geolocation provider speaking the ip-api.com JSON format.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use crate::analytics::models::GeoLocation;
use crate::analytics::resolver::{GeoError, GeoProvider};

/// `{"status":"success","countryCode":"US","country":"United States","city":"Ashburn"}`
/// or `{"status":"fail","message":"reserved range"}`
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "countryCode")]
    country_code: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

pub struct IpApiProvider {
    client: Client,
    url_template: String,
    timeout: Duration,
}

impl IpApiProvider {
    /// `url_template` contains an `{ip}` placeholder, e.g.
    /// `http://ip-api.com/json/{ip}?fields=status,countryCode,country,city`
    pub fn new(url_template: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tracklink/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for geolocation lookups")?;

        Ok(Self {
            client,
            url_template: url_template.to_string(),
            timeout,
        })
    }

    fn url_for(&self, ip: IpAddr) -> String {
        self.url_template.replace("{ip}", &ip.to_string())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    fn name(&self) -> &'static str {
        "ip-api"
    }

    async fn lookup(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        let response = self
            .client
            .get(self.url_for(ip))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeoError::Timeout(self.timeout)
                } else {
                    GeoError::Request(e)
                }
            })?
            .error_for_status()?;

        let body = response.text().await?;
        let parsed: IpApiResponse = serde_json::from_str(&body)?;

        if parsed.status != "success" {
            return Err(GeoError::Status(
                parsed.message.unwrap_or(parsed.status),
            ));
        }

        Ok(GeoLocation {
            country_code: non_empty(parsed.country_code),
            country_name: non_empty(parsed.country),
            city: non_empty(parsed.city),
        })
    }
}

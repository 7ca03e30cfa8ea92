//! Traffic-source inference for visits that arrive without a `Referer`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::None => "none",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredSource {
    pub source: Option<String>,
    pub confidence: Confidence,
}

impl InferredSource {
    fn unknown() -> Self {
        Self {
            source: None,
            confidence: Confidence::None,
        }
    }
}

/// Ad-platform click identifiers, checked in this order.
const CLICK_ID_PARAMS: &[(&str, &str)] = &[
    ("fbclid", "Facebook"),
    ("gclid", "Google Ads"),
    ("msclkid", "Bing Ads"),
    ("ttclid", "TikTok"),
    ("twclid", "Twitter"),
    ("li_fat_id", "LinkedIn"),
    ("igshid", "Instagram"),
    ("ref_share", "Pinterest"),
];

/// Parameters whose value is reported verbatim as the source.
const VALUE_PARAMS: &[(&str, Confidence)] = &[
    ("utm_source", Confidence::Medium),
    ("ref", Confidence::Medium),
    ("source", Confidence::Medium),
    ("utm_campaign", Confidence::Low),
];

/// An explicit referrer always wins with high confidence; otherwise the
/// query string is searched for click ids, then UTM and generic parameters.
pub fn infer_source(referrer: Option<&str>, query_string: Option<&str>) -> InferredSource {
    if let Some(referrer) = referrer.filter(|r| !r.is_empty()) {
        let host = url::Url::parse(referrer)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));

        return InferredSource {
            source: Some(host.unwrap_or_else(|| referrer.to_string())),
            confidence: Confidence::High,
        };
    }

    let query_string = match query_string.map(|q| q.trim_start_matches('?')) {
        Some(q) if !q.is_empty() => q,
        _ => return InferredSource::unknown(),
    };

    // later duplicates overwrite earlier ones, even when the later value is empty
    let mut params: HashMap<String, String> = url::form_urlencoded::parse(query_string.as_bytes())
        .into_owned()
        .collect();
    params.retain(|_, value| !value.is_empty());

    if let Some((_, label)) = CLICK_ID_PARAMS
        .iter()
        .find(|(param, _)| params.contains_key(*param))
    {
        return InferredSource {
            source: Some(label.to_string()),
            confidence: Confidence::High,
        };
    }

    VALUE_PARAMS
        .iter()
        .find_map(|(param, confidence)| {
            params.get(*param).map(|value| InferredSource {
                source: Some(value.clone()),
                confidence: *confidence,
            })
        })
        .unwrap_or_else(InferredSource::unknown)
}

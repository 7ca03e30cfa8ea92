//! User-agent parsing into device class, browser and operating system.
//!
//! Each facet is an ordered rule table evaluated top to bottom; the first
//! rule that matches wins. Order matters: Chromium-based agents also carry a
//! `Safari/` token and Edge also carries `Chrome/`, and iOS agents mention
//! `like Mac OS X`.

use serde::{Deserialize, Serialize};

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentInfo {
    pub device: DeviceClass,
    pub browser: String,
    pub browser_version: Option<String>,
    pub os: String,
    pub os_version: Option<String>,
}

/// (name, version) produced by a matching rule.
type Detected = (String, Option<String>);

/// Rules receive the lowercased user agent.
type Rule = fn(&str) -> Option<Detected>;

const DEVICE_RULES: &[(&[&str], DeviceClass)] = &[
    (&["mobile", "android", "phone"], DeviceClass::Mobile),
    (&["tablet", "ipad"], DeviceClass::Tablet),
];

const BROWSER_RULES: &[Rule] = &[
    edge,
    chromium,
    safari,
    firefox,
    opera,
    internet_explorer,
    samsung_internet,
    uc_browser,
];

const OS_RULES: &[Rule] = &[windows, ios, macos, android, linux, chrome_os];

const WINDOWS_RELEASES: &[(&str, &str, &str)] = &[
    ("windows nt 10.0", "Windows 10", "10"),
    ("windows nt 6.3", "Windows 8.1", "8.1"),
    ("windows nt 6.2", "Windows 8", "8"),
    ("windows nt 6.1", "Windows 7", "7"),
    ("windows nt 6.0", "Windows Vista", "Vista"),
    ("windows nt 5.1", "Windows XP", "XP"),
];

const LINUX_DISTRIBUTIONS: &[(&str, &str)] = &[
    ("ubuntu", "Ubuntu"),
    ("debian", "Debian"),
    ("fedora", "Fedora"),
    ("centos", "CentOS"),
    ("red hat", "Red Hat"),
];

pub fn parse_user_agent(user_agent: &str) -> UserAgentInfo {
    let ua = user_agent.to_lowercase();

    let device = DEVICE_RULES
        .iter()
        .find(|(markers, _)| markers.iter().any(|m| ua.contains(m)))
        .map(|(_, device)| *device)
        .unwrap_or(DeviceClass::Desktop);

    let (browser, browser_version) = first_match(BROWSER_RULES, &ua);
    let (os, os_version) = first_match(OS_RULES, &ua);

    UserAgentInfo {
        device,
        browser,
        browser_version,
        os,
        os_version,
    }
}

fn first_match(rules: &[Rule], ua: &str) -> Detected {
    rules
        .iter()
        .find_map(|rule| rule(ua))
        .unwrap_or_else(|| (UNKNOWN.to_string(), None))
}

fn detected(name: &str, version: Option<String>) -> Option<Detected> {
    Some((name.to_string(), version))
}

/// Text following any occurrence of `token` that starts with one of `separators`.
fn after_token<'a>(
    ua: &'a str,
    token: &'a str,
    separators: &'a [char],
) -> impl Iterator<Item = &'a str> + 'a {
    ua.match_indices(token).filter_map(move |(idx, _)| {
        let rest = &ua[idx + token.len()..];
        let mut chars = rest.chars();
        match chars.next() {
            Some(c) if separators.contains(&c) => Some(chars.as_str()),
            _ => None,
        }
    })
}

/// Up to `max_parts` numeric components joined by any of `separators`,
/// normalised to dots: `10_15_7` becomes `10.15.7`.
fn numeric_version(text: &str, separators: &[char], max_parts: usize) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    let mut rest = text;

    while parts.len() < max_parts {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            break;
        }
        parts.push(&rest[..digits]);
        rest = &rest[digits..];

        match rest.chars().next() {
            Some(c) if separators.contains(&c) => rest = &rest[c.len_utf8()..],
            _ => break,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

/// Major version following `token/` or `token ` (e.g. `Chrome/110.0.5481` yields `110`).
fn major_version(ua: &str, token: &str) -> Option<String> {
    after_token(ua, token, &['/', ' ']).find_map(|rest| numeric_version(rest, &[], 1))
}

fn edge(ua: &str) -> Option<Detected> {
    let version = major_version(ua, "edg").or_else(|| major_version(ua, "edge"))?;
    detected("Edge", Some(version))
}

fn chromium(ua: &str) -> Option<Detected> {
    let version = major_version(ua, "chrome")?;
    let name = if ua.contains("brave") {
        "Brave"
    } else if ua.contains("vivaldi") {
        "Vivaldi"
    } else {
        "Chrome"
    };
    detected(name, Some(version))
}

fn safari(ua: &str) -> Option<Detected> {
    if !ua.contains("safari") || ua.contains("chrome") {
        return None;
    }
    detected("Safari", major_version(ua, "version"))
}

fn firefox(ua: &str) -> Option<Detected> {
    let version = major_version(ua, "firefox")?;
    detected("Firefox", Some(version))
}

fn opera(ua: &str) -> Option<Detected> {
    let version = major_version(ua, "opr").or_else(|| major_version(ua, "opera"))?;
    detected("Opera", Some(version))
}

fn internet_explorer(ua: &str) -> Option<Detected> {
    if let Some(version) = after_token(ua, "msie", &[' '])
        .find_map(|rest| numeric_version(rest, &[], 1))
    {
        return detected("Internet Explorer", Some(version));
    }

    if ua.contains("trident/") {
        let version = after_token(ua, "rv", &[':']).find_map(|rest| numeric_version(rest, &[], 1))?;
        return detected("Internet Explorer", Some(version));
    }

    None
}

fn samsung_internet(ua: &str) -> Option<Detected> {
    let version = major_version(ua, "samsungbrowser")?;
    detected("Samsung Internet", Some(version))
}

fn uc_browser(ua: &str) -> Option<Detected> {
    let version = major_version(ua, "ucbrowser")?;
    detected("UC Browser", Some(version))
}

fn windows(ua: &str) -> Option<Detected> {
    if let Some((_, name, version)) = WINDOWS_RELEASES
        .iter()
        .find(|(token, _, _)| ua.contains(token))
    {
        return detected(name, Some(version.to_string()));
    }

    if !ua.contains("windows") {
        return None;
    }

    let version = after_token(ua, "windows", &[' ']).find_map(|rest| numeric_version(rest, &['.'], 2));
    detected("Windows", version)
}

fn ios(ua: &str) -> Option<Detected> {
    let version = after_token(ua, "iphone os", &[' '])
        .chain(after_token(ua, "cpu os", &[' ']))
        .find_map(|rest| numeric_version(rest, &['_', '.'], 2))
        .or_else(|| after_token(ua, "ios", &[' ']).find_map(|rest| numeric_version(rest, &['_', '.'], 2)));

    if version.is_some() {
        return detected("iOS", version);
    }

    if ["iphone", "ipad", "ipod"].iter().any(|device| ua.contains(device)) {
        return detected("iOS", None);
    }

    None
}

fn macos(ua: &str) -> Option<Detected> {
    let version = after_token(ua, "mac os x", &[' ']).find_map(|rest| numeric_version(rest, &['_', '.'], 3));

    if version.is_some() || ua.contains("mac os x") || ua.contains("macintosh") {
        return detected("macOS", version);
    }

    None
}

fn android(ua: &str) -> Option<Detected> {
    if !ua.contains("android") {
        return None;
    }
    let version = after_token(ua, "android", &[' ']).find_map(|rest| numeric_version(rest, &['.'], 2));
    detected("Android", version)
}

fn linux(ua: &str) -> Option<Detected> {
    if !ua.contains("linux") {
        return None;
    }
    let name = LINUX_DISTRIBUTIONS
        .iter()
        .find(|(token, _)| ua.contains(token))
        .map(|(_, name)| *name)
        .unwrap_or("Linux");
    detected(name, None)
}

fn chrome_os(ua: &str) -> Option<Detected> {
    if ua.contains("cros") {
        detected("Chrome OS", None)
    } else {
        None
    }
}

//! Human vs. bot classification from the user agent and client IP.

use ipnet::IpNet;
use std::net::IpAddr;

use crate::config::TrackingConfig;

#[derive(Debug, Clone)]
enum IpRule {
    /// Textual prefix of the dotted address, e.g. `66.249.`
    Prefix(String),
    Network(IpNet),
}

impl IpRule {
    fn parse(raw: &str) -> Self {
        match raw.parse::<IpNet>() {
            Ok(net) => IpRule::Network(net),
            Err(_) => IpRule::Prefix(raw.to_string()),
        }
    }

    fn matches(&self, ip: &IpAddr, ip_text: &str) -> bool {
        match self {
            IpRule::Prefix(prefix) => ip_text.starts_with(prefix.as_str()),
            IpRule::Network(net) => net.contains(ip),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotClassifier {
    tokens: Vec<String>,
    ip_rules: Vec<IpRule>,
}

impl BotClassifier {
    pub fn new<T, P>(tokens: T, ip_prefixes: P) -> Self
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let ip_rules = ip_prefixes
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .map(|p| IpRule::parse(&p))
            .collect();

        Self { tokens, ip_rules }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::new(&config.bot_tokens, &config.bot_ip_prefixes)
    }

    /// An empty or `Unknown` user agent cannot be proven a bot, so it is
    /// classified as human without looking at the IP.
    pub fn is_bot(&self, user_agent: &str, ip: Option<IpAddr>) -> bool {
        let user_agent = user_agent.trim();
        if user_agent.is_empty() || user_agent == "Unknown" {
            return false;
        }

        let ua = user_agent.to_lowercase();
        if self.tokens.iter().any(|token| ua.contains(token.as_str())) {
            return true;
        }

        match ip {
            Some(ip) => {
                let ip_text = ip.to_string();
                self.ip_rules.iter().any(|rule| rule.matches(&ip, &ip_text))
            }
            None => false,
        }
    }
}

impl Default for BotClassifier {
    fn default() -> Self {
        Self::from_config(&TrackingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_regular_browser_is_human() {
        let classifier = BotClassifier::default();
        assert!(!classifier.is_bot(CHROME_UA, ip("203.0.113.9")));
    }

    #[test]
    fn test_crawler_tokens() {
        let classifier = BotClassifier::default();
        for ua in [
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
            "facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)",
            "curl/8.4.0",
            "python-requests/2.31.0",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) HeadlessChrome/120.0.0.0 Safari/537.36",
            "WhatsApp/2.23.20.0",
        ] {
            assert!(classifier.is_bot(ua, None), "expected bot: {ua}");
        }
    }

    #[test]
    fn test_token_match_is_case_insensitive() {
        let classifier = BotClassifier::new(["MyCrawler"], Vec::<String>::new());
        assert!(classifier.is_bot("Agent mycrawler/1.0", None));
        assert!(classifier.is_bot("Agent MYCRAWLER/1.0", None));
    }

    #[test]
    fn test_datacenter_prefix() {
        let classifier = BotClassifier::default();
        assert!(classifier.is_bot(CHROME_UA, ip("66.249.66.1")));
        assert!(classifier.is_bot(CHROME_UA, ip("40.77.167.10")));
        assert!(!classifier.is_bot(CHROME_UA, ip("140.77.1.1")));
    }

    #[test]
    fn test_cidr_rule() {
        let classifier = BotClassifier::new(Vec::<String>::new(), ["66.249.64.0/19", "2001:4860::/32"]);
        assert!(classifier.is_bot(CHROME_UA, ip("66.249.70.1")));
        assert!(!classifier.is_bot(CHROME_UA, ip("66.249.100.1")));
        assert!(classifier.is_bot(CHROME_UA, ip("2001:4860:4801::1")));
    }

    #[test]
    fn test_empty_or_unknown_agent_is_human() {
        let classifier = BotClassifier::default();
        assert!(!classifier.is_bot("", ip("66.249.66.1")));
        assert!(!classifier.is_bot("Unknown", ip("66.249.66.1")));
    }
}

//! Client IP extraction from HTTP headers
//!
//! Headers are consulted in priority order (Cloudflare first, then the
//! forwarded-for family). Within a header, the first comma-separated value
//! that parses as an IP address wins. RFC 7239 `for=` elements are accepted
//! wherever a bare address is. When no header yields an address, the socket
//! address is used.

use axum::http::HeaderMap;
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::OnceLock;

const CLIENT_IP_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
];

/// Extract the client IP address from HTTP headers
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_addr` - The socket remote address (fallback)
pub fn extract_client_ip(headers: &HeaderMap, socket_addr: IpAddr) -> IpAddr {
    CLIENT_IP_HEADERS
        .iter()
        .find_map(|name| first_ip_in_header(headers, name))
        .unwrap_or(socket_addr)
}

fn first_ip_in_header(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(parse_candidate)
}

fn parse_candidate(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(ip);
    }

    // Forwarded: for=192.0.2.60;proto=http;by=203.0.113.43
    raw.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("for") {
            return None;
        }
        parse_forwarded_node(value.trim().trim_matches('"'))
    })
}

/// Parse a Forwarded node: `192.0.2.60`, `192.0.2.60:4711`, `[2001:db8::1]:4711`
fn parse_forwarded_node(node: &str) -> Option<IpAddr> {
    if let Some(bracketed) = node.strip_prefix('[') {
        return bracketed.split(']').next()?.parse().ok();
    }

    if let Ok(ip) = node.parse::<IpAddr>() {
        return Some(ip);
    }

    // IPv4 with port
    node.rsplit_once(':')
        .and_then(|(host, _port)| host.parse::<IpAddr>().ok())
}

fn reserved_networks() -> &'static [IpNet] {
    static NETWORKS: OnceLock<Vec<IpNet>> = OnceLock::new();
    NETWORKS.get_or_init(|| {
        [
            "0.0.0.0/8",
            "100.64.0.0/10",
            "192.0.0.0/24",
            "198.18.0.0/15",
            "240.0.0.0/4",
            "fc00::/7",
            "fe80::/10",
            "2001:db8::/32",
        ]
        .iter()
        .filter_map(|net| net.parse().ok())
        .collect()
    })
}

/// Whether an address is worth geolocating: false for private, loopback,
/// link-local, documentation and other reserved ranges.
pub fn is_public_ip(ip: IpAddr) -> bool {
    if reserved_networks().iter().any(|net| net.contains(&ip)) {
        return false;
    }

    match ip {
        IpAddr::V4(addr) => {
            !(addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_broadcast()
                || addr.is_documentation()
                || addr.is_unspecified()
                || addr.is_multicast())
        }
        IpAddr::V6(addr) => {
            if let Some(mapped) = addr.to_ipv4_mapped() {
                return is_public_ip(IpAddr::V4(mapped));
            }
            !(addr.is_loopback() || addr.is_unspecified() || addr.is_multicast())
        }
    }
}

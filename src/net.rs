//! Client address resolution behind trusted proxies.
//!
//! # Responsibilities
//! - Decide whether the connecting peer is a trusted proxy
//! - Resolve the effective client IP from `X-Forwarded-For`
//! - Normalize IPv6-mapped IPv4 addresses to their IPv4 form
//!
//! # Design Decisions
//! - Only loopback, link-local and private ranges are trusted; a forwarded
//!   header from anywhere else is ignored
//! - Normalization keeps the text after the last colon, so `::ffff:1.2.3.4`
//!   becomes `1.2.3.4`

use axum::http::{header::HeaderMap, HeaderName};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

fn is_unicast_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// Whether the connecting peer is allowed to set `X-Forwarded-For`.
///
/// Trusted ranges: loopback, link-local, and private (RFC 1918 / unique local).
pub fn is_trusted_proxy(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_link_local() || v4.is_private(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || is_unique_local(&v6) || is_unicast_link_local(&v6)
        }
    }
}

/// Strip everything up to the last colon so IPv6-mapped IPv4 addresses
/// come out as plain IPv4 text.
pub fn normalize_ip(ip: &str) -> String {
    match ip.rfind(':') {
        Some(idx) => ip[idx + 1..].to_string(),
        None => ip.to_string(),
    }
}

/// Resolve the client IP for a request.
///
/// The first `X-Forwarded-For` entry is honored only when the peer itself is
/// a trusted proxy; otherwise the socket address wins.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    let forwarded = if is_trusted_proxy(peer.ip()) {
        headers
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    } else {
        None
    };

    let raw = forwarded.unwrap_or_else(|| peer.ip().to_string());
    normalize_ip(&raw)
}

/// Resolve the request scheme.
///
/// `X-Forwarded-Proto` is honored only when the peer is a trusted proxy;
/// direct connections are plain HTTP since TLS terminates upstream.
pub fn request_scheme(headers: &HeaderMap, peer: SocketAddr) -> String {
    if is_trusted_proxy(peer.ip()) {
        let forwarded = headers
            .get(&X_FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty());
        if let Some(scheme) = forwarded {
            return scheme;
        }
    }
    "http".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer(addr: &str) -> SocketAddr {
        addr.parse().unwrap()
    }

    #[test]
    fn trusted_ranges() {
        assert!(is_trusted_proxy("127.0.0.1".parse().unwrap()));
        assert!(is_trusted_proxy("10.1.2.3".parse().unwrap()));
        assert!(is_trusted_proxy("192.168.0.7".parse().unwrap()));
        assert!(is_trusted_proxy("169.254.0.1".parse().unwrap()));
        assert!(!is_trusted_proxy("8.8.8.8".parse().unwrap()));
        assert!(is_trusted_proxy("::1".parse().unwrap()));
        assert!(!is_trusted_proxy("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn mapped_ipv4_is_reduced() {
        assert_eq!(normalize_ip("::ffff:10.0.0.1"), "10.0.0.1");
        assert_eq!(normalize_ip("203.0.113.9"), "203.0.113.9");
    }

    #[test]
    fn forwarded_honored_only_from_trusted_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            X_FORWARDED_FOR,
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );

        assert_eq!(client_ip(&headers, peer("127.0.0.1:9000")), "203.0.113.9");
        assert_eq!(client_ip(&headers, peer("8.8.8.8:9000")), "8.8.8.8");
    }

    #[test]
    fn scheme_honored_only_from_trusted_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));

        assert_eq!(request_scheme(&headers, peer("127.0.0.1:9000")), "https");
        assert_eq!(request_scheme(&headers, peer("8.8.8.8:9000")), "http");
        assert_eq!(request_scheme(&HeaderMap::new(), peer("127.0.0.1:9000")), "http");
    }

    #[test]
    fn falls_back_to_peer_without_header() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer("127.0.0.1:9000")), "127.0.0.1");
    }
}

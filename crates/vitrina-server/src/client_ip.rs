//! Client identity resolution behind proxies
//!
//! Forwarded-for headers are only believed when the TCP peer is inside a
//! trusted proxy range; otherwise anyone could spoof their way past the
//! rate limiter. The resolution logic is pure string/CIDR arithmetic so it
//! can be unit-tested without an HTTP stack.

use std::net::{IpAddr, SocketAddr};

use axum::extract::connect_info::ConnectInfo;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};

/// Proxy networks whose forwarded headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedNetworkSet {
    networks: Vec<IpNet>,
}

impl TrustedNetworkSet {
    /// Parses CIDR strings, accepting bare addresses as /32 or /128.
    /// Malformed entries are skipped.
    pub fn parse(cidrs: &[String]) -> Self {
        let networks = cidrs
            .iter()
            .filter_map(|raw| {
                let value = raw.trim();
                if value.is_empty() {
                    return None;
                }
                value.parse::<IpNet>().ok().or_else(|| {
                    value.parse::<IpAddr>().ok().and_then(|ip| match ip {
                        IpAddr::V4(v4) => Ipv4Net::new(v4, 32).ok().map(IpNet::V4),
                        IpAddr::V6(v6) => Ipv6Net::new(v6, 128).ok().map(IpNet::V6),
                    })
                })
            })
            .collect();
        Self { networks }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(&ip))
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    let mut candidate = value.trim();
    if candidate.is_empty() {
        return None;
    }
    // tolerate a comma-joined value in a single-IP header
    if let Some((first, _)) = candidate.split_once(',') {
        candidate = first.trim();
    }
    candidate.parse().ok()
}

/// Best-effort caller IP.
///
/// With proxy-header trust disabled, or an untrusted peer, the peer address
/// wins outright. Behind a trusted proxy the CDN headers take priority,
/// then the `x-forwarded-for` chain is walked from the hop closest to the
/// server towards the client: the first untrusted hop is the true caller.
/// Malformed hops are skipped, never fatal.
pub fn resolve_client_ip(
    peer_ip: Option<&str>,
    headers: &HeaderMap,
    trusted: &TrustedNetworkSet,
    trust_proxy_headers: bool,
) -> String {
    let peer = peer_ip.and_then(parse_ip);
    let peer_is_trusted = peer.map(|ip| trusted.contains(ip)).unwrap_or(false);
    if !trust_proxy_headers || !peer_is_trusted {
        return peer
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
    }

    for name in ["cf-connecting-ip", "true-client-ip"] {
        if let Some(ip) = header_str(headers, name).and_then(parse_ip) {
            return ip.to_string();
        }
    }

    let forwarded: Vec<IpAddr> = header_str(headers, "x-forwarded-for")
        .map(|raw| raw.split(',').filter_map(parse_ip).collect())
        .unwrap_or_default();
    if !forwarded.is_empty() {
        let mut chain = forwarded.clone();
        if let Some(peer) = peer {
            chain.push(peer);
        }
        for hop in chain.iter().rev() {
            if !trusted.contains(*hop) {
                return hop.to_string();
            }
        }
        // every hop trusted: fall back to the oldest one
        return forwarded[0].to_string();
    }

    if let Some(ip) = header_str(headers, "x-real-ip").and_then(parse_ip) {
        return ip.to_string();
    }

    peer.map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Peer socket address, when the server was started with connect-info.
/// Absent under test harnesses driving the router directly.
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for PeerAddr
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        ))
    }
}

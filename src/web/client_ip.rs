//! Client address resolution for the access log.

use std::net::IpAddr;

use axum::http::HeaderMap;

/// Resolve the originating client address for a request.
///
/// Order of preference: the first entry of `X-Forwarded-For` (the service
/// sits behind a reverse proxy in production), then `X-Real-IP`, then the
/// transport-level peer address. Returns `None` when nothing resolves —
/// a client error, not a server fault.
#[must_use]
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return Some(ip);
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if let Ok(ip) = real_ip.trim().parse() {
            return Some(ip);
        }
    }

    peer
}

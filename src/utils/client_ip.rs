use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use std::net::SocketAddr;

/// Extract client IP from headers (supports one trusted proxy hop)
///
/// Only the rightmost `X-Forwarded-For` entry is used: it is the one appended
/// by the proxy in front of us. Anything to its left came from the client.
pub fn from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(ip) = val.rsplit(',').map(str::trim).find(|ip| !ip.is_empty())
    {
        return Some(ip.to_string());
    }
    // Check X-Real-IP
    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(val) = real_ip.to_str()
        && !val.trim().is_empty()
    {
        return Some(val.trim().to_string());
    }
    None
}

/// Resolves the address used as the rate-limit and logging key for a request.
///
/// Proxy headers are only honoured when `trust_proxy` is set; otherwise the
/// socket peer address is used. Falls back to "unknown" when neither exists.
pub fn client_ip<B>(req: &Request<B>, trust_proxy: bool) -> String {
    if trust_proxy && let Some(ip) = from_headers(req.headers()) {
        return ip;
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_forwarded_for_takes_proxy_appended_hop() {
        let req = Request::builder()
            .header("x-forwarded-for", "10.0.0.1, 203.0.113.7")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req, true), "203.0.113.7");

        // A spoofed leading entry does not change the key.
        let spoofed = Request::builder()
            .header("x-forwarded-for", "198.51.100.99, 203.0.113.7")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&spoofed, true), "203.0.113.7");

        let trailing_comma = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&trailing_comma, true), "203.0.113.7");
    }

    #[test]
    fn test_proxy_headers_ignored_when_untrusted() {
        let req = Request::builder()
            .header("x-real-ip", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req, false), "unknown");
        assert_eq!(client_ip(&req, true), "203.0.113.9");
    }

    #[test]
    fn test_connect_info_fallback() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_ip(&req, true), "192.0.2.1");
    }
}

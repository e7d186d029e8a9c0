//! Request inspection.
//!
//! Builds the `RequestContext` from edge-supplied headers and buffers the
//! body so it can be scanned and then replayed to the origin unchanged.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, HeaderMap};
use futures_util::StreamExt;
use uuid::Uuid;

use crate::config::SignalHeadersConfig;
use crate::decision::{RequestContext, SignalFallback};
use crate::error::GatewayError;
use crate::security::geo::normalize_country_code;

pub const X_REQUEST_ID: &str = "x-request-id";

pub fn extract_context(
    parts: &Parts,
    peer: Option<SocketAddr>,
    signals: &SignalHeadersConfig,
) -> RequestContext {
    let headers = &parts.headers;
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut ctx = RequestContext::new(parts.method.as_str(), target, client_address(headers, signals, peer));
    ctx.request_id = header_str(headers, X_REQUEST_ID).unwrap_or("unknown").to_string();
    ctx.principal = principal_from_headers(headers);

    if let Some(raw) = header_str(headers, &signals.country) {
        match normalize_country_code(raw) {
            Some(code) => ctx.country = Some(code),
            None => ctx.fallbacks.push(SignalFallback::MalformedCountry(raw.to_string())),
        }
    }

    match header_str(headers, &signals.bot_score) {
        None => ctx.fallbacks.push(SignalFallback::MissingBotScore),
        Some(raw) => match raw.trim().parse::<u8>() {
            Ok(score) if score <= 100 => ctx.bot_score = Some(score),
            _ => ctx.fallbacks.push(SignalFallback::MalformedBotScore(raw.to_string())),
        },
    }

    ctx.verified_bot = header_str(headers, &signals.verified_bot)
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        })
        .unwrap_or(false);

    ctx
}

/// Client-address header, then the first forwarded-for hop, then the
/// socket peer.
pub fn client_address(
    headers: &HeaderMap,
    signals: &SignalHeadersConfig,
    peer: Option<SocketAddr>,
) -> IpAddr {
    if let Some(ip) = header_str(headers, &signals.client_ip).and_then(|v| v.trim().parse().ok()) {
        return ip;
    }

    let forwarded = header_str(headers, &signals.forwarded_for)
        .and_then(|chain| chain.split(',').next())
        .and_then(|first| first.trim().parse().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    peer.map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Opaque principal id derived from a bearer token. The token itself is
/// never stored.
pub fn principal_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, header::AUTHORIZATION.as_str())?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(Uuid::new_v5(&Uuid::NAMESPACE_OID, token.as_bytes()).to_string())
}

/// Buffer the body up to `limit` bytes.
pub async fn read_body(body: Body, headers: &HeaderMap, limit: usize) -> Result<Bytes, GatewayError> {
    let declared = header_str(headers, header::CONTENT_LENGTH.as_str())
        .and_then(|v| v.trim().parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(GatewayError::PayloadTooLarge { limit });
    }

    let mut buf = Vec::with_capacity(declared.unwrap_or(0));
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| GatewayError::UnreadableBody(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(GatewayError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn request_parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    fn signals() -> SignalHeadersConfig {
        SignalHeadersConfig::default()
    }

    #[test]
    fn test_client_address_precedence() {
        let peer: SocketAddr = "9.9.9.9:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_address(&headers, &signals(), Some(peer)), "9.9.9.9".parse::<IpAddr>().unwrap());

        headers.insert("x-forwarded-for", "5.6.7.8, 10.0.0.1".parse().unwrap());
        assert_eq!(client_address(&headers, &signals(), Some(peer)), "5.6.7.8".parse::<IpAddr>().unwrap());

        headers.insert("cf-connecting-ip", "1.2.3.4".parse().unwrap());
        assert_eq!(client_address(&headers, &signals(), Some(peer)), "1.2.3.4".parse::<IpAddr>().unwrap());

        headers.insert("cf-connecting-ip", "garbage".parse().unwrap());
        assert_eq!(client_address(&headers, &signals(), None), "5.6.7.8".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_principal_is_stable_and_opaque() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer secret-token".parse().unwrap());
        let a = principal_from_headers(&headers).unwrap();
        let b = principal_from_headers(&headers).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains("secret-token"));

        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwdw==".parse().unwrap());
        assert_eq!(principal_from_headers(&headers), None);
    }

    #[test]
    fn test_extract_signals() {
        let parts = request_parts(
            Request::post("/api/auth/login?next=%2F")
                .header("cf-ipcountry", "us")
                .header("cf-bot-score", "90")
                .header("cf-verified-bot", "true")
                .header("x-request-id", "req-1"),
        );
        let ctx = extract_context(&parts, None, &signals());

        assert_eq!(ctx.path, "/api/auth/login");
        assert_eq!(ctx.target, "/api/auth/login?next=%2F");
        assert_eq!(ctx.method, "POST");
        assert_eq!(ctx.country.as_deref(), Some("US"));
        assert_eq!(ctx.bot_score, Some(90));
        assert!(ctx.verified_bot);
        assert_eq!(ctx.request_id, "req-1");
        assert!(ctx.fallbacks.is_empty());
    }

    #[test]
    fn test_malformed_signals_fall_back() {
        let parts = request_parts(
            Request::get("/")
                .header("cf-ipcountry", "T1X")
                .header("cf-bot-score", "250"),
        );
        let ctx = extract_context(&parts, None, &signals());

        assert_eq!(ctx.country, None);
        assert_eq!(ctx.bot_score, None);
        assert_eq!(
            ctx.fallbacks,
            vec![
                SignalFallback::MalformedCountry("T1X".to_string()),
                SignalFallback::MalformedBotScore("250".to_string()),
            ]
        );

        let ctx = extract_context(&request_parts(Request::get("/")), None, &signals());
        assert_eq!(ctx.fallbacks, vec![SignalFallback::MissingBotScore]);
    }

    #[tokio::test]
    async fn test_read_body_limits() {
        let mut headers = HeaderMap::new();
        let body = read_body(Body::from("hello"), &headers, 16).await.unwrap();
        assert_eq!(&body[..], b"hello");

        let err = read_body(Body::from("0123456789"), &headers, 4).await.unwrap_err();
        assert!(matches!(err, GatewayError::PayloadTooLarge { limit: 4 }));

        headers.insert(header::CONTENT_LENGTH, "1000".parse().unwrap());
        let err = read_body(Body::empty(), &headers, 16).await.unwrap_err();
        assert!(matches!(err, GatewayError::PayloadTooLarge { .. }));
    }
}

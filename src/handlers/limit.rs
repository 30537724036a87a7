use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap, HeaderName, HeaderValue};
use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use tracing::{info, warn};
use crate::metrics::{LIMITER_FAIL_OPEN, RATE_LIMITED_TOTAL};
use crate::rate_limit::{RateLimitConfig, RateLimitDecision};
use crate::state::AppState;

pub enum Admission {
    /// `None` when the limiter was unavailable and the request got through anyway.
    Admitted(Option<RateLimitDecision>),
    Rejected(RateLimitDecision),
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Short stable digest of a client address, safe to put in logs.
pub fn fingerprint(ip: &str) -> String {
    let digest = Sha256::digest(ip.as_bytes());
    format!("{:x}", digest)[..12].to_string()
}

/// Count the request against `"{ip}:{route}"`. A limiter fault admits the
/// request rather than blocking real users.
pub fn admit(state: &AppState, ip: &str, route: &str, config: &RateLimitConfig) -> Admission {
    let key = format!("{ip}:{route}");
    match state.limiter.limit(&key, config) {
        Ok(decision) if decision.success => Admission::Admitted(Some(decision)),
        Ok(decision) => {
            RATE_LIMITED_TOTAL.with_label_values(&[route]).inc();
            info!(
                client = %fingerprint(ip),
                route,
                reset = %decision.reset,
                "rate limit exceeded"
            );
            Admission::Rejected(decision)
        }
        Err(e) => {
            LIMITER_FAIL_OPEN.inc();
            warn!(route, error = %e, "rate limiter unavailable, admitting request");
            Admission::Admitted(None)
        }
    }
}

/// `X-RateLimit-*` headers for a decision.
pub fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let reset = decision.reset.to_rfc3339_opts(SecondsFormat::Millis, true);
    for (name, value) in [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", reset),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    headers
}

/// Whole seconds until the window resets, rounded up and never zero.
pub fn retry_after_secs(decision: &RateLimitDecision) -> u64 {
    let wait = decision.retry_after(Utc::now());
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

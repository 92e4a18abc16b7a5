//! Per-client rate limiting.
//!
//! Limits are process-local and keyed by `client-ip:path`, so each endpoint
//! has its own budget per client. Every tier is a GCRA limiter from
//! `governor` that refills `max_requests` evenly over `window_secs`.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

use crate::config::{RateLimitConfig, RateTier};
use crate::error::ApiError;

/// Keys tracked before idle entries are pruned.
const MAX_TRACKED_KEYS: usize = 10_000;

/// Decides whether a request identified by `key` may proceed.
pub trait RateLimiter: Send + Sync {
    /// `Err` carries the seconds until the next request would be allowed.
    fn check(&self, key: &str) -> Result<(), u64>;

    /// Requests allowed per window, reported in `X-RateLimit-Limit`.
    fn limit(&self) -> u32;
}

pub struct GovernorRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
    max_requests: u32,
}

impl GovernorRateLimiter {
    pub fn new(tier: RateTier) -> Self {
        let max_requests = NonZeroU32::new(tier.max_requests).unwrap_or(NonZeroU32::MIN);
        let window = Duration::from_secs(tier.window_secs.max(1));
        let period = (window / max_requests.get()).max(Duration::from_nanos(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(max_requests))
            .allow_burst(max_requests);

        Self {
            limiter: DefaultKeyedRateLimiter::keyed(quota),
            clock: DefaultClock::default(),
            max_requests: max_requests.get(),
        }
    }
}

impl RateLimiter for GovernorRateLimiter {
    fn check(&self, key: &str) -> Result<(), u64> {
        if self.limiter.len() > MAX_TRACKED_KEYS {
            self.limiter.retain_recent();
        }

        self.limiter.check_key(&key.to_string()).map_err(|not_until| {
            not_until
                .wait_time_from(self.clock.now())
                .as_secs()
                .max(1)
        })
    }

    fn limit(&self) -> u32 {
        self.max_requests
    }
}

impl std::fmt::Debug for GovernorRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorRateLimiter")
            .field("max_requests", &self.max_requests)
            .field("tracked_keys", &self.limiter.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitTier {
    Auth,
    Api,
    Ingestion,
    Admin,
}

/// One limiter per tier; all `None` when rate limiting is disabled.
#[derive(Clone, Default)]
pub struct RateLimiters {
    pub auth: Option<Arc<dyn RateLimiter>>,
    pub api: Option<Arc<dyn RateLimiter>>,
    pub ingestion: Option<Arc<dyn RateLimiter>>,
    pub admin: Option<Arc<dyn RateLimiter>>,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::default();
        }

        let build = |tier: RateTier| -> Option<Arc<dyn RateLimiter>> {
            Some(Arc::new(GovernorRateLimiter::new(tier)))
        };
        Self {
            auth: build(config.auth),
            api: build(config.api),
            ingestion: build(config.ingestion),
            admin: build(config.admin),
        }
    }

    pub fn tier(&self, tier: RateLimitTier) -> Option<Arc<dyn RateLimiter>> {
        match tier {
            RateLimitTier::Auth => self.auth.clone(),
            RateLimitTier::Api => self.api.clone(),
            RateLimitTier::Ingestion => self.ingestion.clone(),
            RateLimitTier::Admin => self.admin.clone(),
        }
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, else `unknown`.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or("unknown")
        .to_string()
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<dyn RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = format!("{}:{}", client_ip(req.headers()), req.uri().path());

    if let Err(retry_after) = limiter.check(&key) {
        tracing::warn!(key = %key, retry_after, "Rate limit exceeded");
        return ApiError::RateLimited {
            limit: limiter.limit(),
            retry_after,
        }
        .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn tier(max_requests: u32, window_secs: u64) -> RateTier {
        RateTier {
            max_requests,
            window_secs,
        }
    }

    #[test]
    fn test_allows_up_to_limit_then_rejects() {
        let limiter = GovernorRateLimiter::new(tier(3, 60));
        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4:/api/v1/sync").is_ok());
        }

        let retry_after = limiter.check("1.2.3.4:/api/v1/sync").unwrap_err();
        assert!(retry_after >= 1);
        assert!(retry_after <= 20);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = GovernorRateLimiter::new(tier(1, 900));
        assert!(limiter.check("1.2.3.4:/a").is_ok());
        assert!(limiter.check("1.2.3.4:/a").is_err());
        assert!(limiter.check("1.2.3.4:/b").is_ok());
        assert!(limiter.check("5.6.7.8:/a").is_ok());
    }

    #[test]
    fn test_zero_limit_treated_as_one() {
        let limiter = GovernorRateLimiter::new(tier(0, 60));
        assert_eq!(limiter.limit(), 1);
        assert!(limiter.check("k").is_ok());
        assert!(limiter.check("k").is_err());
    }

    #[test]
    fn test_disabled_config_has_no_limiters() {
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        let limiters = RateLimiters::from_config(&config);
        assert!(limiters.tier(RateLimitTier::Auth).is_none());
        assert!(limiters.tier(RateLimitTier::Ingestion).is_none());
    }

    #[test]
    fn test_enabled_config_uses_tier_limits() {
        let limiters = RateLimiters::from_config(&RateLimitConfig::default());
        assert_eq!(limiters.tier(RateLimitTier::Auth).unwrap().limit(), 5);
        assert_eq!(limiters.tier(RateLimitTier::Api).unwrap().limit(), 60);
        assert_eq!(limiters.tier(RateLimitTier::Ingestion).unwrap().limit(), 1000);
        assert_eq!(limiters.tier(RateLimitTier::Admin).unwrap().limit(), 10);
    }

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers), "10.0.0.9");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn test_empty_forwarded_for_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers), "10.0.0.9");
    }
}

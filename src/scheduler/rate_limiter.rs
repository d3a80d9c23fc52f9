//! Per-domain token bucket rate limiter.
//!
//! Every remote host gets its own bucket holding up to `burst_size` tokens,
//! refilled continuously at `requests_per_minute / 60` tokens per second.
//! [`DomainRateLimiter::acquire`] never blocks: it either takes a token or
//! reports how long until one will be available, and the caller decides how
//! to reschedule.
//!
//! Buckets live in a sharded [`DashMap`], so the refill-and-take sequence for
//! one domain is atomic under its shard lock while unrelated domains proceed
//! in parallel. [`DomainRateLimiter::evict_idle`] drops buckets that have sat
//! idle long enough to have refilled completely.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Idle buckets are kept for this many full-refill periods.
const RETENTION_REFILL_PERIODS: u32 = 5;
/// Lower bound on how long an idle bucket is kept.
const MIN_RETENTION: Duration = Duration::from_secs(60);

/// Construction parameters for [`DomainRateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained refill rate per domain.
    pub requests_per_minute: u32,
    /// Bucket capacity, i.e. how many requests may go out back-to-back.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            burst_size: 5,
        }
    }
}

impl RateLimitConfig {
    fn tokens_per_sec(&self) -> f64 {
        f64::from(self.requests_per_minute.max(1)) / 60.0
    }

    fn capacity(&self) -> f64 {
        f64::from(self.burst_size.max(1))
    }

    /// How long an empty bucket takes to refill completely.
    pub fn full_refill_period(&self) -> Duration {
        Duration::from_secs_f64(self.capacity() * 60.0 / f64::from(self.requests_per_minute.max(1)))
    }

    /// How long an untouched bucket is retained before eviction.
    pub fn idle_retention(&self) -> Duration {
        (self.full_refill_period() * RETENTION_REFILL_PERIODS).max(MIN_RETENTION)
    }
}

/// Result of a non-blocking [`DomainRateLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    /// A token was taken; the request may go out now.
    Granted,
    /// No token available; at least one will be after `retry_after`.
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, RateDecision::Granted)
    }
}

#[derive(Debug, Clone)]
struct DomainBucket {
    tokens: f64,
    last_refill: Instant,
}

impl DomainBucket {
    fn full(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity(),
            last_refill: now,
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * config.tokens_per_sec()).min(config.capacity());
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    fn try_take(&mut self, config: &RateLimitConfig, now: Instant) -> RateDecision {
        self.refill(config, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateDecision::Granted
        } else {
            let missing = 1.0 - self.tokens;
            RateDecision::Denied {
                retry_after: Duration::from_secs_f64(missing / config.tokens_per_sec()),
            }
        }
    }
}

/// Shared per-domain rate limiter.
#[derive(Debug)]
pub struct DomainRateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, DomainBucket>,
}

impl DomainRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Try to take one request token for `domain`.
    ///
    /// The domain is normalized (lowercased, trailing dot removed) so callers
    /// may pass a raw host.
    pub fn acquire(&self, domain: &str) -> RateDecision {
        self.acquire_at(domain, Instant::now())
    }

    pub(crate) fn acquire_at(&self, domain: &str, now: Instant) -> RateDecision {
        let key = normalize_host(domain);
        let mut bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| DomainBucket::full(&self.config, now));
        bucket.try_take(&self.config, now)
    }

    /// Remove buckets idle for longer than the retention window.
    ///
    /// Returns the number of evicted domains. Locks one shard at a time.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub(crate) fn evict_idle_at(&self, now: Instant) -> usize {
        let retention = self.config.idle_retention();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < retention);
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(
                evicted = evicted,
                remaining = self.buckets.len(),
                "Evicted idle domain buckets"
            );
        }
        evicted
    }

    /// Number of domains currently holding a bucket.
    pub fn tracked_domains(&self) -> usize {
        self.buckets.len()
    }
}

/// Extract the rate-limiting key from a feed URL.
///
/// Case-insensitive host with the port stripped; `None` when the URL does not
/// parse or has no host.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = normalize_host(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim();
    // A bare "host:port" may be handed in directly
    let host = match host.rsplit_once(':') {
        Some((name, port))
            if (!name.contains(':') || name.ends_with(']'))
                && !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            name
        }
        _ => host,
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limiter(requests_per_minute: u32, burst_size: u32) -> DomainRateLimiter {
        DomainRateLimiter::new(RateLimitConfig {
            requests_per_minute,
            burst_size,
        })
    }

    #[test]
    fn test_back_to_back_on_burst_one_denies_with_one_second_hint() {
        let limiter = limiter(60, 1);
        let now = Instant::now();

        assert_eq!(limiter.acquire_at("example.com", now), RateDecision::Granted);
        match limiter.acquire_at("example.com", now + Duration::from_millis(10)) {
            RateDecision::Denied { retry_after } => {
                let secs = retry_after.as_secs_f64();
                assert!((0.95..=1.0).contains(&secs), "retry_after was {secs}");
            }
            other => panic!("Expected Denied, got {:?}", other),
        }
    }

    #[test]
    fn test_refill_grants_again_after_wait_hint() {
        let limiter = limiter(60, 1);
        let now = Instant::now();

        assert!(limiter.acquire_at("example.com", now).is_granted());
        let RateDecision::Denied { retry_after } = limiter.acquire_at("example.com", now) else {
            panic!("second acquire should be denied");
        };
        assert!(limiter.acquire_at("example.com", now + retry_after).is_granted());
    }

    #[test]
    fn test_burst_is_capped() {
        let limiter = limiter(60, 3);
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.acquire_at("example.com", now).is_granted());
        }
        assert!(!limiter.acquire_at("example.com", now).is_granted());

        // An hour of idleness still only refills up to the burst size
        let later = now + Duration::from_secs(3600);
        for _ in 0..3 {
            assert!(limiter.acquire_at("example.com", later).is_granted());
        }
        assert!(!limiter.acquire_at("example.com", later).is_granted());
    }

    #[test]
    fn test_domains_are_independent() {
        let limiter = limiter(60, 1);
        let now = Instant::now();

        assert!(limiter.acquire_at("a.example", now).is_granted());
        assert!(!limiter.acquire_at("a.example", now).is_granted());
        assert!(limiter.acquire_at("b.example", now).is_granted());
    }

    #[test]
    fn test_domain_keys_are_normalized() {
        let limiter = limiter(60, 1);
        let now = Instant::now();

        assert!(limiter.acquire_at("Example.COM", now).is_granted());
        assert!(!limiter.acquire_at("example.com:8080", now).is_granted());
        assert!(!limiter.acquire_at("example.com.", now).is_granted());
        assert_eq!(limiter.tracked_domains(), 1);

        assert!(limiter.acquire_at("[::1]:9000", now).is_granted());
        assert!(!limiter.acquire_at("[::1]", now).is_granted());
    }

    #[test]
    fn test_domain_of_url() {
        assert_eq!(
            domain_of("https://Blog.Example.com:8443/feed.xml").as_deref(),
            Some("blog.example.com")
        );
        assert_eq!(
            domain_of("http://127.0.0.1:9000/rss").as_deref(),
            Some("127.0.0.1")
        );
        assert_eq!(domain_of("http://[::1]:9000/rss").as_deref(), Some("[::1]"));
        assert_eq!(domain_of("not a url"), None);
        assert_eq!(domain_of("mailto:someone@example.com"), None);
    }

    #[test]
    fn test_evict_idle_removes_only_stale_buckets() {
        let limiter = limiter(60, 1);
        let now = Instant::now();
        let retention = limiter.config().idle_retention();

        limiter.acquire_at("old.example", now);
        limiter.acquire_at("fresh.example", now + retention);

        let evicted = limiter.evict_idle_at(now + retention + Duration::from_secs(1));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_domains(), 1);
    }

    #[test]
    fn test_retention_covers_full_refill() {
        let config = RateLimitConfig {
            requests_per_minute: 1,
            burst_size: 10,
        };
        assert_eq!(config.full_refill_period(), Duration::from_secs(600));
        assert!(config.idle_retention() >= config.full_refill_period());
        assert_eq!(RateLimitConfig::default().idle_retention(), Duration::from_secs(60));
    }

    proptest! {
        #[test]
        fn prop_grants_in_any_minute_bounded(
            rpm in 1u32..240,
            burst in 1u32..20,
            gaps_ms in proptest::collection::vec(0u64..3_000, 1..400),
        ) {
            let limiter = limiter(rpm, burst);
            let start = Instant::now();
            let mut at = start;
            let mut grants = Vec::new();

            for gap in gaps_ms {
                at += Duration::from_millis(gap);
                if limiter.acquire_at("example.com", at).is_granted() {
                    grants.push(at);
                }
            }

            let window = Duration::from_secs(60);
            let bound = (rpm + burst) as usize;
            for (i, first) in grants.iter().enumerate() {
                let in_window = grants[i..]
                    .iter()
                    .take_while(|t| t.duration_since(*first) < window)
                    .count();
                prop_assert!(in_window <= bound, "{} grants in one window, bound {}", in_window, bound);
            }
        }
    }
}

//! Fixed-window rate limiting keyed by client identity.
//!
//! Each key owns a counter and the instant its window closes. The first
//! request of a window (or the first request at or after the previous
//! window's close) starts a fresh window with `count = 1`; every other
//! request increments the counter, including requests that are rejected.
//! Across a window boundary up to twice the ceiling can be admitted.

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderValue, Response},
};
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use std::{net::IpAddr, net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::utils::clock::SharedClock;

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

pub type SharedRateLimiter = Arc<RateLimiter>;

/// Ceiling and window length of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub ceiling: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            ceiling: 5,
            window_seconds: 15 * 60,
        }
    }
}

/// Window state for one client key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

/// Outcome of a single [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub count: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window closes, never less than one.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }

    /// Write the limit/remaining/reset metadata headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(self.remaining));
        headers.insert(
            RATE_LIMIT_RESET_HEADER,
            HeaderValue::from(self.reset_at.timestamp()),
        );
    }
}

pub struct RateLimiter {
    policy: RateLimitPolicy,
    window: Duration,
    entries: DashMap<String, RateLimitEntry>,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: SharedClock) -> Self {
        let policy = RateLimitPolicy {
            ceiling: policy.ceiling.max(1),
            window_seconds: policy.window_seconds.max(1),
        };
        let window = Duration::seconds(i64::try_from(policy.window_seconds).unwrap_or(i64::MAX / 1000));

        Self {
            policy,
            window,
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn shared(policy: RateLimitPolicy, clock: SharedClock) -> SharedRateLimiter {
        Arc::new(Self::new(policy, clock))
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Count one attempt for `key` and decide whether it is admitted.
    ///
    /// The entry is held through the DashMap shard lock for the whole
    /// read-modify-write, so concurrent checks on one key never lose an
    /// increment.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();

        let entry = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                if now >= state.window_reset_at {
                    state.count = 1;
                    state.window_reset_at = now + self.window;
                } else {
                    state.count = state.count.saturating_add(1);
                }
                *state
            }
            Entry::Vacant(vacant) => *vacant.insert(RateLimitEntry {
                count: 1,
                window_reset_at: now + self.window,
            }),
        };

        RateLimitDecision {
            allowed: entry.count <= self.policy.ceiling,
            limit: self.policy.ceiling,
            count: entry.count,
            remaining: self.policy.ceiling.saturating_sub(entry.count),
            reset_at: entry.window_reset_at,
        }
    }

    /// Current window state for `key`, if any.
    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| *e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose window has closed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.window_reset_at);
        before.saturating_sub(self.entries.len())
    }

    /// Run [`RateLimiter::sweep`] every `every` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: std::time::Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Rate limit sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = self.len(), "Swept rate limit entries");
                        }
                    }
                }
            }
        })
    }
}

/// Proxy addresses whose `X-Forwarded-For` header is believed. Installed
/// as a request extension; without it every forwarded header is ignored.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Arc<Vec<IpAddr>>);

impl TrustedProxies {
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self(Arc::new(proxies))
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }
}

/// Client identity used as the rate-limit key: the peer address, unless the
/// peer is a trusted proxy, in which case the nearest untrusted
/// `X-Forwarded-For` hop.
pub fn client_ip(headers: &HeaderMap, extensions: &axum::http::Extensions) -> Option<IpAddr> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())?;

    let Some(trusted) = extensions.get::<TrustedProxies>() else {
        return Some(peer);
    };
    if !trusted.contains(&peer) {
        return Some(peer);
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|chain| {
            chain
                .rsplit(',')
                .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
                .find(|hop| !trusted.contains(hop))
        });

    Some(forwarded.unwrap_or(peer))
}

/// [`client_ip`] for a full request.
pub fn request_client_ip(request: &Request) -> Option<IpAddr> {
    client_ip(request.headers(), request.extensions())
}

/// Attach rate-limit metadata to an outgoing response.
pub fn with_rate_limit_headers<B>(
    mut response: Response<B>,
    decision: &RateLimitDecision,
) -> Response<B> {
    decision.apply_headers(response.headers_mut());
    response
}

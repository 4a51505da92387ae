//! Per-client admission control using token buckets
//!
//! The [`AdmissionRegistry`] owns one [`VisitorEntry`] per client key. Lookup,
//! creation, refill and spend all happen while holding the DashMap shard lock
//! for that key, so concurrent requests from the same client can never
//! double-spend a token. Entries are reclaimed by a deferred task scheduled
//! when the entry is created.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::NotesError;

/// Key shared by requests that arrive without peer address information
pub const UNKNOWN_CLIENT: &str = "unknown";

/// When a visitor entry is dropped from the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Drop the entry a fixed window after it was created, even if the
    /// client is still sending traffic. Its next request starts a full bucket.
    #[default]
    SinceCreation,
    /// Drop the entry once the client has been silent for the whole window.
    SinceLastUse,
}

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Steady-state tokens added per second
    pub rate_per_sec: f64,
    /// Bucket capacity
    pub burst: u32,
    /// Window used by the eviction policy
    pub idle_window: Duration,
    pub eviction: EvictionPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 5.0,
            burst: 10,
            idle_window: Duration::from_secs(300),
            eviction: EvictionPolicy::SinceCreation,
        }
    }
}

/// Token bucket state for one client key
#[derive(Debug, Clone)]
struct VisitorEntry {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
    rate: f64,
    burst: f64,
    generation: u64,
}

impl VisitorEntry {
    fn new(rate: f64, burst: f64, now: Instant, generation: u64) -> Self {
        Self {
            tokens: burst,
            last_refill: now,
            last_seen: now,
            rate,
            burst,
            generation,
        }
    }

    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last_refill = now;
    }

    fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.last_seen = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn retry_after(&self) -> Duration {
        if self.tokens >= 1.0 || self.rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64((1.0 - self.tokens) / self.rate).unwrap_or(Duration::MAX)
    }
}

/// Process-wide registry of per-client token buckets
pub struct AdmissionRegistry {
    config: RateLimitConfig,
    visitors: Arc<DashMap<String, VisitorEntry>>,
    generations: AtomicU64,
}

impl AdmissionRegistry {
    /// Create an empty registry
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            visitors: Arc::new(DashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    /// Decide whether a request from `key` may proceed, spending one token if so.
    pub fn admit(&self, key: &str) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let mut created = None;

        let outcome = {
            let mut entry = self.visitors.entry(key.to_string()).or_insert_with(|| {
                let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                created = Some(generation);
                VisitorEntry::new(self.config.rate_per_sec, f64::from(self.config.burst), now, generation)
            });

            if entry.try_take(now) {
                Ok(())
            } else {
                Err(RateLimitError::LimitExceeded {
                    retry_after: entry.retry_after(),
                    burst: self.config.burst,
                })
            }
        };

        if let Some(generation) = created {
            debug!("New visitor tracked: {}", key);
            self.schedule_eviction(key.to_string(), generation);
        }

        outcome
    }

    /// Tokens currently available to `key`, without refilling
    pub fn available_tokens(&self, key: &str) -> Option<f64> {
        self.visitors.get(key).map(|entry| entry.tokens)
    }

    /// Number of tracked clients
    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn schedule_eviction(&self, key: String, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available; visitor {} will not be evicted", key);
            return;
        };

        handle.spawn(evict_visitor(
            Arc::downgrade(&self.visitors),
            key,
            generation,
            self.config.idle_window,
            self.config.eviction,
        ));
    }
}

/// Deferred removal of a single visitor entry.
///
/// The generation check keeps an old timer from removing an entry that was
/// recreated after an earlier eviction.
async fn evict_visitor(
    visitors: Weak<DashMap<String, VisitorEntry>>,
    key: String,
    generation: u64,
    window: Duration,
    policy: EvictionPolicy,
) {
    let mut wake_at = Instant::now() + window;

    loop {
        tokio::time::sleep_until(wake_at).await;

        let Some(visitors) = visitors.upgrade() else {
            return;
        };

        let mut still_active_until = None;
        let removed = visitors.remove_if(&key, |_, entry| {
            if entry.generation != generation {
                return false;
            }
            match policy {
                EvictionPolicy::SinceCreation => true,
                EvictionPolicy::SinceLastUse => {
                    let idle_deadline = entry.last_seen + window;
                    if idle_deadline <= Instant::now() {
                        true
                    } else {
                        still_active_until = Some(idle_deadline);
                        false
                    }
                }
            }
        });

        if removed.is_some() {
            debug!("Evicted visitor: {}", key);
            return;
        }

        match still_active_until {
            Some(next) => wake_at = next,
            None => return,
        }
    }
}

/// Rate limit error
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded. Retry after {retry_after:?}. Burst: {burst} requests")]
    LimitExceeded { retry_after: Duration, burst: u32 },
}

/// Registry key for a request: the peer IP address, without the port.
///
/// Clients behind the same NAT share one budget, and opening a new
/// connection does not earn a fresh burst.
pub fn client_key<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Rate Gate: rejects a request before any further work once its client
/// has run out of tokens
pub async fn rate_limit_middleware(
    State(registry): State<Arc<AdmissionRegistry>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&req);

    match registry.admit(&key) {
        Ok(()) => next.run(req).await,
        Err(err) => {
            warn!("Rate limit exceeded for {}: {}", key, err);
            NotesError::from(err).into_response()
        }
    }
}

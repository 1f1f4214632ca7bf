//! Per-client token-bucket rate limiting with idle eviction.

use std::collections::HashMap;
use std::hash::Hash;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::RateLimitConfig;
use crate::error::Error;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Absorbs rounding in `elapsed * rate` so a client that waits exactly
/// `1 / rate` seconds is credited a whole token.
const TOKEN_EPSILON: f64 = 1e-6;

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = self.last_refill.max(now);

        if self.tokens + TOKEN_EPSILON >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Token-bucket budget per client key, typically the caller's IP address.
///
/// Buckets are created on first sight of a key and dropped by [`sweep`]
/// once the key has been idle past the configured deadline. Every access to
/// the client map holds one mutex for an O(1) section and never across I/O.
///
/// [`sweep`]: ClientLimiterRegistry::sweep
pub struct ClientLimiterRegistry<K = IpAddr> {
    clients: Mutex<HashMap<K, ClientEntry>>,
    config: RateLimitConfig,
}

impl<K> ClientLimiterRegistry<K>
where
    K: Hash + Eq + Send + 'static,
{
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Admit or reject one request from `key`. Never blocks beyond the map lock.
    pub fn allow(&self, key: K) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// [`allow`](Self::allow) evaluated at an explicit instant.
    pub fn allow_at(&self, key: K, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }

        let capacity = f64::from(self.config.burst);
        let mut clients = self.lock();
        let entry = clients.entry(key).or_insert_with(|| ClientEntry {
            bucket: TokenBucket::new(capacity, now),
            last_seen: now,
        });

        entry.last_seen = entry.last_seen.max(now);
        entry
            .bucket
            .try_acquire(capacity, self.config.requests_per_second, now)
    }

    /// Remove every client idle for longer than the deadline. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let deadline = self.config.idle_deadline();
        let (evicted, remaining) = {
            let mut clients = self.lock();
            let before = clients.len();
            clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= deadline);
            (before - clients.len(), clients.len())
        };

        metrics::record_tracked_clients(remaining);
        tracing::debug!(evicted, remaining, "Rate limiter sweep complete");
        evicted
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, ClientEntry>> {
        // The map is consistent after every statement, so a poisoned lock is still usable.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> ClientLimiterRegistry<K>
where
    K: Hash + Eq + Send + Sync + 'static,
{
    /// Run the idle sweep on a fixed interval until shutdown is triggered.
    ///
    /// Does nothing when rate limiting is disabled.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: &Shutdown) {
        if !self.config.enabled {
            tracing::info!("Rate limiting disabled, sweep not started");
            return;
        }

        let registry = Arc::clone(self);
        let period = self.config.sweep_interval();
        shutdown.spawn("rate-limit-sweep", move |mut stop| async move {
            tracing::info!(
                interval = ?period,
                idle_deadline = ?registry.config.idle_deadline(),
                "Rate limiter sweep starting"
            );

            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registry.sweep();
                    }
                    _ = stop.recv() => {
                        tracing::info!("Rate limiter sweep received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });
    }
}

/// Middleware function for per-client rate limiting.
///
/// A request without a resolvable peer address is a server fault, not a 429.
pub async fn rate_limit_middleware(
    State(registry): State<Arc<ClientLimiterRegistry>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !registry.is_enabled() {
        return next.run(request).await;
    }

    let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>().copied()
    else {
        return Error::fault("peer address unavailable for rate limiting").into_response();
    };

    let client = addr.ip();
    if registry.allow(client) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, "Rate limit exceeded");
        metrics::record_rate_limited();
        Error::RateLimitExceeded.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(burst: u32, rps: f64) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            requests_per_second: rps,
            burst,
            idle_deadline_secs: 180,
            sweep_interval_secs: 60,
        }
    }

    #[test]
    fn test_burst_then_refill() {
        let registry = ClientLimiterRegistry::<&str>::new(config(4, 2.0));
        let t0 = Instant::now();

        let decisions: Vec<bool> = (0..6).map(|_| registry.allow_at("client", t0)).collect();
        assert_eq!(decisions, vec![true, true, true, true, false, false]);

        let t1 = t0 + Duration::from_millis(500);
        assert!(registry.allow_at("client", t1));
        assert!(!registry.allow_at("client", t1));
    }

    #[test]
    fn test_refill_after_one_period_is_exactly_one_token() {
        let rate = 3.0;
        let registry = ClientLimiterRegistry::<&str>::new(config(2, rate));
        let t0 = Instant::now();
        assert!(registry.allow_at("c", t0));
        assert!(registry.allow_at("c", t0));
        assert!(!registry.allow_at("c", t0));

        let t1 = t0 + Duration::from_secs_f64(1.0 / rate);
        assert!(registry.allow_at("c", t1));
        assert!(!registry.allow_at("c", t1));
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let registry = ClientLimiterRegistry::<&str>::new(config(2, 100.0));
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(60);

        assert!(registry.allow_at("c", later));
        assert!(registry.allow_at("c", later));
        assert!(!registry.allow_at("c", later));
    }

    #[test]
    fn test_clients_are_independent() {
        let registry = ClientLimiterRegistry::<&str>::new(config(1, 1.0));
        let t0 = Instant::now();
        assert!(registry.allow_at("a", t0));
        assert!(!registry.allow_at("a", t0));
        assert!(registry.allow_at("b", t0));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_disabled_always_allows_and_tracks_nothing() {
        let mut cfg = config(1, 1.0);
        cfg.enabled = false;
        let registry = ClientLimiterRegistry::<&str>::new(cfg);
        let t0 = Instant::now();
        assert!((0..100).all(|_| registry.allow_at("c", t0)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_evicts_only_idle_clients() {
        let registry = ClientLimiterRegistry::<&str>::new(config(4, 2.0));
        let t0 = Instant::now();
        registry.allow_at("idle", t0);
        registry.allow_at("active", t0);

        // Rejected requests also count as activity.
        let recent = t0 + Duration::from_secs(150);
        for _ in 0..10 {
            registry.allow_at("active", recent);
        }

        let evicted = registry.sweep_at(t0 + Duration::from_secs(181));
        assert_eq!(evicted, 1);
        assert!(!registry.contains(&"idle"));
        assert!(registry.contains(&"active"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_runs_until_shutdown() {
        let registry = Arc::new(ClientLimiterRegistry::<&'static str>::new(config(4, 2.0)));
        let shutdown = Shutdown::new();
        registry.spawn_sweeper(&shutdown);

        registry.allow("stale");
        time::sleep(Duration::from_secs(100)).await;
        registry.allow("fresh");
        assert_eq!(registry.len(), 2);

        // Sweeps at 60s, 120s, 180s leave "stale" (idle 180s); the one at 240s evicts it.
        time::sleep(Duration::from_secs(141)).await;
        assert!(!registry.contains(&"stale"));
        assert!(registry.contains(&"fresh"));

        shutdown.drain(Duration::from_secs(1)).await;
        assert_eq!(shutdown.receiver_count(), 0);
    }
}

//! Per-client token bucket rate limiting.
//!
//! One [`TokenBucket`] per client identity, owned by a [`LimiterRegistry`]
//! behind a single mutex. The same lock covers map membership (lazy insert,
//! idle eviction) and every consume, so check-and-decrement is atomic with
//! respect to all other callers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Allowed,
    /// `retry_after` is the time until the bucket holds one whole token again.
    Denied { retry_after: Duration },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

/// A continuously refilling token bucket.
///
/// Refill is lazy: `tokens` is recomputed from the elapsed time on every
/// access, so there is no ticker per bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        // Callers may race with slightly older timestamps; never refill backwards.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Take one token if available.
    ///
    /// The decayed state is persisted whether or not a token was taken.
    pub fn try_consume(&mut self, now: Instant) -> Verdict {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Verdict::Allowed
        } else {
            let missing = 1.0 - self.tokens;
            let retry_after =
                Duration::try_from_secs_f64(missing / self.refill_rate).unwrap_or(Duration::MAX);
            Verdict::Denied { retry_after }
        }
    }

    /// Tokens currently held, as of the last access.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

#[derive(Debug)]
struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
    /// Tie-breaker for clients first seen at the same instant.
    seq: u64,
}

/// Client map plus an index ordered by `last_seen`, so a sweep visits only
/// the stale prefix instead of the whole map.
#[derive(Debug, Default)]
struct ClientTable {
    entries: HashMap<String, ClientEntry>,
    by_last_seen: BTreeMap<(Instant, u64), String>,
    next_seq: u64,
}

impl ClientTable {
    fn admit(&mut self, identity: &str, now: Instant, capacity: f64, rate: f64) -> Verdict {
        if let Some(entry) = self.entries.get_mut(identity) {
            if now > entry.last_seen {
                if let Some(key) = self.by_last_seen.remove(&(entry.last_seen, entry.seq)) {
                    self.by_last_seen.insert((now, entry.seq), key);
                }
                entry.last_seen = now;
            }
            return entry.bucket.try_consume(now);
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let mut bucket = TokenBucket::new(capacity, rate, now);
        let verdict = bucket.try_consume(now);
        self.entries.insert(
            identity.to_owned(),
            ClientEntry {
                bucket,
                last_seen: now,
                seq,
            },
        );
        self.by_last_seen.insert((now, seq), identity.to_owned());
        verdict
    }

    fn evict_idle(&mut self, now: Instant, idle_threshold: Duration) -> usize {
        let mut evicted = 0;
        while let Some(oldest) = self.by_last_seen.first_entry() {
            let (last_seen, _) = *oldest.key();
            if now.saturating_duration_since(last_seen) <= idle_threshold {
                break;
            }
            let identity = oldest.remove();
            self.entries.remove(&identity);
            evicted += 1;
        }
        evicted
    }
}

/// Owns one token bucket per client identity.
///
/// Constructed once at startup and shared behind an `Arc`. A disabled
/// registry admits everything and never allocates entries.
#[derive(Debug)]
pub struct LimiterRegistry {
    enabled: bool,
    capacity: f64,
    refill_rate: f64,
    idle_threshold: Duration,
    sweep_interval: Duration,
    clients: Mutex<ClientTable>,
}

impl LimiterRegistry {
    pub fn new(
        capacity: u32,
        refill_rate: f64,
        idle_threshold: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            enabled: true,
            capacity: f64::from(capacity),
            refill_rate,
            idle_threshold,
            sweep_interval,
            clients: Mutex::new(ClientTable::default()),
        }
    }

    /// Bypass mode: every request is allowed.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            capacity: 0.0,
            refill_rate: 0.0,
            idle_threshold: Duration::ZERO,
            sweep_interval: Duration::ZERO,
            clients: Mutex::new(ClientTable::default()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        Self::new(
            config.burst,
            config.requests_per_second,
            config.idle_threshold(),
            config.sweep_interval(),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn lock(&self) -> MutexGuard<'_, ClientTable> {
        // Bucket arithmetic cannot leave the table half-updated, so a
        // poisoned lock still guards consistent state.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admission decision for one request from `identity`.
    pub fn allow(&self, identity: &str, now: Instant) -> Verdict {
        if !self.enabled {
            return Verdict::Allowed;
        }
        self.lock()
            .admit(identity, now, self.capacity, self.refill_rate)
    }

    /// Remove every client idle for longer than the threshold.
    /// Returns the number evicted.
    pub fn sweep(&self, now: Instant) -> usize {
        if !self.enabled {
            return 0;
        }
        let mut table = self.lock();
        let evicted = table.evict_idle(now, self.idle_threshold);
        metrics::record_limiter_clients(table.entries.len());
        evicted
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.lock().entries.contains_key(identity)
    }

    /// Tokens currently held by `identity`, if tracked.
    pub fn tokens(&self, identity: &str) -> Option<f64> {
        self.lock().entries.get(identity).map(|e| e.bucket.tokens())
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

/// Current time on tokio's clock, so paused-time tests drive refill and
/// eviction the same way production traffic does.
pub fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Start the periodic eviction sweep.
///
/// Returns `None` for a disabled registry. The loop exits when `cancel`
/// fires, which the shutdown coordinator does at the start of the drain.
pub fn spawn_sweeper(
    registry: Arc<LimiterRegistry>,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    if !registry.is_enabled() {
        tracing::info!("Rate limiting disabled; no sweeper started");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(registry.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = registry.sweep_interval().as_secs_f64(),
            idle_threshold_secs = registry.idle_threshold.as_secs_f64(),
            "Limiter sweeper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Limiter sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = registry.sweep(clock_now());
                    if evicted > 0 {
                        metrics::record_limiter_evictions(evicted);
                        tracing::debug!(evicted, remaining = registry.len(), "Evicted idle clients");
                    }
                }
            }
        }
    }))
}

//! Content-addressed decision cache with single-flight coalescing.
//!
//! Keys are [`Fingerprint`]s: the SHA-256 of the provider id and the
//! decision-relevant part of an observation. Concurrent requests for the
//! same fingerprint share one in-flight computation, so identical
//! situations never trigger duplicate provider calls. Only decisions that
//! came from a provider are stored; fallback results are shared with
//! coalesced waiters but never cached.
//!
//! Both maps sit behind `std::sync::Mutex`. A poisoned lock degrades the
//! cache to always-miss instead of blocking the pipeline. Lock order is
//! in-flight map first, entries second.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use holdfast_types::{Decision, DecisionView, Observation};
use serde::Serialize;
use tokio::time::Instant;

/// Stable hash identifying an (observation, provider) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    provider_id: &'a str,
    observation: DecisionView<'a>,
}

/// Fingerprint `observation` as seen by `provider_id`.
///
/// Covers the observation's decision view only: the observer id, the tick,
/// and narrative history are excluded, so agents in identical situations
/// bound to the same provider share a key.
pub fn fingerprint(
    observation: &Observation,
    provider_id: &str,
) -> Result<Fingerprint, serde_json::Error> {
    let input = FingerprintInput {
        provider_id,
        observation: observation.decision_view(),
    };
    holdfast_events::hash_json(&input).map(Fingerprint)
}

/// Result of resolving one decision, shared by every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computation {
    /// The decision to apply.
    pub decision: Decision,
    /// Set when the survival heuristic stood in for the provider.
    pub fallback_reason: Option<String>,
    /// Prompt tokens reported by the provider.
    pub tokens_in: Option<u32>,
    /// Completion tokens reported by the provider.
    pub tokens_out: Option<u32>,
    /// Provider calls made.
    pub attempts: u32,
}

impl Computation {
    /// Whether the decision came from the fallback heuristic.
    pub const fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// A stored provider decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Key.
    pub fingerprint: Fingerprint,
    /// Cached decision.
    pub decision: Decision,
    /// When it was stored.
    pub created_at: Instant,
    /// Provider that produced it.
    pub provider_id: String,
}

/// How a request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a stored entry.
    Hit,
    /// Joined another request's in-flight computation.
    Coalesced,
    /// Ran the computation itself.
    Computed,
}

impl CacheStatus {
    /// Whether no new computation was started.
    pub const fn is_hit(self) -> bool {
        matches!(self, Self::Hit | Self::Coalesced)
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Served from a stored entry.
    pub hits: u64,
    /// Joined an in-flight computation.
    pub coalesced: u64,
    /// Started a computation.
    pub misses: u64,
}

type InFlight = Shared<BoxFuture<'static, Computation>>;

#[derive(Debug)]
struct Inner {
    ttl_ms: AtomicU64,
    capacity: AtomicUsize,
    entries: Mutex<BTreeMap<Fingerprint, CacheEntry>>,
    in_flight: Mutex<BTreeMap<Fingerprint, InFlight>>,
    hits: AtomicU64,
    coalesced: AtomicU64,
    misses: AtomicU64,
}

impl Inner {
    fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.load(Ordering::Relaxed))
    }

    fn lookup(&self, fingerprint: &Fingerprint) -> Option<Decision> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        let entry = entries.get(fingerprint)?;
        if entry.created_at.elapsed() >= self.ttl() {
            entries.remove(fingerprint);
            return None;
        }
        Some(entry.decision.clone())
    }

    fn store(&self, fingerprint: Fingerprint, decision: Decision, provider_id: &str) {
        let capacity = self.capacity.load(Ordering::Relaxed);
        if capacity == 0 {
            return;
        }
        let ttl = self.ttl();
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let now = Instant::now();
        if entries.len() >= capacity && !entries.contains_key(&fingerprint) {
            entries.retain(|_, entry| now.saturating_duration_since(entry.created_at) < ttl);
        }
        while entries.len() >= capacity && !entries.contains_key(&fingerprint) {
            let oldest = entries
                .values()
                .min_by_key(|entry| entry.created_at)
                .map(|entry| entry.fingerprint.clone());
            match oldest {
                Some(key) => entries.remove(&key),
                None => break,
            };
        }
        entries.insert(
            fingerprint.clone(),
            CacheEntry {
                fingerprint,
                decision,
                created_at: now,
                provider_id: provider_id.to_owned(),
            },
        );
    }

    /// Store a provider result, then retire the in-flight slot.
    fn finish(&self, fingerprint: &Fingerprint, provider_id: &str, computation: &Computation) {
        if computation.is_fallback() {
            tracing::debug!(fingerprint = %fingerprint, "fallback decision not cached");
        } else {
            self.store(fingerprint.clone(), computation.decision.clone(), provider_id);
        }
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(fingerprint);
        }
    }
}

/// Decision cache shared by every concurrent resolver in a tick.
///
/// Clones share the same storage.
#[derive(Debug, Clone)]
pub struct DecisionCache {
    inner: Arc<Inner>,
}

impl DecisionCache {
    /// A cache whose entries expire after `ttl`, holding at most `capacity`.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl_ms: AtomicU64::new(duration_ms(ttl)),
                capacity: AtomicUsize::new(capacity),
                entries: Mutex::new(BTreeMap::new()),
                in_flight: Mutex::new(BTreeMap::new()),
                hits: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// Change the TTL and capacity. Existing entries are judged against
    /// the new TTL on their next lookup.
    pub fn configure(&self, ttl: Duration, capacity: usize) {
        self.inner.ttl_ms.store(duration_ms(ttl), Ordering::Relaxed);
        self.inner.capacity.store(capacity, Ordering::Relaxed);
    }

    /// Current TTL.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl()
    }

    /// The stored decision for `fingerprint`, if present and fresh.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Decision> {
        self.inner.lookup(fingerprint)
    }

    /// Store a provider decision.
    pub fn store(&self, fingerprint: Fingerprint, decision: Decision, provider_id: &str) {
        self.inner.store(fingerprint, decision, provider_id);
    }

    /// Whether an entry exists for `fingerprint`, fresh or not.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner
            .entries
            .lock()
            .is_ok_and(|entries| entries.contains_key(fingerprint))
    }

    /// Every stored entry, by fingerprint.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.inner
            .entries
            .lock()
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().map_or(0, |entries| entries.len())
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored entry. In-flight computations finish normally.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.clear();
        }
    }

    /// Hit, coalesce, and miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }

    /// Serve `fingerprint` from the cache, from an in-flight computation,
    /// or by running `compute`.
    ///
    /// At most one `compute` runs per fingerprint at a time; every
    /// concurrent caller receives its result. The computation is driven
    /// by whichever caller polls it, so dropping the first caller does
    /// not strand the others.
    pub async fn resolve<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        provider_id: &str,
        compute: F,
    ) -> (Computation, CacheStatus)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Computation> + Send + 'static,
    {
        if let Some(decision) = self.inner.lookup(fingerprint) {
            return (self.hit(fingerprint, decision), CacheStatus::Hit);
        }

        let candidate = self.leader(fingerprint, provider_id, compute());
        let (shared, status) = match self.inner.in_flight.lock() {
            Err(_poisoned) => (candidate, CacheStatus::Computed),
            Ok(mut in_flight) => {
                if let Some(existing) = in_flight.get(fingerprint) {
                    (existing.clone(), CacheStatus::Coalesced)
                } else if let Some(decision) = self.inner.lookup(fingerprint) {
                    // Stored by a computation that finished after the first check.
                    return (self.hit(fingerprint, decision), CacheStatus::Hit);
                } else {
                    in_flight.insert(fingerprint.clone(), candidate.clone());
                    (candidate, CacheStatus::Computed)
                }
            }
        };

        match status {
            CacheStatus::Coalesced => {
                self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(fingerprint = %fingerprint, "joined in-flight decision");
            }
            _ => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        (shared.await, status)
    }

    /// Wrap `work` so that finishing it stores the result and retires the
    /// in-flight slot. Nothing runs until the returned future is polled.
    fn leader<Fut>(&self, fingerprint: &Fingerprint, provider_id: &str, work: Fut) -> InFlight
    where
        Fut: Future<Output = Computation> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let key = fingerprint.clone();
        let provider = provider_id.to_owned();
        async move {
            let computation = work.await;
            inner.finish(&key, &provider, &computation);
            computation
        }
        .boxed()
        .shared()
    }

    fn hit(&self, fingerprint: &Fingerprint, decision: Decision) -> Computation {
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(fingerprint = %fingerprint, "decision cache hit");
        Computation {
            decision,
            fallback_reason: None,
            tokens_in: None,
            tokens_out: None,
            attempts: 0,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

//! Shared result cache
//!
//! The only state shared between concurrent workflows. Entries are keyed
//! by a fingerprint of (targets, algorithm set, max hops, graph version),
//! expire after a TTL and are evicted least-recently-used once the cache
//! is full.
//!
//! Lookups are single-flight: while one caller computes a key, every other
//! caller for the same key waits for that result instead of recomputing.
//! Failed computations are never cached; waiters then retry themselves.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// Values that can opt out of caching (e.g. degraded results)
pub trait Cacheable {
    fn is_cacheable(&self) -> bool {
        true
    }
}

/// Cache key for a scoring request
pub fn fingerprint(targets: &[String], algorithms: &[&str], max_hops: usize, graph_version: &str) -> String {
    let mut targets: Vec<&str> = targets.iter().map(String::as_str).collect();
    targets.sort_unstable();
    targets.dedup();
    let mut algorithms: Vec<&str> = algorithms.to_vec();
    algorithms.sort_unstable();
    algorithms.dedup();

    let mut hasher = Sha256::new();
    hasher.update(targets.join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(algorithms.join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(max_hops.to_le_bytes());
    hasher.update(b"|");
    hasher.update(graph_version.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

struct Entry<V> {
    value: Arc<V>,
    inserted: Instant,
    last_access: AtomicU64,
}

/// Outcome of an in-flight computation, shared with waiters
struct Flight<V> {
    outcome: Mutex<Option<Option<Arc<V>>>>,
    done: Condvar,
}

impl<V> Flight<V> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, value: Option<Arc<V>>) {
        let mut outcome = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        if outcome.is_none() {
            *outcome = Some(value);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> Option<Arc<V>> {
        let mut outcome = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        while outcome.is_none() {
            outcome = self.done.wait(outcome).unwrap_or_else(|e| e.into_inner());
        }
        outcome.clone().flatten()
    }
}

/// Completes the flight as failed if the leader unwinds before finishing
struct FlightGuard<'a, V> {
    cache: &'a ResultCache<V>,
    key: &'a str,
    flight: Arc<Flight<V>>,
}

impl<V> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        self.flight.complete(None);
        self.cache.in_flight.remove(self.key);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

pub struct ResultCache<V> {
    entries: DashMap<String, Entry<V>>,
    in_flight: DashMap<String, Arc<Flight<V>>>,
    ttl: Duration,
    max_entries: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Cacheable> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl<V: Cacheable> ResultCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Fresh cached value, refreshing its LRU position
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) if entry.inserted.elapsed() <= self.ttl => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                return Some(Arc::clone(&entry.value));
            }
            Some(_) => true,
        };
        if expired {
            self.entries
                .remove_if(key, |_, e| e.inserted.elapsed() > self.ttl);
        }
        None
    }

    /// Cached value for `key`, or the result of `compute`.
    ///
    /// Concurrent callers for the same key share one computation. An
    /// `Err` is returned to the computing caller only; waiters retry.
    pub fn get_or_compute<E, F>(&self, key: &str, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let mut compute = Some(compute);
        loop {
            if let Some(value) = self.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }

            let (flight, leader) = match self.in_flight.entry(key.to_string()) {
                MapEntry::Occupied(e) => (Arc::clone(e.get()), false),
                MapEntry::Vacant(e) => {
                    let flight = Arc::new(Flight::new());
                    e.insert(Arc::clone(&flight));
                    (flight, true)
                }
            };

            if !leader {
                debug!(
                    "Waiting on in-flight computation for {}",
                    key.chars().take(12).collect::<String>()
                );
                if let Some(value) = flight.wait() {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                continue;
            }

            let guard = FlightGuard {
                cache: self,
                key,
                flight: Arc::clone(&flight),
            };

            // Another leader may have finished between our lookup and our flight
            if let Some(value) = self.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                flight.complete(Some(Arc::clone(&value)));
                drop(guard);
                return Ok(value);
            }

            self.misses.fetch_add(1, Ordering::Relaxed);
            let Some(compute) = compute.take() else {
                // Leaders always return, so the closure is only ever taken once
                drop(guard);
                continue;
            };
            return match compute() {
                Ok(value) => {
                    let value = Arc::new(value);
                    if value.is_cacheable() {
                        self.insert(key, Arc::clone(&value));
                    }
                    flight.complete(Some(Arc::clone(&value)));
                    drop(guard);
                    Ok(value)
                }
                Err(e) => {
                    drop(guard);
                    Err(e)
                }
            };
        }
    }

    fn insert(&self, key: &str, value: Arc<V>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted: Instant::now(),
                last_access: AtomicU64::new(self.tick()),
            },
        );
        self.evict();
    }

    fn evict(&self) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        self.purge_expired();
        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.last_access.load(Ordering::Relaxed))
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.inserted.elapsed() <= self.ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let coalesced = self.coalesced.load(Ordering::Relaxed);
        let lookups = hits + misses + coalesced;
        CacheStats {
            entries: self.entries.len(),
            hits,
            misses,
            coalesced,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 {
                (hits + coalesced) as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }
}

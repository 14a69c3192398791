//! Bounded key/value cache with per-entry expiry.
//!
//! The rate limiter only talks to the [`BoundedCache`] trait, so an external
//! store can replace [`LruTtlCache`] without touching the limiter.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::trace;

use crate::clock::Clock;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache capacity must be greater than 0")]
    ZeroCapacity,
}

/// Map-like store with capacity eviction and per-entry time-to-live.
pub trait BoundedCache<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace `key`, expiring it after `ttl`.
    fn set(&self, key: &str, value: V, ttl: TimeDelta);

    /// Remove `key`; returns whether an entry was present.
    fn delete(&self, key: &str) -> bool;

    /// Number of stored entries, including ones that expired but were not
    /// purged yet.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all expired entries, returning how many were removed.
    fn purge_expired(&self) -> usize;
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    expires_at: DateTime<Utc>,
    touched: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, Slot<V>>,
    // touch tick -> key, oldest first
    recency: BTreeMap<u64, String>,
    tick: u64,
}

impl<V> Inner<V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &str) -> Option<Slot<V>> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.touched);
        Some(slot)
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.expires_at < now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn evict_least_recently_used(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// In-memory least-recently-used cache whose entries also expire.
#[derive(Debug)]
pub struct LruTtlCache<V> {
    capacity: usize,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner<V>>,
}

impl<V> LruTtlCache<V> {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            clock,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity.min(1024)),
                recency: BTreeMap::new(),
                tick: 0,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> BoundedCache<V> for LruTtlCache<V>
where
    V: Clone + Send,
{
    fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let expired = inner.entries.get(key)?.expires_at < now;
        if expired {
            inner.remove(key);
            return None;
        }

        let tick = inner.next_tick();
        let slot = inner.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut slot.touched, tick);
        let value = slot.value.clone();
        inner.recency.remove(&previous);
        inner.recency.insert(tick, key.to_string());
        Some(value)
    }

    fn set(&self, key: &str, value: V, ttl: TimeDelta) {
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut inner = self.lock();

        inner.remove(key);
        let tick = inner.next_tick();
        inner.entries.insert(
            key.to_string(),
            Slot {
                value,
                expires_at,
                touched: tick,
            },
        );
        inner.recency.insert(tick, key.to_string());

        if inner.entries.len() > self.capacity {
            inner.purge_expired(now);
        }
        while inner.entries.len() > self.capacity {
            match inner.evict_least_recently_used() {
                Some(evicted) => trace!(key = %evicted, "evicted least recently used entry"),
                None => break,
            }
        }
    }

    fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.lock().purge_expired(now)
    }
}

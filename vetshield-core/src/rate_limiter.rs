//! Fixed-window rate limiter with escalating lockout.
//!
//! Every key may be admitted `request_limit` times per window. The first
//! request over the limit blocks the key for twice the window length. A
//! blocked key stays blocked until the block lapses or [`RateLimiter::reset`]
//! is called.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::cache::{BoundedCache, CacheError, LruTtlCache};
use crate::clock::{Clock, SystemClock};

/// Default number of keys the in-memory store keeps.
pub const DEFAULT_CAPACITY: usize = 5000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimiterError {
    #[error("request limit must be greater than 0")]
    ZeroRequestLimit,

    #[error("window must be longer than 0")]
    ZeroWindow,

    #[error("window of {0:?} is out of range")]
    WindowOutOfRange(Duration),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Per-key counter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRecord {
    pub count: u32,
    pub reset_time: DateTime<Utc>,
    pub blocked: bool,
}

/// Outcome of a single [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    pub is_blocked: bool,
}

fn after(now: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub struct RateLimiterBuilder {
    request_limit: u32,
    window: Duration,
    capacity: usize,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn BoundedCache<RateRecord>>>,
}

impl RateLimiterBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Capacity of the default in-memory store. Ignored when a store is
    /// supplied with [`with_store`](Self::with_store).
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn BoundedCache<RateRecord>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<RateLimiter, RateLimiterError> {
        if self.request_limit == 0 {
            return Err(RateLimiterError::ZeroRequestLimit);
        }
        if self.window.is_zero() {
            return Err(RateLimiterError::ZeroWindow);
        }
        let window = TimeDelta::from_std(self.window)
            .ok()
            .filter(|window| window.checked_mul(2).is_some())
            .ok_or(RateLimiterError::WindowOutOfRange(self.window))?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(LruTtlCache::new(self.capacity, clock.clone())?),
        };

        Ok(RateLimiter {
            request_limit: self.request_limit,
            window,
            clock,
            store,
        })
    }
}

pub struct RateLimiter {
    request_limit: u32,
    window: TimeDelta,
    clock: Arc<dyn Clock>,
    store: Arc<dyn BoundedCache<RateRecord>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("request_limit", &self.request_limit)
            .field("window", &self.window)
            .field("tracked_keys", &self.store.len())
            .finish()
    }
}

impl RateLimiter {
    /// Limiter on the system clock with the default in-memory store.
    pub fn new(request_limit: u32, window: Duration) -> Result<Self, RateLimiterError> {
        Self::builder(request_limit, window).build()
    }

    pub fn builder(request_limit: u32, window: Duration) -> RateLimiterBuilder {
        RateLimiterBuilder {
            request_limit,
            window,
            capacity: DEFAULT_CAPACITY,
            clock: None,
            store: None,
        }
    }

    pub fn request_limit(&self) -> u32 {
        self.request_limit
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Duration of the lockout after the first violation.
    pub fn block_duration(&self) -> TimeDelta {
        self.window * 2
    }

    fn fresh_record(&self, now: DateTime<Utc>) -> RateRecord {
        RateRecord {
            count: 0,
            reset_time: after(now, self.window),
            blocked: false,
        }
    }

    fn persist(&self, key: &str, record: RateRecord, now: DateTime<Utc>) {
        self.store.set(key, record, record.reset_time - now);
    }

    /// Count one request against `key` and report whether it is admitted.
    pub fn check(&self, key: &str) -> RateLimitResult {
        let now = self.clock.now();
        let mut record = match self.store.get(key) {
            Some(record) if now <= record.reset_time => record,
            _ => self.fresh_record(now),
        };

        if record.blocked {
            return RateLimitResult {
                success: false,
                limit: self.request_limit,
                remaining: 0,
                reset_time: record.reset_time,
                is_blocked: true,
            };
        }

        if record.count >= self.request_limit {
            record.blocked = true;
            record.count = self.request_limit;
            record.reset_time = after(now, self.block_duration());
            debug!(key = %key, reset_time = %record.reset_time, "Rate limit exceeded, key blocked");
        } else {
            record.count += 1;
        }

        self.persist(key, record, now);

        RateLimitResult {
            success: !record.blocked,
            limit: self.request_limit,
            remaining: self.request_limit.saturating_sub(record.count),
            reset_time: record.reset_time,
            is_blocked: record.blocked,
        }
    }

    /// Forget everything about `key`.
    pub fn reset(&self, key: &str) {
        if self.store.delete(key) {
            debug!(key = %key, "Rate limit reset");
        }
    }

    /// Block `key` right away for `duration`, twice the window by default.
    pub fn block(&self, key: &str, duration: Option<TimeDelta>) {
        let now = self.clock.now();
        let duration = duration.unwrap_or_else(|| self.block_duration());
        let record = RateRecord {
            count: self.request_limit,
            reset_time: after(now, duration),
            blocked: true,
        };
        self.persist(key, record, now);
        debug!(key = %key, reset_time = %record.reset_time, "Key blocked");
    }

    /// Current record of `key` without counting a request.
    pub fn peek(&self, key: &str) -> Option<RateRecord> {
        let now = self.clock.now();
        self.store
            .get(key)
            .filter(|record| now <= record.reset_time)
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

//! Window counter storage.
//!
//! One fixed-window counter per (user, endpoint) key, sharded so that
//! contention is bounded by concurrent requests to the *same* key. A global
//! lock across keys is explicitly off the table: throughput must not degrade
//! as the user population grows.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::clock::to_delta;
use crate::error::Result;

use super::key::RateLimitKey;

/// Counter state for one key's current window, as observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Requests counted in the current window
    pub count: u64,
    /// When the current window started
    pub window_start: DateTime<Utc>,
    /// Window length recorded for this entry
    pub window: Duration,
}

/// Outcome of an atomic acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request was admitted (and counted)
    pub admitted: bool,
    /// The count after the call
    pub count: u64,
    /// When the current window started
    pub window_start: DateTime<Utc>,
}

/// Storage contract for per-key window counters.
///
/// All methods return `Result` so a degraded backing store surfaces errors
/// the engine can catch and convert to a fail-open decision. This trait is
/// also the substitution point if counters ever move to a shared external
/// store.
pub trait WindowStore: Send + Sync {
    /// Return the entry for `key`, creating it with a fresh window if absent.
    ///
    /// Creation happens at most once per key, even under concurrent first
    /// requests.
    fn get_or_create(
        &self,
        key: &RateLimitKey,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowState>;

    /// Read the current state for `key` without mutating anything.
    ///
    /// An elapsed window reads as count 0 with a window starting at `now`;
    /// the physical reset only commits on the next increment.
    fn current(&self, key: &RateLimitKey, now: DateTime<Utc>) -> Result<Option<WindowState>>;

    /// Roll the window over if it has elapsed, then increment.
    ///
    /// Returns the new count. This is the sole unconditional mutator and is
    /// always safe to call regardless of any prior decision.
    fn increment(&self, key: &RateLimitKey, window: Duration, now: DateTime<Utc>) -> Result<u64>;

    /// Atomic check-and-increment under the entry's lock.
    ///
    /// Increments only while `count < limit`, so concurrent callers on one
    /// key cannot jointly overshoot the quota.
    fn acquire(
        &self,
        key: &RateLimitKey,
        window: Duration,
        limit: u64,
        now: DateTime<Utc>,
    ) -> Result<Admission>;

    /// Remove the entry for `key`, if any.
    fn remove(&self, key: &RateLimitKey) -> Result<()>;

    /// Remove the entry for `key` only if it is still stale at `now`.
    ///
    /// Returns whether an entry was removed. A key refreshed between
    /// staleness collection and removal survives.
    fn remove_stale(&self, key: &RateLimitKey, now: DateTime<Utc>) -> Result<bool>;

    /// Keys whose window ended more than one full window before `now`.
    fn stale_keys(&self, now: DateTime<Utc>) -> Result<Vec<RateLimitKey>>;

    /// Number of live entries.
    fn len(&self) -> usize;

    /// Whether the store has no live entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One key's counter. Mutated only while holding the entry's shard lock;
/// `window_start` only changes on rollover.
#[derive(Debug)]
struct WindowEntry {
    window_start: DateTime<Utc>,
    window: Duration,
    count: u64,
}

impl WindowEntry {
    fn new(window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            window,
            count: 0,
        }
    }

    fn elapsed(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.window_start) >= to_delta(self.window)
    }

    /// Window ended more than one full window before `now`.
    fn stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.window_start) >= to_delta(self.window) * 2
    }

    fn rollover_if_elapsed(&mut self, now: DateTime<Utc>) {
        if self.elapsed(now) {
            self.window_start = now;
            self.count = 0;
        }
    }

    fn state(&self) -> WindowState {
        WindowState {
            count: self.count,
            window_start: self.window_start,
            window: self.window,
        }
    }
}

/// In-memory, sharded window store.
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    entries: DashMap<RateLimitKey, WindowEntry>,
}

impl InMemoryWindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl WindowStore for InMemoryWindowStore {
    fn get_or_create(
        &self,
        key: &RateLimitKey,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowState> {
        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, window_secs = window.as_secs(), "Creating window entry");
            WindowEntry::new(window, now)
        });
        Ok(entry.state())
    }

    fn current(&self, key: &RateLimitKey, now: DateTime<Utc>) -> Result<Option<WindowState>> {
        Ok(self.entries.get(key).map(|entry| {
            if entry.elapsed(now) {
                WindowState {
                    count: 0,
                    window_start: now,
                    window: entry.window,
                }
            } else {
                entry.state()
            }
        }))
    }

    fn increment(&self, key: &RateLimitKey, window: Duration, now: DateTime<Utc>) -> Result<u64> {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| WindowEntry::new(window, now));
        entry.rollover_if_elapsed(now);
        entry.count += 1;
        Ok(entry.count)
    }

    fn acquire(
        &self,
        key: &RateLimitKey,
        window: Duration,
        limit: u64,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| WindowEntry::new(window, now));
        entry.rollover_if_elapsed(now);

        let admitted = entry.count < limit;
        if admitted {
            entry.count += 1;
        }

        Ok(Admission {
            admitted,
            count: entry.count,
            window_start: entry.window_start,
        })
    }

    fn remove(&self, key: &RateLimitKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn remove_stale(&self, key: &RateLimitKey, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.stale(now))
            .is_some())
    }

    fn stale_keys(&self, now: DateTime<Utc>) -> Result<Vec<RateLimitKey>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.value().stale(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

//! Background eviction of idle window entries.
//!
//! Without it, the store grows with every caller ever seen. The sweeper
//! periodically drops entries whose window ended more than one full window
//! ago, so memory tracks *active* callers only.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;

use super::store::WindowStore;

/// Periodic eviction task over a shared window store.
pub struct Sweeper;

/// Handle to a running sweeper.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl Sweeper {
    /// Spawn the sweeper on a fixed interval.
    ///
    /// A failed pass is logged and retried on the next tick; the task itself
    /// only exits on shutdown.
    pub fn spawn<S: WindowStore + 'static>(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> SweeperHandle {
        let (shutdown, mut signal) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Sweeper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::sweep(store.as_ref(), clock.as_ref());
                    }
                    _ = signal.changed() => {
                        if *signal.borrow() {
                            debug!("Sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle { shutdown, task }
    }

    /// One eviction pass. Returns how many entries were removed.
    ///
    /// Removal re-checks staleness under the entry's lock, so a key that
    /// received traffic after being collected survives.
    pub fn sweep<S: WindowStore>(store: &S, clock: &dyn Clock) -> usize {
        let now = clock.now();

        let stale = match store.stale_keys(now) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to collect stale keys, retrying next tick");
                return 0;
            }
        };

        let mut removed = 0;
        for key in &stale {
            match store.remove_stale(key, now) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to remove stale entry"),
            }
        }

        if removed > 0 {
            debug!(removed, remaining = store.len(), "Swept idle rate limit entries");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::ratelimit::key::RateLimitKey;
    use crate::ratelimit::store::InMemoryWindowStore;
    use chrono::Utc;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_sweep_removes_only_stale_entries() {
        let store = InMemoryWindowStore::new();
        let clock = ManualClock::new(Utc::now());
        let now = clock.now();

        for user in ["idle-1", "idle-2", "busy"] {
            store
                .increment(&RateLimitKey::new(user, "GET /x"), WINDOW, now)
                .unwrap();
        }

        clock.advance(Duration::from_secs(119));
        // "busy" rolls into a fresh window just before the threshold.
        store
            .increment(&RateLimitKey::new("busy", "GET /x"), WINDOW, clock.now())
            .unwrap();
        clock.advance(Duration::from_secs(1));

        let removed = Sweeper::sweep(&store, &clock);

        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert!(store
            .current(&RateLimitKey::new("busy", "GET /x"), clock.now())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_sweep_is_a_noop_within_the_grace_window() {
        let store = InMemoryWindowStore::new();
        let clock = ManualClock::new(Utc::now());

        store
            .increment(&RateLimitKey::new("user-1", "GET /x"), WINDOW, clock.now())
            .unwrap();

        // Window elapsed but not yet one full window past its end.
        clock.advance(Duration::from_secs(100));

        assert_eq!(Sweeper::sweep(&store, &clock), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_stays_bounded_across_iterations() {
        let store = InMemoryWindowStore::new();
        let clock = ManualClock::new(Utc::now());
        let users_per_iteration = 100;

        for iteration in 0..20 {
            for u in 0..users_per_iteration {
                let key = RateLimitKey::new(&format!("it{}-user{}", iteration, u), "GET /x");
                store.increment(&key, WINDOW, clock.now()).unwrap();
            }

            clock.advance(Duration::from_secs(120));
            Sweeper::sweep(&store, &clock);

            assert!(
                store.len() <= users_per_iteration,
                "store grew past one iteration's population: {}",
                store.len()
            );
        }

        // Everything is idle by the end; one more pass drains the store.
        clock.advance(Duration::from_secs(120));
        Sweeper::sweep(&store, &clock);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_with_real_clock() {
        let store = InMemoryWindowStore::new();
        let clock = SystemClock;

        store
            .increment(
                &RateLimitKey::new("user-1", "GET /x"),
                Duration::from_millis(10),
                clock.now(),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(Sweeper::sweep(&store, &clock), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_spawned_sweeper_evicts_and_shuts_down() {
        let store = Arc::new(InMemoryWindowStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        store
            .increment(
                &RateLimitKey::new("user-1", "GET /x"),
                Duration::from_millis(20),
                clock.now(),
            )
            .unwrap();

        let handle = Sweeper::spawn(store.clone(), clock, Duration::from_millis(25));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.is_empty());

        handle.shutdown().await;
    }
}

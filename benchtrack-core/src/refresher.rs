//! Background cache refresh scheduling.
//!
//! One task drives periodic rebuilds of the result cache. Rebuilds are
//! single-flight: a trigger arriving while a rebuild is running is
//! coalesced into a no-op. A failed rebuild leaves the previous snapshot
//! serving and is retried after an exponential, capped backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use benchtrack_common::config::RefreshConfig;
use benchtrack_common::error::{BenchtrackError, Result};

use crate::cache::{CacheSnapshot, ResultCache};
use crate::store::{ResultFilter, ResultStore};

pub struct CacheRefresher {
    store: Arc<dyn ResultStore>,
    cache: Arc<ResultCache>,
    config: RefreshConfig,
    /// Mutual exclusion against ourselves; `try_lock` failure means a
    /// rebuild is in flight and the request is satisfied by it.
    inflight: Mutex<()>,
    trigger: Notify,
    shutdown_tx: broadcast::Sender<()>,
}

impl CacheRefresher {
    pub fn new(store: Arc<dyn ResultStore>, cache: Arc<ResultCache>, config: RefreshConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            store,
            cache,
            config,
            inflight: Mutex::new(()),
            trigger: Notify::new(),
            shutdown_tx,
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Request a refresh outside the periodic schedule.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Signal the scheduler loop to stop. The active snapshot is left
    /// untouched.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Pull all results, build a new snapshot and install it.
    ///
    /// Returns `Ok(false)` when another rebuild was already in flight and
    /// this request was coalesced into it.
    pub async fn refresh_once(&self) -> Result<bool> {
        let Ok(_guard) = self.inflight.try_lock() else {
            debug!("cache refresh already in flight, coalescing request");
            return Ok(false);
        };

        let results = timeout(
            self.config.store_timeout(),
            self.store.list_results(&ResultFilter::default()),
        )
        .await
        .map_err(|_| BenchtrackError::StoreUnavailable("list_results timed out".into()))??;

        let snapshot = CacheSnapshot::build(results);
        let meta = snapshot.meta().clone();
        self.cache.install(snapshot).await;
        info!(
            "installed cache snapshot: {} results, built in {:?}",
            meta.result_count, meta.build_duration
        );
        Ok(true)
    }

    /// Spawn the scheduler loop. Stops cleanly on [`shutdown`].
    ///
    /// [`shutdown`]: CacheRefresher::shutdown
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut tick = interval(self.config.interval());
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; the facade already did the
            // initial build, so consume it.
            tick.tick().await;

            let mut backoff = self.config.initial_backoff();

            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    _ = self.trigger.notified() => {}
                    _ = shutdown_rx.recv() => {
                        info!("cache refresher shutting down");
                        return;
                    }
                }

                match self.refresh_once().await {
                    Ok(_) => {
                        backoff = self.config.initial_backoff();
                    }
                    Err(e) => {
                        let delay = self.jittered(backoff);
                        warn!(
                            "cache refresh failed: {}, serving stale snapshot, retrying in {:?}",
                            e, delay
                        );
                        tokio::select! {
                            _ = sleep(delay) => self.trigger.notify_one(),
                            _ = shutdown_rx.recv() => {
                                info!("cache refresher shutting down");
                                return;
                            }
                        }
                        backoff = Duration::from_secs_f64(
                            (backoff.as_secs_f64() * self.config.backoff_multiplier)
                                .min(self.config.max_backoff().as_secs_f64()),
                        );
                    }
                }
            }
        })
    }

    fn jittered(&self, backoff: Duration) -> Duration {
        if !self.config.jitter {
            return backoff;
        }
        use rand::Rng;
        let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis().max(4) / 4) as u64;
        backoff + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryResultStore;
    use benchtrack_common::types::BenchmarkResult;
    use chrono::Utc;

    fn result(id: &str) -> BenchmarkResult {
        BenchmarkResult {
            id: id.to_string(),
            benchmark_name: "read".into(),
            case_id: "case-1".into(),
            case_text_id: "case-1".into(),
            hardware_id: "hw-1".into(),
            hardware_name: "box-1".into(),
            context_id: "ctx-1".into(),
            run_id: "run-1".into(),
            started_at: Utc::now(),
            mean: Some(1.0),
            unit: "s".into(),
            higher_is_better: false,
        }
    }

    fn refresher(store: Arc<MemoryResultStore>) -> CacheRefresher {
        CacheRefresher::new(
            store,
            Arc::new(ResultCache::new()),
            RefreshConfig {
                jitter: false,
                initial_backoff_secs: 0,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_refresh_installs_snapshot() {
        let store = Arc::new(MemoryResultStore::new());
        store.add_result(result("a"));
        let refresher = refresher(store);

        assert!(refresher.refresh_once().await.unwrap());
        let meta = refresher.cache().snapshot_meta().await;
        assert_eq!(meta.result_count, 1);
        assert!(meta.last_refreshed.is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let store = Arc::new(MemoryResultStore::new());
        store.add_result(result("a"));
        let refresher = refresher(store.clone());

        refresher.refresh_once().await.unwrap();
        let before = refresher.cache().snapshot_meta().await;

        store.add_result(result("b"));
        store.fail_next(1);
        let err = refresher.refresh_once().await;
        assert!(matches!(err, Err(BenchtrackError::StoreUnavailable(_))));

        // Failure did not touch the active snapshot.
        let after = refresher.cache().snapshot_meta().await;
        assert_eq!(after.result_count, 1);
        assert_eq!(after.last_refreshed, before.last_refreshed);

        // The next attempt succeeds and picks up the new result.
        refresher.refresh_once().await.unwrap();
        assert_eq!(refresher.cache().snapshot_meta().await.result_count, 2);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_coalesced() {
        let store = Arc::new(MemoryResultStore::new());
        store.add_result(result("a"));
        let refresher = refresher(store);

        let guard = refresher.inflight.lock().await;
        // With the in-flight lock held, a request is a coalesced no-op.
        assert!(!refresher.refresh_once().await.unwrap());
        drop(guard);
        assert!(refresher.refresh_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_scheduler_shutdown_leaves_snapshot_intact() {
        let store = Arc::new(MemoryResultStore::new());
        store.add_result(result("a"));
        let refresher = Arc::new(refresher(store));
        refresher.refresh_once().await.unwrap();

        let handle = Arc::clone(&refresher).spawn();
        refresher.shutdown();
        handle.await.unwrap();

        assert_eq!(refresher.cache().snapshot_meta().await.result_count, 1);
    }
}

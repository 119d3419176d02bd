//! Process-wide benchmark result cache.
//!
//! One immutable [`CacheSnapshot`] holds all indexed results; the active
//! snapshot is replaced wholesale on refresh, never mutated in place.
//! Readers clone the snapshot `Arc` and keep a fully consistent view for
//! the duration of their operation, so no read ever blocks on a refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::debug;

use benchtrack_common::types::BenchmarkResult;

/// Snapshot metadata, for display and debugging.
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    /// `None` until the first successful install.
    pub last_refreshed: Option<DateTime<Utc>>,
    pub result_count: usize,
    pub build_duration: Duration,
}

/// One immutable, fully-built copy of the cache's indices.
pub struct CacheSnapshot {
    by_id: HashMap<String, Arc<BenchmarkResult>>,
    /// Buckets keep insertion order from the snapshot build; sorting is
    /// the consumer's job (done per-view in the time-series assembler).
    by_benchmark_name: IndexMap<String, Vec<Arc<BenchmarkResult>>>,
    meta: SnapshotMeta,
}

impl CacheSnapshot {
    /// Empty snapshot, installed before the first build completes.
    pub fn empty() -> Self {
        Self {
            by_id: HashMap::new(),
            by_benchmark_name: IndexMap::new(),
            meta: SnapshotMeta {
                last_refreshed: None,
                result_count: 0,
                build_duration: Duration::ZERO,
            },
        }
    }

    /// Build both indices in one O(R) pass. Duplicate ids are dropped so
    /// that the name buckets and `by_id` stay in exact correspondence.
    pub fn build(results: Vec<BenchmarkResult>) -> Self {
        let started = Instant::now();
        let mut by_id: HashMap<String, Arc<BenchmarkResult>> =
            HashMap::with_capacity(results.len());
        let mut by_benchmark_name: IndexMap<String, Vec<Arc<BenchmarkResult>>> = IndexMap::new();

        for result in results {
            if by_id.contains_key(&result.id) {
                debug!("dropping duplicate result id {}", result.id);
                continue;
            }
            let result = Arc::new(result);
            by_benchmark_name
                .entry(result.benchmark_name.clone())
                .or_default()
                .push(Arc::clone(&result));
            by_id.insert(result.id.clone(), result);
        }

        let meta = SnapshotMeta {
            last_refreshed: Some(Utc::now()),
            result_count: by_id.len(),
            build_duration: started.elapsed(),
        };

        Self {
            by_id,
            by_benchmark_name,
            meta,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<BenchmarkResult>> {
        self.by_id.get(id)
    }

    /// Probe for a benchmark name without reading its bucket. Never
    /// creates an entry on miss.
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_benchmark_name.contains_key(name)
    }

    /// `None` signals an unknown benchmark name; a miss never mutates
    /// internal state.
    pub fn lookup_by_name(&self, name: &str) -> Option<&[Arc<BenchmarkResult>]> {
        self.by_benchmark_name.get(name).map(|v| v.as_slice())
    }

    pub fn by_benchmark_name(&self) -> &IndexMap<String, Vec<Arc<BenchmarkResult>>> {
        &self.by_benchmark_name
    }

    pub fn by_id(&self) -> &HashMap<String, Arc<BenchmarkResult>> {
        &self.by_id
    }

    /// All results belonging to one run, in snapshot build order.
    pub fn results_for_run(&self, run_id: &str) -> Vec<Arc<BenchmarkResult>> {
        self.by_benchmark_name
            .values()
            .flatten()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }
}

/// Holder of the active snapshot.
///
/// The lock is held only long enough to clone or replace the `Arc`; all
/// actual reads go against a snapshot reference the caller already holds.
pub struct ResultCache {
    current: RwLock<Arc<CacheSnapshot>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CacheSnapshot::empty())),
        }
    }

    /// Acquire a reference to the active snapshot.
    pub async fn snapshot(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Atomically replace the active snapshot. In-flight readers keep the
    /// reference they already acquired.
    pub async fn install(&self, snapshot: CacheSnapshot) {
        *self.current.write().await = Arc::new(snapshot);
    }

    pub async fn get(&self, id: &str) -> Option<Arc<BenchmarkResult>> {
        self.snapshot().await.get(id).cloned()
    }

    pub async fn lookup_by_name(&self, name: &str) -> Option<Vec<Arc<BenchmarkResult>>> {
        self.snapshot().await.lookup_by_name(name).map(<[_]>::to_vec)
    }

    pub async fn contains_name(&self, name: &str) -> bool {
        self.snapshot().await.contains_name(name)
    }

    pub async fn snapshot_meta(&self) -> SnapshotMeta {
        self.snapshot().await.meta().clone()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

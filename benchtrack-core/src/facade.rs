//! The single surface the presentation layer calls.
//!
//! Owns the cache lifecycle: the first build happens before serving, the
//! refresh scheduler runs until [`QueryFacade::shutdown`]. Composes the
//! cache, time-series assembler and comparison engine without exposing
//! cache internals; the engine is invoked in-process, never through a
//! request/response indirection.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use benchtrack_common::config::Settings;
use benchtrack_common::error::{BenchtrackError, EntityKind, Result};
use benchtrack_common::types::BenchmarkResult;

use crate::cache::{ResultCache, SnapshotMeta};
use crate::compare::{CompareKind, CompareReport, ComparisonEngine};
use crate::refresher::CacheRefresher;
use crate::store::ResultStore;
use crate::timeseries::{newest_of, CaseSeriesView, TimeSeriesAssembler};

/// Summary line for one benchmark name in the overview listing.
#[derive(Debug, Clone)]
pub struct BenchmarkSummary {
    pub name: String,
    pub result_count: usize,
    pub newest: Arc<BenchmarkResult>,
}

/// Overview across all benchmarks in the active snapshot.
#[derive(Debug)]
pub struct BenchmarkOverview {
    pub result_count: usize,
    pub meta: SnapshotMeta,
    /// Sorted case-insensitively by benchmark name.
    pub benchmarks: Vec<BenchmarkSummary>,
    /// Newest result per benchmark name, most recent first, capped.
    pub most_recent: Vec<Arc<BenchmarkResult>>,
}

/// Summary line for one case of a benchmark.
#[derive(Debug, Clone)]
pub struct CaseSummary {
    pub case_id: String,
    pub case_text_id: String,
    pub result_count: usize,
    pub hardware_count: usize,
    pub context_count: usize,
    pub newest: Arc<BenchmarkResult>,
}

pub struct QueryFacade {
    cache: Arc<ResultCache>,
    refresher: Arc<CacheRefresher>,
    engine: ComparisonEngine,
    assembler: TimeSeriesAssembler,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl QueryFacade {
    /// Build the first snapshot (failing fast if the store is down) and
    /// start the background refresh scheduler.
    pub async fn start(store: Arc<dyn ResultStore>, settings: Settings) -> Result<Self> {
        let cache = Arc::new(ResultCache::new());
        let refresher = Arc::new(CacheRefresher::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            settings.refresh.clone(),
        ));

        refresher.refresh_once().await?;
        let handle = Arc::clone(&refresher).spawn();
        info!("query facade serving, refresh scheduler started");

        Ok(Self {
            engine: ComparisonEngine::new(store, Arc::clone(&cache), settings.compare),
            assembler: TimeSeriesAssembler::new(settings.series),
            cache,
            refresher,
            scheduler: Mutex::new(Some(handle)),
        })
    }

    /// Stop the refresh scheduler. The active snapshot stays readable
    /// until the facade is dropped.
    pub async fn shutdown(&self) {
        self.refresher.shutdown();
        if let Some(handle) = self.scheduler.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Request a cache refresh outside the periodic schedule.
    pub fn trigger_refresh(&self) {
        self.refresher.trigger();
    }

    pub async fn get_result(&self, id: &str) -> Result<Arc<BenchmarkResult>> {
        self.cache
            .get(id)
            .await
            .ok_or_else(|| BenchtrackError::not_found(EntityKind::BenchmarkResult, id))
    }

    pub async fn list_by_benchmark_name(&self, name: &str) -> Result<Vec<Arc<BenchmarkResult>>> {
        self.cache
            .lookup_by_name(name)
            .await
            .ok_or_else(|| BenchtrackError::not_found(EntityKind::BenchmarkName, name))
    }

    pub async fn cache_meta(&self) -> SnapshotMeta {
        self.cache.snapshot_meta().await
    }

    /// Display-ready series and table rows for one benchmark case.
    pub async fn assemble_series(&self, benchmark_name: &str, case_id: &str) -> Result<CaseSeriesView> {
        let snapshot = self.cache.snapshot().await;
        let results = snapshot
            .lookup_by_name(benchmark_name)
            .ok_or_else(|| BenchtrackError::not_found(EntityKind::BenchmarkName, benchmark_name))?;
        if !results.iter().any(|r| r.case_id == case_id) {
            return Err(BenchtrackError::not_found(EntityKind::Case, case_id));
        }
        Ok(self.assembler.assemble(benchmark_name, case_id, results))
    }

    /// Compare two runs or two individual results named by `token`.
    pub async fn compare(
        &self,
        token: &str,
        kind: CompareKind,
        threshold_z: Option<f64>,
    ) -> Result<CompareReport> {
        self.engine.compare(token, kind, threshold_z).await
    }

    /// Overview of all benchmarks: alphabetical listing plus the most
    /// recently active names.
    pub async fn benchmark_overview(&self, top_n: usize) -> BenchmarkOverview {
        let snapshot = self.cache.snapshot().await;

        let mut benchmarks: Vec<BenchmarkSummary> = snapshot
            .by_benchmark_name()
            .iter()
            .filter_map(|(name, bucket)| {
                newest_of(bucket).map(|newest| BenchmarkSummary {
                    name: name.clone(),
                    result_count: bucket.len(),
                    newest: Arc::clone(newest),
                })
            })
            .collect();

        let mut most_recent: Vec<Arc<BenchmarkResult>> = benchmarks
            .iter()
            .map(|s| Arc::clone(&s.newest))
            .collect();
        most_recent.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        most_recent.truncate(top_n);

        benchmarks.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        BenchmarkOverview {
            result_count: snapshot.by_id().len(),
            meta: snapshot.meta().clone(),
            benchmarks,
            most_recent,
        }
    }

    /// Per-case summaries for one benchmark name.
    pub async fn case_overview(&self, benchmark_name: &str) -> Result<Vec<CaseSummary>> {
        let snapshot = self.cache.snapshot().await;
        let results = snapshot
            .lookup_by_name(benchmark_name)
            .ok_or_else(|| BenchtrackError::not_found(EntityKind::BenchmarkName, benchmark_name))?;

        let mut by_case: IndexMap<String, Vec<&Arc<BenchmarkResult>>> = IndexMap::new();
        for result in results {
            by_case
                .entry(result.case_id.clone())
                .or_default()
                .push(result);
        }

        let mut summaries: Vec<CaseSummary> = by_case
            .into_iter()
            .filter_map(|(case_id, group)| {
                let hardware: HashSet<&str> =
                    group.iter().map(|r| r.hardware_id.as_str()).collect();
                let contexts: HashSet<&str> = group.iter().map(|r| r.context_id.as_str()).collect();
                let owned: Vec<Arc<BenchmarkResult>> =
                    group.iter().map(|r| Arc::clone(r)).collect();
                newest_of(&owned).cloned().map(|newest| CaseSummary {
                    case_id,
                    case_text_id: newest.case_text_id.clone(),
                    result_count: owned.len(),
                    hardware_count: hardware.len(),
                    context_count: contexts.len(),
                    newest,
                })
            })
            .collect();

        summaries.sort_by(|a, b| a.case_id.cmp(&b.case_id));
        Ok(summaries)
    }
}

//! Read interface to the durable result store.
//!
//! The cache refresher pulls full result sets through [`ResultStore`], and
//! the comparison engine uses its point lookups for entities that are not
//! part of the cached projection (runs, hardware checksums).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use benchtrack_common::error::{BenchtrackError, Result};
use benchtrack_common::types::{BenchmarkResult, Hardware, Run};

/// Filters for bulk result queries.
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub benchmark_names: Option<Vec<String>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Read-only access to persisted benchmark data.
///
/// Failures map to [`BenchtrackError::StoreUnavailable`]; callers decide
/// whether to absorb (refresher) or surface (comparisons) them.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn list_results(&self, filter: &ResultFilter) -> Result<Vec<BenchmarkResult>>;

    async fn get_result(&self, id: &str) -> Result<Option<BenchmarkResult>>;

    async fn get_run(&self, id: &str) -> Result<Option<Run>>;

    async fn get_hardware(&self, id: &str) -> Result<Option<Hardware>>;
}

/// In-memory [`ResultStore`] used as a test fixture.
///
/// Supports failure injection: the next N calls return
/// `StoreUnavailable`, which exercises the refresher's retry path.
#[derive(Default)]
pub struct MemoryResultStore {
    inner: RwLock<MemoryInner>,
    fail_next: AtomicUsize,
}

#[derive(Default)]
struct MemoryInner {
    results: Vec<BenchmarkResult>,
    runs: HashMap<String, Run>,
    hardware: HashMap<String, Hardware>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&self, result: BenchmarkResult) {
        self.inner
            .write()
            .expect("memory store lock poisoned")
            .results
            .push(result);
    }

    pub fn add_run(&self, run: Run) {
        self.inner
            .write()
            .expect("memory store lock poisoned")
            .runs
            .insert(run.id.clone(), run);
    }

    pub fn add_hardware(&self, hardware: Hardware) {
        self.inner
            .write()
            .expect("memory store lock poisoned")
            .hardware
            .insert(hardware.id.clone(), hardware);
    }

    /// Make the next `n` store calls fail with `StoreUnavailable`.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(BenchtrackError::StoreUnavailable(
                "injected store failure".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn list_results(&self, filter: &ResultFilter) -> Result<Vec<BenchmarkResult>> {
        self.check_failure()?;
        let inner = self.inner.read().expect("memory store lock poisoned");
        let mut results: Vec<BenchmarkResult> = inner
            .results
            .iter()
            .filter(|r| match &filter.benchmark_names {
                Some(names) => names.contains(&r.benchmark_name),
                None => true,
            })
            .filter(|r| match filter.start_date {
                Some(start) => r.started_at >= start,
                None => true,
            })
            .filter(|r| match filter.end_date {
                Some(end) => r.started_at <= end,
                None => true,
            })
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn get_result(&self, id: &str) -> Result<Option<BenchmarkResult>> {
        self.check_failure()?;
        let inner = self.inner.read().expect("memory store lock poisoned");
        Ok(inner.results.iter().find(|r| r.id == id).cloned())
    }

    async fn get_run(&self, id: &str) -> Result<Option<Run>> {
        self.check_failure()?;
        let inner = self.inner.read().expect("memory store lock poisoned");
        Ok(inner.runs.get(id).cloned())
    }

    async fn get_hardware(&self, id: &str) -> Result<Option<Hardware>> {
        self.check_failure()?;
        let inner = self.inner.read().expect("memory store lock poisoned");
        Ok(inner.hardware.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(id: &str, name: &str) -> BenchmarkResult {
        BenchmarkResult {
            id: id.to_string(),
            benchmark_name: name.to_string(),
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

    #[tokio::test]
    async fn test_filter_by_name_and_limit() {
        let store = MemoryResultStore::new();
        store.add_result(sample_result("a", "read"));
        store.add_result(sample_result("b", "read"));
        store.add_result(sample_result("c", "write"));

        let filter = ResultFilter {
            benchmark_names: Some(vec!["read".into()]),
            ..Default::default()
        };
        let results = store.list_results(&filter).await.unwrap();
        assert_eq!(results.len(), 2);

        let filter = ResultFilter {
            limit: Some(1),
            ..Default::default()
        };
        let results = store.list_results(&filter).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryResultStore::new();
        store.add_result(sample_result("a", "read"));
        store.fail_next(1);

        let err = store.list_results(&ResultFilter::default()).await;
        assert!(matches!(err, Err(BenchtrackError::StoreUnavailable(_))));

        // Next call succeeds again.
        let results = store.list_results(&ResultFilter::default()).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}

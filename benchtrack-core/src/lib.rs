//! Benchtrack core
//!
//! This crate provides the engine behind the benchmark tracking UI:
//! - A process-wide, multi-indexed cache over all benchmark results,
//!   rebuilt in the background and swapped atomically
//! - A refresh scheduler with single-flight coalescing and capped backoff
//! - Time-series assembly for plotting and table display
//! - A comparison engine that pairs baseline/contender results and
//!   classifies change magnitude using statistical thresholds

pub mod cache;
pub mod compare;
pub mod facade;
pub mod refresher;
pub mod store;
pub mod timeseries;

pub use cache::{CacheSnapshot, ResultCache, SnapshotMeta};
pub use compare::{
    Classification, CompareKind, CompareReport, CompareToken, Comparison, ComparisonEngine,
    HardwareDrift,
};
pub use facade::{BenchmarkOverview, BenchmarkSummary, CaseSummary, QueryFacade};
pub use refresher::CacheRefresher;
pub use store::{MemoryResultStore, ResultFilter, ResultStore};
pub use timeseries::{CaseSeries, CaseSeriesView, SeriesRanking, TimeSeriesAssembler, UplotSeries};

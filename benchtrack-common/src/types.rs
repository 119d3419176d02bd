use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Unique identifier for benchmark results, runs, hardware and contexts.
pub type EntityId = String;

/// One measured benchmark result, as projected into the cache.
///
/// Results are immutable once ingested: the cache holds read-only copies
/// that are rebuilt wholesale on every refresh, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub id: EntityId,
    pub benchmark_name: String,
    /// Identifies the case (parameterization) of the benchmark.
    pub case_id: EntityId,
    /// Human-readable rendering of the case permutation.
    pub case_text_id: String,
    pub hardware_id: EntityId,
    pub hardware_name: String,
    pub context_id: EntityId,
    pub run_id: EntityId,
    pub started_at: DateTime<Utc>,
    /// Absent on failed runs.
    pub mean: Option<f64>,
    /// Measurement unit, e.g. "s" or "i/s".
    pub unit: String,
    /// Derived from unit/benchmark metadata at ingestion time.
    pub higher_is_better: bool,
}

/// One execution of a benchmark suite on one hardware/context combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: EntityId,
    /// A run need not be tied to a source commit.
    pub commit_id: Option<String>,
    /// Hardware is shared across runs, referenced by id.
    pub hardware_id: EntityId,
}

/// Snapshot of a machine/environment description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hardware {
    pub id: EntityId,
    pub name: String,
    /// Content hash of the hardware description, used to detect drift
    /// between baseline and contender environments.
    pub checksum: String,
}

/// Descriptor of build/environment parameters under which results were
/// produced (compiler flags, build type, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: EntityId,
    pub env: HashMap<String, String>,
}

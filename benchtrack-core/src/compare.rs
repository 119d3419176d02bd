//! Baseline/contender comparison engine.
//!
//! Resolves two entity identifiers (runs or individual results), pairs
//! results by (benchmark name, case), computes relative change and a
//! statistical classification per pair, and reports hardware drift.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::timeout;

use benchtrack_common::config::CompareConfig;
use benchtrack_common::error::{BenchtrackError, EntityKind, Result};
use benchtrack_common::types::BenchmarkResult;

use crate::cache::{CacheSnapshot, ResultCache};
use crate::store::ResultStore;
use crate::timeseries::newest_of;

/// Parsed `<baseline>...<contender>` compare token. The first occurrence
/// of `...` is the separator; both sides must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareToken {
    pub baseline: String,
    pub contender: String,
}

impl CompareToken {
    pub fn parse(raw: &str) -> Result<Self> {
        let Some(idx) = raw.find("...") else {
            return Err(BenchtrackError::Validation(
                "unexpected compare token, expected: <baseline-id>...<contender-id>".into(),
            ));
        };
        let baseline = &raw[..idx];
        let contender = &raw[idx + 3..];
        if baseline.is_empty() {
            return Err(BenchtrackError::Validation(
                "no baseline ID was provided, expected: <baseline-id>...<contender-id>".into(),
            ));
        }
        if contender.is_empty() {
            return Err(BenchtrackError::Validation(
                "no contender ID was provided, expected: <baseline-id>...<contender-id>".into(),
            ));
        }
        Ok(Self {
            baseline: baseline.to_string(),
            contender: contender.to_string(),
        })
    }

    pub fn render(baseline_id: &str, contender_id: &str) -> String {
        format!("{baseline_id}...{contender_id}")
    }
}

/// What kind of entity the compare token names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareKind {
    Run,
    Result,
}

/// Change magnitude classification for one matched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Regression,
    Improvement,
    NoChange,
    /// Mean absent on either side, zero baseline, or a one-sided pair.
    NoData,
}

/// One per-case comparison between baseline and contender.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub benchmark_name: String,
    pub case_id: String,
    pub baseline: Option<Arc<BenchmarkResult>>,
    pub contender: Option<Arc<BenchmarkResult>>,
    /// `(contender.mean - baseline.mean) / baseline.mean`; undefined for
    /// one-sided pairs, absent means and zero baselines.
    pub relative_change: Option<f64>,
    /// Badness delta in historical standard deviations, when enough
    /// history exists.
    pub z_score: Option<f64>,
    pub classification: Classification,
    /// Token for the per-result compare view; only constructed when both
    /// sides are present.
    pub compare_token: Option<String>,
}

/// Checksums of both environments when they differ, so the caller can
/// flag the comparison as cross-hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareDrift {
    pub baseline_checksum: String,
    pub contender_checksum: String,
}

#[derive(Debug)]
pub struct CompareReport {
    pub baseline_id: String,
    pub contender_id: String,
    pub comparisons: Vec<Comparison>,
    pub hardware_drift: Option<HardwareDrift>,
}

pub struct ComparisonEngine {
    store: Arc<dyn ResultStore>,
    cache: Arc<ResultCache>,
    config: CompareConfig,
}

impl ComparisonEngine {
    pub fn new(store: Arc<dyn ResultStore>, cache: Arc<ResultCache>, config: CompareConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Compare the two entities named by `raw_token`.
    ///
    /// Validation happens before any store access. `threshold_z`
    /// overrides the configured default for this invocation only.
    pub async fn compare(
        &self,
        raw_token: &str,
        kind: CompareKind,
        threshold_z: Option<f64>,
    ) -> Result<CompareReport> {
        let token = CompareToken::parse(raw_token)?;
        let threshold_z = threshold_z.unwrap_or(self.config.threshold_z);

        match kind {
            CompareKind::Run => self.compare_runs(&token, threshold_z).await,
            CompareKind::Result => self.compare_results(&token, threshold_z).await,
        }
    }

    async fn compare_runs(&self, token: &CompareToken, threshold_z: f64) -> Result<CompareReport> {
        let baseline_run = self
            .store_call(self.store.get_run(&token.baseline))
            .await?
            .ok_or_else(|| {
                BenchtrackError::not_found(EntityKind::Run, format!("{} (baseline)", token.baseline))
            })?;
        let contender_run = self
            .store_call(self.store.get_run(&token.contender))
            .await?
            .ok_or_else(|| {
                BenchtrackError::not_found(
                    EntityKind::Run,
                    format!("{} (contender)", token.contender),
                )
            })?;

        let snapshot = self.cache.snapshot().await;
        let baseline_by_case = newest_per_case(snapshot.results_for_run(&baseline_run.id));
        let contender_by_case = newest_per_case(snapshot.results_for_run(&contender_run.id));

        let mut keys: Vec<(String, String)> = baseline_by_case
            .keys()
            .chain(contender_by_case.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();

        let comparisons: Vec<Comparison> = keys
            .into_iter()
            .map(|key| {
                let baseline = baseline_by_case.get(&key).cloned();
                let contender = contender_by_case.get(&key).cloned();
                self.build_comparison(&snapshot, key, baseline, contender, threshold_z)
            })
            .collect();

        if !comparisons
            .iter()
            .any(|c| c.baseline.is_some() && c.contender.is_some())
        {
            return Err(BenchtrackError::EmptyComparison);
        }

        let hardware_drift = self
            .detect_drift(&baseline_run.hardware_id, &contender_run.hardware_id)
            .await?;

        Ok(CompareReport {
            baseline_id: token.baseline.clone(),
            contender_id: token.contender.clone(),
            comparisons,
            hardware_drift,
        })
    }

    async fn compare_results(
        &self,
        token: &CompareToken,
        threshold_z: f64,
    ) -> Result<CompareReport> {
        let baseline = self
            .store_call(self.store.get_result(&token.baseline))
            .await?
            .ok_or_else(|| {
                BenchtrackError::not_found(
                    EntityKind::BenchmarkResult,
                    format!("{} (baseline)", token.baseline),
                )
            })?;
        let contender = self
            .store_call(self.store.get_result(&token.contender))
            .await?
            .ok_or_else(|| {
                BenchtrackError::not_found(
                    EntityKind::BenchmarkResult,
                    format!("{} (contender)", token.contender),
                )
            })?;

        let hardware_drift = self
            .detect_drift(&baseline.hardware_id, &contender.hardware_id)
            .await?;

        let snapshot = self.cache.snapshot().await;
        let key = (contender.benchmark_name.clone(), contender.case_id.clone());
        let comparison = self.build_comparison(
            &snapshot,
            key,
            Some(Arc::new(baseline)),
            Some(Arc::new(contender)),
            threshold_z,
        );

        Ok(CompareReport {
            baseline_id: token.baseline.clone(),
            contender_id: token.contender.clone(),
            comparisons: vec![comparison],
            hardware_drift,
        })
    }

    fn build_comparison(
        &self,
        snapshot: &CacheSnapshot,
        key: (String, String),
        baseline: Option<Arc<BenchmarkResult>>,
        contender: Option<Arc<BenchmarkResult>>,
        threshold_z: f64,
    ) -> Comparison {
        let (benchmark_name, case_id) = key;

        let compare_token = match (&baseline, &contender) {
            (Some(b), Some(c)) => Some(CompareToken::render(&b.id, &c.id)),
            _ => None,
        };

        let (relative_change, z_score, classification) = match (&baseline, &contender) {
            (Some(b), Some(c)) => self.classify_pair(snapshot, b, c, threshold_z),
            // One-sided: no numeric classification.
            _ => (None, None, Classification::NoData),
        };

        Comparison {
            benchmark_name,
            case_id,
            baseline,
            contender,
            relative_change,
            z_score,
            classification,
            compare_token,
        }
    }

    fn classify_pair(
        &self,
        snapshot: &CacheSnapshot,
        baseline: &BenchmarkResult,
        contender: &BenchmarkResult,
        threshold_z: f64,
    ) -> (Option<f64>, Option<f64>, Classification) {
        let (Some(baseline_mean), Some(contender_mean)) = (baseline.mean, contender.mean) else {
            return (None, None, Classification::NoData);
        };
        if baseline_mean == 0.0 {
            return (None, None, Classification::NoData);
        }

        let delta = contender_mean - baseline_mean;
        let relative_change = delta / baseline_mean;
        // A change that worsens performance is a positive badness delta
        // regardless of unit direction.
        let badness = if contender.higher_is_better {
            -delta
        } else {
            delta
        };

        if let Some(stddev) = self.historical_stddev(snapshot, contender) {
            let z = badness / stddev;
            let classification = if z > threshold_z {
                Classification::Regression
            } else if z < -threshold_z {
                Classification::Improvement
            } else {
                Classification::NoChange
            };
            return (Some(relative_change), Some(z), classification);
        }

        // Not enough history for a z-score: fixed relative threshold.
        let relative_badness = badness / baseline_mean.abs();
        let classification = if relative_badness > self.config.fallback_threshold {
            Classification::Regression
        } else if relative_badness < -self.config.fallback_threshold {
            Classification::Improvement
        } else {
            Classification::NoChange
        };
        (Some(relative_change), None, classification)
    }

    /// Sample standard deviation of the historical means for the
    /// contender's (benchmark name, case, hardware, context) tuple. The
    /// contender itself is not part of its own history. `None` when fewer
    /// than the configured minimum samples exist.
    fn historical_stddev(
        &self,
        snapshot: &CacheSnapshot,
        contender: &BenchmarkResult,
    ) -> Option<f64> {
        let bucket = snapshot.lookup_by_name(&contender.benchmark_name)?;
        let means: Vec<f64> = bucket
            .iter()
            .filter(|r| {
                r.id != contender.id
                    && r.case_id == contender.case_id
                    && r.hardware_id == contender.hardware_id
                    && r.context_id == contender.context_id
            })
            .filter_map(|r| r.mean)
            .collect();
        if means.len() < self.config.min_history_samples {
            return None;
        }
        let n = means.len() as f64;
        let mean = means.iter().sum::<f64>() / n;
        let variance = means.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let stddev = variance.sqrt();
        if stddev > 0.0 {
            Some(stddev)
        } else {
            None
        }
    }

    async fn detect_drift(
        &self,
        baseline_hw_id: &str,
        contender_hw_id: &str,
    ) -> Result<Option<HardwareDrift>> {
        let baseline = self
            .store_call(self.store.get_hardware(baseline_hw_id))
            .await?;
        let contender = self
            .store_call(self.store.get_hardware(contender_hw_id))
            .await?;
        // Drift is only assessable when both hardware records exist; a
        // missing record does not fail the comparison.
        Ok(match (baseline, contender) {
            (Some(b), Some(c)) if b.checksum != c.checksum => Some(HardwareDrift {
                baseline_checksum: b.checksum,
                contender_checksum: c.checksum,
            }),
            _ => None,
        })
    }

    async fn store_call<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        timeout(self.config.store_timeout(), call)
            .await
            .map_err(|_| BenchtrackError::StoreUnavailable("store call timed out".into()))?
    }
}

/// Pick one result per (benchmark name, case) key, preferring the newest
/// by (started_at, id).
fn newest_per_case(
    results: Vec<Arc<BenchmarkResult>>,
) -> BTreeMap<(String, String), Arc<BenchmarkResult>> {
    let mut grouped: BTreeMap<(String, String), Vec<Arc<BenchmarkResult>>> = BTreeMap::new();
    for result in results {
        let key = (result.benchmark_name.clone(), result.case_id.clone());
        grouped.entry(key).or_default().push(result);
    }
    grouped
        .into_iter()
        .filter_map(|(key, group)| newest_of(&group).cloned().map(|newest| (key, newest)))
        .collect()
}

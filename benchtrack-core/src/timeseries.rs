//! Assembly of per-case time series for plotting and table display.
//!
//! A flat result list for one (benchmark name, case) is grouped into one
//! series per (hardware, context) pair, ordered, ranked, and formatted
//! into the JSON shape the client-side plots consume.

use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use benchtrack_common::config::SeriesConfig;
use benchtrack_common::types::BenchmarkResult;

/// Policy for ordering series in the case view. One comparator, swapped
/// in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesRanking {
    /// Busiest series first.
    ByCount,
    /// Series with the newest point first.
    ByRecency,
}

impl SeriesRanking {
    fn compare(&self, a: &CaseSeries, b: &CaseSeries) -> Ordering {
        let primary = match self {
            SeriesRanking::ByCount => b.results.len().cmp(&a.results.len()),
            SeriesRanking::ByRecency => {
                let newest = |s: &CaseSeries| s.results.last().map(|r| r.started_at);
                newest(b).cmp(&newest(a))
            }
        };
        // Deterministic order regardless of grouping order.
        primary.then_with(|| a.key().cmp(&b.key()))
    }
}

/// One (hardware, context) series with points ordered by start time.
#[derive(Debug, Clone)]
pub struct CaseSeries {
    pub hardware_id: String,
    pub hardware_name: String,
    pub context_id: String,
    /// Sorted by (started_at, id) ascending.
    pub results: Vec<Arc<BenchmarkResult>>,
}

impl CaseSeries {
    pub fn key(&self) -> String {
        format!("{}_{}", self.hardware_id, self.context_id)
    }

    /// Newest point; ties on start time are broken by id.
    pub fn newest(&self) -> Option<&Arc<BenchmarkResult>> {
        self.results.last()
    }
}

/// JSON shape consumed by the client-side uplot rendering, one entry per
/// series key `"{hardware_id}_{context_id}"`.
#[derive(Debug, Clone, Serialize)]
pub struct UplotSeries {
    pub title: String,
    pub url_to_newest_result: String,
    pub unit: String,
    /// `[ [timestamps...], [means...] ]`
    pub data_for_uplot: [Vec<f64>; 2],
}

/// Display-ready view of one benchmark case.
#[derive(Debug)]
pub struct CaseSeriesView {
    /// All series, ranked.
    pub series: Vec<CaseSeries>,
    /// Plot-eligible series, keyed by `"{hardware_id}_{context_id}"`.
    pub plots: IndexMap<String, UplotSeries>,
    /// Capped table rows, drawn from ranked series in order.
    pub table_rows: Vec<Arc<BenchmarkResult>>,
    /// Representative display unit for the shared plot axis.
    pub unit: String,
}

pub struct TimeSeriesAssembler {
    config: SeriesConfig,
    ranking: SeriesRanking,
}

impl TimeSeriesAssembler {
    pub fn new(config: SeriesConfig) -> Self {
        Self {
            config,
            ranking: SeriesRanking::ByCount,
        }
    }

    pub fn with_ranking(mut self, ranking: SeriesRanking) -> Self {
        self.ranking = ranking;
        self
    }

    /// Turn a flat result list for one (benchmark name, case) into
    /// display-ready series.
    pub fn assemble(
        &self,
        benchmark_name: &str,
        case_id: &str,
        results: &[Arc<BenchmarkResult>],
    ) -> CaseSeriesView {
        let mut groups: IndexMap<(String, String), CaseSeries> = IndexMap::new();
        for result in results.iter().filter(|r| r.case_id == case_id) {
            let key = (result.hardware_id.clone(), result.context_id.clone());
            groups
                .entry(key)
                .or_insert_with(|| CaseSeries {
                    hardware_id: result.hardware_id.clone(),
                    hardware_name: result.hardware_name.clone(),
                    context_id: result.context_id.clone(),
                    results: Vec::new(),
                })
                .results
                .push(Arc::clone(result));
        }

        let mut series: Vec<CaseSeries> = groups.into_values().collect();
        for s in &mut series {
            s.results
                .sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        }
        series.sort_by(|a, b| self.ranking.compare(a, b));

        let table_rows = self.collect_table_rows(&series);
        let (plots, unit) = self.build_plots(benchmark_name, case_id, &series);

        CaseSeriesView {
            series,
            plots,
            table_rows,
            unit,
        }
    }

    /// Walk ranked series in order, filling the table up to the cap. A
    /// series reached after the cap is exhausted contributes nothing; a
    /// series hit mid-way is truncated.
    fn collect_table_rows(&self, series: &[CaseSeries]) -> Vec<Arc<BenchmarkResult>> {
        let cap = self.config.table_row_cap;
        let mut rows = Vec::new();
        for s in series {
            if rows.len() >= cap {
                break;
            }
            let remaining = cap - rows.len();
            rows.extend(s.results.iter().take(remaining).cloned());
        }
        rows
    }

    fn build_plots(
        &self,
        benchmark_name: &str,
        case_id: &str,
        series: &[CaseSeries],
    ) -> (IndexMap<String, UplotSeries>, String) {
        let mut plots = IndexMap::new();
        let mut units_seen: Vec<String> = Vec::new();

        for s in series {
            if s.results.len() < self.config.min_plot_points {
                continue;
            }
            let Some(newest) = s.newest() else {
                continue;
            };

            for r in &s.results {
                if !units_seen.contains(&r.unit) {
                    units_seen.push(r.unit.clone());
                }
            }

            // Results without a mean carry no plottable point; dropping
            // them keeps the two arrays aligned.
            let mut timestamps = Vec::with_capacity(s.results.len());
            let mut means = Vec::with_capacity(s.results.len());
            for r in &s.results {
                if let Some(mean) = r.mean {
                    timestamps.push(r.started_at.timestamp_millis() as f64 / 1000.0);
                    means.push(mean);
                }
            }

            let ctx_short: String = s.context_id.chars().take(7).collect();
            plots.insert(
                s.key(),
                UplotSeries {
                    title: format!(
                        "hardware: {}, context: {}, {} results",
                        s.hardware_name,
                        ctx_short,
                        s.results.len()
                    ),
                    url_to_newest_result: result_url(&newest.id),
                    unit: newest.unit.clone(),
                    data_for_uplot: [timestamps, means],
                },
            );
        }

        if units_seen.len() > 1 {
            warn!(
                "mixed units for benchmark `{}` case `{}`: {:?}",
                benchmark_name, case_id, units_seen
            );
        }

        // Deterministic representative: lexicographically smallest.
        units_seen.sort();
        let unit = units_seen
            .first()
            .map(|u| longer_unit(u).to_string())
            .unwrap_or_default();

        (plots, unit)
    }
}

/// Link token for one benchmark result.
pub fn result_url(result_id: &str) -> String {
    format!("/benchmark-results/{result_id}")
}

/// A longer unit reads better on the ordinate of a plot. Unmapped units
/// pass through unchanged.
pub fn longer_unit(unit: &str) -> &str {
    match unit {
        "s" => "seconds",
        "i/s" => "iterations / second",
        other => other,
    }
}

/// Newest result of a non-empty list; ties on start time broken by id.
pub fn newest_of<'a>(results: &'a [Arc<BenchmarkResult>]) -> Option<&'a Arc<BenchmarkResult>> {
    results
        .iter()
        .max_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn result(id: &str, hw: &str, ctx: &str, offset_secs: i64, unit: &str) -> Arc<BenchmarkResult> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Arc::new(BenchmarkResult {
            id: id.to_string(),
            benchmark_name: "read".into(),
            case_id: "case-1".into(),
            case_text_id: "case-1".into(),
            hardware_id: hw.to_string(),
            hardware_name: format!("name-{hw}"),
            context_id: ctx.to_string(),
            run_id: "run-1".into(),
            started_at: base + Duration::seconds(offset_secs),
            mean: Some(1.0),
            unit: unit.into(),
            higher_is_better: false,
        })
    }

    fn assembler() -> TimeSeriesAssembler {
        TimeSeriesAssembler::new(SeriesConfig::default())
    }

    fn group(hw: &str, n: usize) -> Vec<Arc<BenchmarkResult>> {
        (0..n)
            .map(|i| result(&format!("{hw}-{i}"), hw, "ctx", i as i64, "s"))
            .collect()
    }

    #[test]
    fn test_ranking_and_plot_eligibility() {
        // Groups with 5, 2 and 10 results.
        let mut results = group("hw5", 5);
        results.extend(group("hw2", 2));
        results.extend(group("hw10", 10));

        let view = assembler().assemble("read", "case-1", &results);

        let ranked: Vec<&str> = view.series.iter().map(|s| s.hardware_id.as_str()).collect();
        assert_eq!(ranked, vec!["hw10", "hw5", "hw2"]);

        // Only the 10- and 5-count groups qualify for plotting.
        assert_eq!(view.plots.len(), 2);
        assert!(view.plots.contains_key("hw10_ctx"));
        assert!(view.plots.contains_key("hw5_ctx"));
        assert!(!view.plots.contains_key("hw2_ctx"));
    }

    #[test]
    fn test_recency_ranking() {
        let mut results = group("old", 5);
        // Smaller series whose newest point is more recent.
        results.push(result("new-0", "new", "ctx", 1000, "s"));
        results.push(result("new-1", "new", "ctx", 1001, "s"));

        let view = TimeSeriesAssembler::new(SeriesConfig::default())
            .with_ranking(SeriesRanking::ByRecency)
            .assemble("read", "case-1", &results);
        let ranked: Vec<&str> = view.series.iter().map(|s| s.hardware_id.as_str()).collect();
        assert_eq!(ranked, vec!["new", "old"]);
    }

    #[test]
    fn test_point_order_ties_broken_by_id() {
        let results = vec![
            result("b", "hw", "ctx", 0, "s"),
            result("a", "hw", "ctx", 0, "s"),
            result("c", "hw", "ctx", 1, "s"),
        ];
        let view = assembler().assemble("read", "case-1", &results);
        let ids: Vec<&str> = view.series[0].results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(view.series[0].newest().unwrap().id, "c");
    }

    #[test]
    fn test_table_cap_truncates_mid_series() {
        let config = SeriesConfig {
            table_row_cap: 7,
            min_plot_points: 3,
        };
        let mut results = group("hw10", 10);
        results.extend(group("hw5", 5));

        let view = TimeSeriesAssembler::new(config).assemble("read", "case-1", &results);
        assert_eq!(view.table_rows.len(), 7);
        // The first series fills the cap; the second contributes nothing.
        assert!(view.table_rows.iter().all(|r| r.hardware_id == "hw10"));
    }

    #[test]
    fn test_table_cap_exact_boundary_skips_next_series() {
        let config = SeriesConfig {
            table_row_cap: 10,
            min_plot_points: 3,
        };
        let mut results = group("hw10", 10);
        results.extend(group("hw5", 5));

        let view = TimeSeriesAssembler::new(config).assemble("read", "case-1", &results);
        assert_eq!(view.table_rows.len(), 10);
        assert!(view.table_rows.iter().all(|r| r.hardware_id == "hw10"));
    }

    #[test]
    fn test_mixed_units_pick_lexicographically_smallest() {
        let mut results: Vec<Arc<BenchmarkResult>> = (0..3)
            .map(|i| result(&format!("a-{i}"), "hw1", "ctx", i, "s"))
            .collect();
        results.extend((0..3).map(|i| result(&format!("b-{i}"), "hw2", "ctx", i, "i/s")));

        let view = assembler().assemble("read", "case-1", &results);
        // "i/s" < "s" lexicographically, then mapped for display.
        assert_eq!(view.unit, "iterations / second");
    }

    #[test]
    fn test_unit_display_mapping() {
        assert_eq!(longer_unit("s"), "seconds");
        assert_eq!(longer_unit("i/s"), "iterations / second");
        assert_eq!(longer_unit("B/s"), "B/s");
    }

    #[test]
    fn test_uplot_json_shape() {
        let results = group("hw", 3);
        let view = assembler().assemble("read", "case-1", &results);
        let json = serde_json::to_value(&view.plots).unwrap();
        let plot = &json["hw_ctx"];
        assert!(plot["title"].as_str().unwrap().contains("name-hw"));
        assert!(plot["url_to_newest_result"]
            .as_str()
            .unwrap()
            .ends_with("hw-2"));
        assert_eq!(plot["data_for_uplot"][0].as_array().unwrap().len(), 3);
        assert_eq!(plot["data_for_uplot"][1].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_failed_results_excluded_from_means() {
        let mut results = group("hw", 3);
        let mut failed = (*result("hw-3", "hw", "ctx", 9, "s")).clone();
        failed.mean = None;
        results.push(Arc::new(failed));

        let view = assembler().assemble("read", "case-1", &results);
        let plot = &view.plots["hw_ctx"];
        // Both arrays stay aligned: the point without a mean is dropped.
        assert_eq!(plot.data_for_uplot[0].len(), 3);
        assert_eq!(plot.data_for_uplot[1].len(), 3);
    }
}

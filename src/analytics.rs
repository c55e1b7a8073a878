use std::collections::BTreeMap;

use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    columns,
    data::Cell,
    derive::{ct_deviation, efficiency_ratios},
    error::{ReconError, ReconResult},
    table::Table,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    pub low: f64,
    pub high: f64,
    pub ct_deviation_pct: f64,
    pub top_n: usize,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            low: 0.8,
            high: 1.05,
            ct_deviation_pct: 20.0,
            top_n: 10,
        }
    }
}

impl AnomalyThresholds {
    pub fn validate(&self) -> ReconResult<()> {
        for (parameter, value) in [
            ("anomaly.low", self.low),
            ("anomaly.high", self.high),
            ("anomaly.ct_deviation_pct", self.ct_deviation_pct),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ReconError::invalid(parameter, "must be a non-negative number"));
            }
        }
        if self.low >= self.high {
            return Err(ReconError::invalid(
                "anomaly.low",
                format!("must be below anomaly.high ({})", self.high),
            ));
        }
        if self.top_n == 0 {
            return Err(ReconError::invalid("anomaly.top_n", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StationAccumulator {
    pub efficiency_sum: f64,
    pub efficiency_count: usize,
    pub rows: usize,
}

impl StationAccumulator {
    pub fn push(&mut self, efficiency: Option<f64>) {
        self.rows += 1;
        if let Some(value) = efficiency {
            self.efficiency_sum += value;
            self.efficiency_count += 1;
        }
    }

    pub fn merge(&mut self, other: &StationAccumulator) {
        self.efficiency_sum += other.efficiency_sum;
        self.efficiency_count += other.efficiency_count;
        self.rows += other.rows;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.efficiency_count > 0).then(|| self.efficiency_sum / self.efficiency_count as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationAggregates {
    groups: BTreeMap<String, StationAccumulator>,
}

impl StationAggregates {
    pub fn ingest(&mut self, station: &Cell, efficiency: Option<f64>) {
        if let Some(name) = station.key_text() {
            self.groups.entry(name).or_default().push(efficiency);
        }
    }

    pub fn merge(&mut self, other: &StationAggregates) {
        for (station, acc) in &other.groups {
            self.groups.entry(station.clone()).or_default().merge(acc);
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn metrics(&self) -> Vec<StationMetric> {
        self.groups
            .iter()
            .map(|(station, acc)| StationMetric {
                station: station.clone(),
                mean_efficiency_pct: acc.mean().map(|m| m * 100.0),
                head_count: acc.rows,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMetric {
    pub station: String,
    pub mean_efficiency_pct: Option<f64>,
    pub head_count: usize,
}

pub fn station_metrics_table(metrics: &[StationMetric]) -> Table {
    let mut table = Table::with_columns(&[columns::STATION, columns::EFFICIENCY, columns::HEAD_COUNT]);
    for metric in metrics {
        table.push_row(vec![
            Cell::text(metric.station.clone()),
            Cell::from_option(metric.mean_efficiency_pct),
            Cell::Number(metric.head_count as f64),
        ]);
    }
    table
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EfficiencySummary {
    pub count: usize,
    pub mean_pct: Option<f64>,
    pub max_pct: Option<f64>,
    pub min_pct: Option<f64>,
    pub std_dev_pct: Option<f64>,
}

impl EfficiencySummary {
    pub fn from_ratios(ratios: &[Option<f64>]) -> Self {
        let values: Vec<f64> = ratios.iter().flatten().map(|r| r * 100.0).collect();
        let count = values.len();
        if count == 0 {
            return Self::default();
        }
        let mean = values.iter().sum::<f64>() / count as f64;
        let std_dev_pct = (count > 1).then(|| {
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        });
        Self {
            count,
            mean_pct: Some(mean),
            max_pct: values.iter().copied().reduce(f64::max),
            min_pct: values.iter().copied().reduce(f64::min),
            std_dev_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsResult {
    pub analysis: Table,
    pub efficiencies: Vec<Option<f64>>,
    pub station_metrics: Vec<StationMetric>,
    pub low_efficiency: Table,
    pub high_efficiency: Table,
    pub ct_abnormal: Table,
    pub top_performers: Table,
    pub summary: EfficiencySummary,
    pub has_ct: bool,
}

impl AnalyticsResult {
    pub fn station_count(&self) -> usize {
        self.station_metrics.len()
    }
}

pub fn analyze(filtered: &Table, thresholds: &AnomalyThresholds) -> ReconResult<AnalyticsResult> {
    thresholds.validate()?;
    let efficiencies = check_schema(filtered)?;

    let mut analysis = filtered.clone();
    analysis.set_column(
        columns::EFFICIENCY,
        efficiencies.iter().map(|e| Cell::from_option(*e)).collect(),
    );

    let has_ct = analysis.has_column(columns::STANDARD_CT) && analysis.has_column(columns::ACTUAL_CT);
    let mut deviation_rates: Vec<Option<f64>> = Vec::new();
    if has_ct {
        let standard = analysis.numeric_column(columns::STANDARD_CT).unwrap_or_default();
        let actual = analysis.numeric_column(columns::ACTUAL_CT).unwrap_or_default();
        let (deviations, rates): (Vec<Option<f64>>, Vec<Option<f64>>) = standard
            .iter()
            .zip(&actual)
            .map(|(s, a)| ct_deviation(*s, *a))
            .unzip();
        analysis.set_column(columns::STANDARD_CT, standard.into_iter().map(Cell::from_option).collect());
        analysis.set_column(columns::ACTUAL_CT, actual.into_iter().map(Cell::from_option).collect());
        analysis.set_column(columns::CT_DEVIATION, deviations.into_iter().map(Cell::from_option).collect());
        analysis.set_column(
            columns::CT_DEVIATION_RATE,
            rates.iter().map(|r| Cell::from_option(*r)).collect(),
        );
        deviation_rates = rates;
    } else {
        debug!("CT columns absent; CT anomaly table left empty");
    }

    let station_idx = analysis.column_index(columns::STATION).unwrap_or_default();
    let mut aggregates = StationAggregates::default();
    for (row, efficiency) in efficiencies.iter().enumerate() {
        aggregates.ingest(analysis.cell(row, station_idx), *efficiency);
    }
    let station_metrics = aggregates.metrics();

    let low_rows = matching_rows(&efficiencies, |e| e < thresholds.low);
    let high_rows = matching_rows(&efficiencies, |e| e > thresholds.high);
    let ct_abnormal = if has_ct {
        let rows = matching_rows(&deviation_rates, |r| r.abs() > thresholds.ct_deviation_pct);
        analysis.select_rows(&rows).project(columns::CT_ANOMALY_COLUMNS)
    } else {
        Table::with_columns(columns::CT_ANOMALY_COLUMNS)
    };
    let top_rows = rank_by_efficiency(&efficiencies, thresholds.top_n);

    let result = AnalyticsResult {
        low_efficiency: analysis.select_rows(&low_rows),
        high_efficiency: analysis.select_rows(&high_rows),
        top_performers: analysis.select_rows(&top_rows),
        summary: EfficiencySummary::from_ratios(&efficiencies),
        ct_abnormal,
        station_metrics,
        efficiencies,
        analysis,
        has_ct,
    };

    info!(
        "Analyzed {} record(s) across {} station(s): {} low, {} high, {} CT anomalies",
        result.analysis.len(),
        result.station_count(),
        result.low_efficiency.len(),
        result.high_efficiency.len(),
        result.ct_abnormal.len()
    );
    if result.station_metrics.is_empty() {
        warn!("No stations to aggregate");
    }
    Ok(result)
}

fn check_schema(table: &Table) -> ReconResult<Vec<Option<f64>>> {
    let mut missing: Vec<String> = [columns::STATION, columns::NAME]
        .into_iter()
        .filter(|col| !table.has_column(col))
        .map(str::to_string)
        .collect();
    let efficiencies = efficiency_ratios(table);
    if efficiencies.is_none() {
        missing.push(format!("{} or {}", columns::EFFICIENCY, columns::EFFICIENCY_PCT));
    }
    match efficiencies {
        Some(values) if missing.is_empty() => Ok(values),
        _ => Err(ReconError::InsufficientSchema { missing }),
    }
}

fn matching_rows<F>(values: &[Option<f64>], predicate: F) -> Vec<usize>
where
    F: Fn(f64) -> bool,
{
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_some_and(&predicate))
        .map(|(idx, _)| idx)
        .collect()
}

// Ties keep input order; rows without an efficiency rank last.
pub fn rank_by_efficiency(efficiencies: &[Option<f64>], n: usize) -> Vec<usize> {
    (0..efficiencies.len())
        .sorted_by(|&a, &b| match (efficiencies[a], efficiencies[b]) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
        .take(n)
        .collect()
}

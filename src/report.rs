use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime};
use log::warn;
use serde::Serialize;

use crate::{
    analytics::{AnalyticsResult, EfficiencySummary, StationMetric, station_metrics_table},
    error::{ReconError, ReconResult},
    table::Table,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestStation {
    pub station: String,
    pub mean_efficiency_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub generated_at: NaiveDateTime,
    pub record_count: usize,
    pub station_count: usize,
    pub overall_mean_efficiency_pct: Option<f64>,
    pub qualification_rate_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_station: Option<BestStation>,
    pub efficiency: EfficiencySummary,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fingerprints: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportBundle {
    pub summary: ReportSummary,
    pub filtered: Table,
    pub station_metrics: Vec<StationMetric>,
    pub top_performers: Table,
    pub low_efficiency: Table,
    pub high_efficiency: Table,
    pub ct_abnormal: Table,
    pub attachments: BTreeMap<String, String>,
}

impl ReportBundle {
    pub fn attach(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.attachments.insert(name.into(), content.into());
    }

    pub fn station_metrics_table(&self) -> Table {
        station_metrics_table(&self.station_metrics)
    }

    pub fn tables(&self) -> Vec<(&'static str, Table)> {
        vec![
            ("filtered", self.filtered.clone()),
            ("station_metrics", self.station_metrics_table()),
            ("top_performers", self.top_performers.clone()),
            ("low_efficiency", self.low_efficiency.clone()),
            ("high_efficiency", self.high_efficiency.clone()),
            ("ct_abnormal", self.ct_abnormal.clone()),
        ]
    }
}

pub fn best_station(metrics: &[StationMetric]) -> ReconResult<BestStation> {
    let mut best: Option<&StationMetric> = None;
    let mut best_pct = f64::NEG_INFINITY;
    for metric in metrics {
        if let Some(pct) = metric.mean_efficiency_pct
            && pct > best_pct
        {
            best = Some(metric);
            best_pct = pct;
        }
    }
    best.map(|metric| BestStation {
        station: metric.station.clone(),
        mean_efficiency_pct: best_pct,
    })
    .ok_or(ReconError::EmptyStationSet)
}

pub fn qualification_rate(efficiencies: &[Option<f64>], low: f64) -> Option<f64> {
    if efficiencies.is_empty() {
        return None;
    }
    let qualified = efficiencies
        .iter()
        .filter(|e| e.is_some_and(|v| v >= low))
        .count();
    Some(qualified as f64 / efficiencies.len() as f64 * 100.0)
}

pub fn assemble(
    filtered: &Table,
    analytics: &AnalyticsResult,
    low_threshold: f64,
) -> ReportBundle {
    let best = match best_station(&analytics.station_metrics) {
        Ok(best) => Some(best),
        Err(err) => {
            warn!("{err}; best station omitted from the report");
            None
        }
    };
    let summary = ReportSummary {
        generated_at: Local::now().naive_local(),
        record_count: analytics.analysis.len(),
        station_count: analytics.station_count(),
        overall_mean_efficiency_pct: analytics.summary.mean_pct,
        qualification_rate_pct: qualification_rate(&analytics.efficiencies, low_threshold),
        best_station: best,
        efficiency: analytics.summary.clone(),
        fingerprints: BTreeMap::new(),
    };
    ReportBundle {
        summary,
        filtered: filtered.clone(),
        station_metrics: analytics.station_metrics.clone(),
        top_performers: analytics.top_performers.clone(),
        low_efficiency: analytics.low_efficiency.clone(),
        high_efficiency: analytics.high_efficiency.clone(),
        ct_abnormal: analytics.ct_abnormal.clone(),
        attachments: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analytics::{AnomalyThresholds, analyze},
        columns,
        data::Cell,
    };

    fn metric(station: &str, pct: Option<f64>) -> StationMetric {
        StationMetric {
            station: station.to_string(),
            mean_efficiency_pct: pct,
            head_count: 1,
        }
    }

    #[test]
    fn best_station_prefers_first_on_ties() {
        let metrics = vec![
            metric("A", Some(90.0)),
            metric("B", Some(95.0)),
            metric("C", Some(95.0)),
            metric("D", None),
        ];
        let best = best_station(&metrics).unwrap();
        assert_eq!(best.station, "B");
    }

    #[test]
    fn best_station_on_empty_set_is_an_error() {
        assert!(matches!(best_station(&[]), Err(ReconError::EmptyStationSet)));
        assert!(best_station(&[metric("A", None)]).is_err());
    }

    #[test]
    fn qualification_rate_counts_missing_as_unqualified() {
        let rate = qualification_rate(&[Some(0.8), Some(0.7), None, Some(1.0)], 0.8).unwrap();
        assert!((rate - 50.0).abs() < 1e-9);
        assert_eq!(qualification_rate(&[], 0.8), None);
    }

    #[test]
    fn assemble_omits_best_station_when_empty() {
        let filtered = Table::with_columns(&[columns::STATION, columns::NAME, columns::EFFICIENCY]);
        let analytics = analyze(&filtered, &AnomalyThresholds::default()).unwrap();
        let bundle = assemble(&filtered, &analytics, 0.8);
        assert!(bundle.summary.best_station.is_none());
        assert_eq!(bundle.summary.record_count, 0);
        assert_eq!(bundle.tables().len(), 6);
    }

    #[test]
    fn assemble_exposes_tables_unchanged() {
        let filtered = Table::from_rows(
            vec![columns::STATION.into(), columns::NAME.into(), columns::EFFICIENCY.into()],
            vec![
                vec![Cell::text("A"), Cell::text("a"), Cell::Number(0.7)],
                vec![Cell::text("B"), Cell::text("b"), Cell::Number(1.0)],
            ],
        );
        let analytics = analyze(&filtered, &AnomalyThresholds::default()).unwrap();
        let mut bundle = assemble(&filtered, &analytics, 0.8);
        bundle.attach("efficiency_histogram", "<div></div>");

        assert_eq!(bundle.filtered, filtered);
        assert_eq!(bundle.low_efficiency, analytics.low_efficiency);
        assert_eq!(bundle.summary.best_station.as_ref().unwrap().station, "B");
        assert!((bundle.summary.qualification_rate_pct.unwrap() - 50.0).abs() < 1e-9);
        assert!((bundle.summary.overall_mean_efficiency_pct.unwrap() - 85.0).abs() < 1e-9);
        assert_eq!(bundle.attachments.len(), 1);
    }
}

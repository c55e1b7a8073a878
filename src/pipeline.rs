//! End-to-end reconciliation run. Each run owns its intermediate tables;
//! the source tables are only read.

use log::{info, warn};
use serde::Serialize;

use crate::{
    analytics::{self, AnalyticsResult},
    columns,
    config::ReconConfig,
    derive::{self, DeriveOutcome},
    error::ReconResult,
    filter::FilterCondition,
    join::{self, JoinOptions, JoinOutcome},
    normalize,
    quality::{self, FilterOutcome},
    report::{self, ReportBundle},
    table::Table,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub labor_rows: usize,
    pub output_rows: usize,
    pub labor_dropped_keys: usize,
    pub output_dropped_keys: usize,
    pub merged_rows: usize,
    pub matched_pairs: usize,
    pub filtered_rows: usize,
    pub filter_rate_pct: Option<f64>,
}

impl ProcessingStats {
    fn filter_rate(merged: usize, kept: usize) -> Option<f64> {
        (merged > 0).then(|| (merged - kept) as f64 / merged as f64 * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeRun {
    pub labor: Table,
    pub output: Table,
    pub joined: JoinOutcome,
    pub derived: DeriveOutcome,
}

impl MergeRun {
    pub fn merged(&self) -> &Table {
        &self.derived.table
    }
}

#[derive(Debug)]
pub struct Analysis {
    pub analytics: AnalyticsResult,
    pub report: ReportBundle,
}

#[derive(Debug)]
pub struct PipelineRun {
    pub merge: MergeRun,
    pub analysis_input: Table,
    pub filtered: FilterOutcome,
    pub analysis: ReconResult<Analysis>,
    pub stats: ProcessingStats,
}

impl PipelineRun {
    pub fn merged(&self) -> &Table {
        self.merge.merged()
    }

    pub fn filtered_table(&self) -> &Table {
        &self.filtered.table
    }

    pub fn report(&self) -> ReconResult<&ReportBundle> {
        match &self.analysis {
            Ok(analysis) => Ok(&analysis.report),
            Err(err) => Err(err.clone()),
        }
    }
}

pub struct Pipeline<'a> {
    config: &'a ReconConfig,
    conditions: Vec<FilterCondition>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a ReconConfig) -> Self {
        Self {
            config,
            conditions: Vec::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<FilterCondition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn merge(&self, labor: &Table, output: &Table) -> ReconResult<MergeRun> {
        self.config.validate()?;
        let mappings = &self.config.mappings;
        let labor = normalize::normalize(labor, &mappings.labor)?;
        let output = normalize::normalize(output, &mappings.output)?;

        let options = JoinOptions {
            keys: &self.config.join.keys,
            mode: self.config.join.mode,
            suffixes: &self.config.join.suffixes,
        };
        let joined = join::join(&labor, &output, &options)?;
        let merged = normalize::normalize(&joined.table, &mappings.merged)?;
        let derived = derive::derive(&merged, &self.config.derive)?;
        Ok(MergeRun {
            labor,
            output,
            joined,
            derived,
        })
    }

    pub fn run(&self, labor: &Table, output: &Table) -> ReconResult<PipelineRun> {
        let merge = self.merge(labor, output)?;
        let analysis_input = if self.config.analysis.project_columns {
            merge.merged().project(columns::ANALYSIS_COLUMNS)
        } else {
            merge.merged().clone()
        };
        let filtered =
            quality::filter_with_conditions(&analysis_input, &self.config.quality, &self.conditions)?;

        let stats = ProcessingStats {
            labor_rows: labor.len(),
            output_rows: output.len(),
            labor_dropped_keys: merge.joined.dropped_left,
            output_dropped_keys: merge.joined.dropped_right,
            merged_rows: merge.merged().len(),
            matched_pairs: merge.joined.matched_pairs,
            filtered_rows: filtered.table.len(),
            filter_rate_pct: ProcessingStats::filter_rate(
                merge.merged().len(),
                filtered.table.len(),
            ),
        };

        let analysis = analytics::analyze(&filtered.table, &self.config.anomaly).map(|analytics| {
            let report = report::assemble(&filtered.table, &analytics, self.config.anomaly.low);
            Analysis { analytics, report }
        });
        if let Err(err) = &analysis {
            warn!("{err}; merged and filtered tables are still available");
        }
        info!(
            "Pipeline finished: {} merged row(s), {} after filtering",
            stats.merged_rows, stats.filtered_rows
        );
        Ok(PipelineRun {
            merge,
            analysis_input,
            filtered,
            analysis,
            stats,
        })
    }

    pub fn report_from_filtered(&self, filtered: &Table) -> ReconResult<ReportBundle> {
        self.config.anomaly.validate()?;
        let result = analytics::analyze(filtered, &self.config.anomaly)?;
        Ok(report::assemble(filtered, &result, self.config.anomaly.low))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Cell, error::ReconError};

    fn labor() -> Table {
        Table::from_rows(
            vec![
                "工號".into(),
                columns::NAME.into(),
                "工作內容".into(),
                "作業時間".into(),
                columns::THEORETICAL_OUTPUT.into(),
            ],
            vec![
                vec![Cell::text("E1"), Cell::text("王小明"), Cell::text("A1"), Cell::text("30"), Cell::text("150")],
                vec![Cell::text("E2"), Cell::text("李大華"), Cell::text("A1"), Cell::text("40"), Cell::text("100")],
                vec![Cell::text("E3"), Cell::text("MFGR"), Cell::text("B2"), Cell::text("30"), Cell::text("100")],
                vec![Cell::Missing, Cell::text("無工號"), Cell::text("B2"), Cell::text("30"), Cell::text("100")],
            ],
        )
    }

    fn output() -> Table {
        Table::from_rows(
            vec!["工號".into(), "產出".into(), "RUN總時數".into()],
            vec![
                vec![Cell::text(" E1 "), Cell::text("100"), Cell::text("1")],
                vec![Cell::text("E2"), Cell::text("95"), Cell::text("1")],
                vec![Cell::text("E3"), Cell::text("90"), Cell::text("1")],
            ],
        )
    }

    fn config() -> ReconConfig {
        let mut config = ReconConfig::default();
        config.join.keys = vec!["工號".to_string()];
        config
    }

    #[test]
    fn full_run_produces_every_artifact() {
        let config = config();
        let run = Pipeline::new(&config).run(&labor(), &output()).unwrap();

        assert_eq!(run.stats.labor_rows, 4);
        assert_eq!(run.stats.labor_dropped_keys, 1);
        assert_eq!(run.stats.merged_rows, 3);
        assert_eq!(run.stats.matched_pairs, 3);
        // MFGR row removed by the reserved-name predicate
        assert_eq!(run.stats.filtered_rows, 2);
        assert!((run.stats.filter_rate_pct.unwrap() - 100.0 / 3.0).abs() < 1e-9);

        assert!(run.merged().has_column(columns::STANDARD_CT));
        assert!(run.merged().has_column(columns::ACTUAL_CT));
        assert_eq!(
            run.analysis_input.headers()[..3],
            [columns::STATION, columns::NAME, columns::OPERATING_HOURS]
        );

        let bundle = run.report().unwrap();
        assert_eq!(bundle.summary.record_count, 2);
        assert_eq!(bundle.summary.station_count, 1);
        assert_eq!(bundle.low_efficiency.len(), 1);
    }

    #[test]
    fn insufficient_schema_keeps_upstream_tables() {
        let mut config = config();
        config.mappings.labor = normalize::SchemaMapping::new([("作業時間", "標工")]);
        let run = Pipeline::new(&config).run(&labor(), &output()).unwrap();
        assert!(matches!(
            run.analysis,
            Err(ReconError::InsufficientSchema { .. })
        ));
        assert_eq!(run.merged().len(), 3);
        // The bundle accessor surfaces the analytics failure itself
        assert!(matches!(
            run.report(),
            Err(ReconError::InsufficientSchema { .. })
        ));
    }

    #[test]
    fn empty_keys_fail_before_joining() {
        let config = ReconConfig::default();
        let err = Pipeline::new(&config).merge(&labor(), &output()).unwrap_err();
        assert!(matches!(err, ReconError::EmptyJoinKeys));
    }

    #[test]
    fn sources_are_left_untouched() {
        let config = config();
        let (l, o) = (labor(), output());
        Pipeline::new(&config).run(&l, &o).unwrap();
        assert_eq!(l, labor());
        assert_eq!(o, output());
    }

    #[test]
    fn report_restarts_from_filtered_table() {
        let config = config();
        let run = Pipeline::new(&config).run(&labor(), &output()).unwrap();
        let bundle = Pipeline::new(&config)
            .report_from_filtered(run.filtered_table())
            .unwrap();
        assert_eq!(bundle.station_metrics, run.report().unwrap().station_metrics);
    }
}

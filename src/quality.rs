//! Data quality filter: a conjunction of inclusion predicates that removes
//! noise rows from the merged table.
//!
//! A predicate is active only when the column it reads exists. Rows are
//! never altered; the kept table is a subset of the input in input order.

use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    columns,
    data::Cell,
    derive::efficiency_ratios,
    error::{ReconError, ReconResult},
    filter::{self, FilterCondition},
    table::Table,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentWindow {
    pub min: f64,
    pub max: f64,
}

impl PercentWindow {
    pub fn contains_ratio(&self, ratio: f64) -> bool {
        let pct = ratio * 100.0;
        pct >= self.min && pct <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub min_operating_hours: f64,
    pub efficiency_window_pct: PercentWindow,
    pub reserved_names: Vec<String>,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_operating_hours: 0.03,
            efficiency_window_pct: PercentWindow {
                min: 20.0,
                max: 150.0,
            },
            reserved_names: vec!["MFGR".to_string(), "MFG_R".to_string()],
        }
    }
}

impl QualityThresholds {
    pub fn validate(&self) -> ReconResult<()> {
        if !self.min_operating_hours.is_finite() || self.min_operating_hours < 0.0 {
            return Err(ReconError::invalid(
                "quality.min_operating_hours",
                "must be a non-negative number",
            ));
        }
        let window = self.efficiency_window_pct;
        if !window.min.is_finite() || !window.max.is_finite() || window.min > window.max {
            return Err(ReconError::invalid(
                "quality.efficiency_window_pct",
                format!("min {} must not exceed max {}", window.min, window.max),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPredicate {
    MinOperatingHours,
    NonNegativeOutput,
    NonNegativeCycleTime,
    UsableEfficiency,
    NotReservedName,
    EfficiencyWindow,
    StationPresent,
    StandardCtPresent,
    NamePresent,
}

impl QualityPredicate {
    pub const ALL: [QualityPredicate; 9] = [
        QualityPredicate::MinOperatingHours,
        QualityPredicate::NonNegativeOutput,
        QualityPredicate::NonNegativeCycleTime,
        QualityPredicate::UsableEfficiency,
        QualityPredicate::NotReservedName,
        QualityPredicate::EfficiencyWindow,
        QualityPredicate::StationPresent,
        QualityPredicate::StandardCtPresent,
        QualityPredicate::NamePresent,
    ];

    pub fn column(self) -> &'static str {
        match self {
            QualityPredicate::MinOperatingHours => columns::OPERATING_HOURS,
            QualityPredicate::NonNegativeOutput => columns::ACTUAL_OUTPUT,
            QualityPredicate::NonNegativeCycleTime => columns::ACTUAL_CT,
            QualityPredicate::UsableEfficiency | QualityPredicate::EfficiencyWindow => {
                columns::EFFICIENCY
            }
            QualityPredicate::NotReservedName | QualityPredicate::NamePresent => columns::NAME,
            QualityPredicate::StationPresent => columns::STATION,
            QualityPredicate::StandardCtPresent => columns::STANDARD_CT,
        }
    }

    fn is_active(self, table: &Table, has_efficiency: bool) -> bool {
        match self {
            QualityPredicate::UsableEfficiency | QualityPredicate::EfficiencyWindow => {
                has_efficiency
            }
            other => table.has_column(other.column()),
        }
    }
}

impl fmt::Display for QualityPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityPredicate::MinOperatingHours => "min_operating_hours",
            QualityPredicate::NonNegativeOutput => "non_negative_output",
            QualityPredicate::NonNegativeCycleTime => "non_negative_cycle_time",
            QualityPredicate::UsableEfficiency => "usable_efficiency",
            QualityPredicate::NotReservedName => "not_reserved_name",
            QualityPredicate::EfficiencyWindow => "efficiency_window",
            QualityPredicate::StationPresent => "station_present",
            QualityPredicate::StandardCtPresent => "standard_ct_present",
            QualityPredicate::NamePresent => "name_present",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    Predicate(QualityPredicate),
    Condition(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Predicate(p) => write!(f, "{p}"),
            DropReason::Condition(c) => write!(f, "condition on '{c}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub table: Table,
    pub kept_rows: Vec<usize>,
    pub dropped: usize,
    pub active: Vec<QualityPredicate>,
    pub conditions_applied: usize,
    pub drop_counts: Vec<(DropReason, usize)>,
}

impl FilterOutcome {
    pub fn is_noop(&self) -> bool {
        self.active.is_empty() && self.conditions_applied == 0
    }
}

struct RowView {
    hours: Option<Vec<Option<f64>>>,
    output: Option<Vec<Option<f64>>>,
    cycle_time: Option<Vec<Option<f64>>>,
    efficiency: Option<Vec<Option<f64>>>,
    name: Option<usize>,
    station: Option<usize>,
    standard_ct: Option<usize>,
}

impl RowView {
    fn new(table: &Table) -> Self {
        Self {
            hours: table.numeric_column(columns::OPERATING_HOURS),
            output: table.numeric_column(columns::ACTUAL_OUTPUT),
            cycle_time: table.numeric_column(columns::ACTUAL_CT),
            efficiency: efficiency_ratios(table),
            name: table.column_index(columns::NAME),
            station: table.column_index(columns::STATION),
            standard_ct: table.column_index(columns::STANDARD_CT),
        }
    }

    fn numeric_or_zero(values: &Option<Vec<Option<f64>>>, row: usize) -> f64 {
        values
            .as_ref()
            .and_then(|v| v[row])
            .unwrap_or(0.0)
    }

    fn efficiency(&self, row: usize) -> Option<f64> {
        self.efficiency.as_ref().and_then(|v| v[row])
    }

    fn present(table: &Table, column: Option<usize>, row: usize) -> bool {
        column.is_some_and(|col| table.cell(row, col).is_present())
    }

    fn check(
        &self,
        table: &Table,
        predicate: QualityPredicate,
        row: usize,
        thresholds: &QualityThresholds,
    ) -> bool {
        match predicate {
            QualityPredicate::MinOperatingHours => {
                Self::numeric_or_zero(&self.hours, row) >= thresholds.min_operating_hours
            }
            QualityPredicate::NonNegativeOutput => Self::numeric_or_zero(&self.output, row) >= 0.0,
            QualityPredicate::NonNegativeCycleTime => {
                Self::numeric_or_zero(&self.cycle_time, row) >= 0.0
            }
            QualityPredicate::UsableEfficiency => self
                .efficiency(row)
                .is_some_and(|ratio| ratio.is_finite() && ratio != 0.0),
            QualityPredicate::EfficiencyWindow => self
                .efficiency(row)
                .is_some_and(|ratio| thresholds.efficiency_window_pct.contains_ratio(ratio)),
            QualityPredicate::NotReservedName => self
                .name
                .is_none_or(|col| !is_reserved_name(table.cell(row, col), thresholds)),
            QualityPredicate::StationPresent => Self::present(table, self.station, row),
            QualityPredicate::StandardCtPresent => Self::present(table, self.standard_ct, row),
            QualityPredicate::NamePresent => Self::present(table, self.name, row),
        }
    }
}

pub fn filter(table: &Table, thresholds: &QualityThresholds) -> ReconResult<FilterOutcome> {
    filter_with_conditions(table, thresholds, &[])
}

pub fn filter_with_conditions(
    table: &Table,
    thresholds: &QualityThresholds,
    conditions: &[FilterCondition],
) -> ReconResult<FilterOutcome> {
    thresholds.validate()?;
    let bound = filter::bind_conditions(conditions, table)?;
    let view = RowView::new(table);
    let has_efficiency = view.efficiency.is_some();
    let active: Vec<QualityPredicate> = QualityPredicate::ALL
        .into_iter()
        .filter(|p| p.is_active(table, has_efficiency))
        .collect();

    if active.is_empty() && bound.is_empty() {
        warn!("No quality predicate applies to this table; passing rows through unchanged");
        return Ok(FilterOutcome {
            table: table.clone(),
            kept_rows: (0..table.len()).collect(),
            dropped: 0,
            active,
            conditions_applied: 0,
            drop_counts: Vec::new(),
        });
    }
    debug!(
        "Active quality predicates: {}",
        active
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut kept_rows = Vec::with_capacity(table.len());
    let mut drop_counts: Vec<(DropReason, usize)> = Vec::new();
    let mut record_drop = |reason: DropReason| {
        match drop_counts.iter_mut().find(|(r, _)| *r == reason) {
            Some((_, count)) => *count += 1,
            None => drop_counts.push((reason, 1)),
        }
    };

    'rows: for row in 0..table.len() {
        for predicate in &active {
            if !view.check(table, *predicate, row, thresholds) {
                record_drop(DropReason::Predicate(*predicate));
                continue 'rows;
            }
        }
        for (col, condition) in &bound {
            if !filter::evaluate_condition(condition, table.cell(row, *col)) {
                record_drop(DropReason::Condition(condition.column.clone()));
                continue 'rows;
            }
        }
        kept_rows.push(row);
    }

    let kept = table.select_rows(&kept_rows);
    let dropped = table.len() - kept.len();
    info!(
        "Quality filter kept {} of {} row(s) ({} predicate(s), {} condition(s))",
        kept.len(),
        table.len(),
        active.len(),
        bound.len()
    );
    for (reason, count) in &drop_counts {
        debug!("Dropped {count} row(s): {reason}");
    }
    if kept.is_empty() && !table.is_empty() {
        warn!("Quality filter removed every row");
    }

    Ok(FilterOutcome {
        table: kept,
        kept_rows,
        dropped,
        active,
        conditions_applied: bound.len(),
        drop_counts,
    })
}

pub fn is_reserved_name(cell: &Cell, thresholds: &QualityThresholds) -> bool {
    cell.key_text()
        .is_some_and(|name| thresholds.reserved_names.iter().any(|r| *r == name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis_table(rows: &[[&str; 6]]) -> Table {
        let headers = [
            columns::STATION,
            columns::NAME,
            columns::OPERATING_HOURS,
            columns::ACTUAL_OUTPUT,
            columns::EFFICIENCY,
            columns::STANDARD_CT,
        ];
        Table::from_rows(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Cell::from_raw(v)).collect())
                .collect(),
        )
    }

    #[test]
    fn keeps_rows_that_pass_every_predicate() {
        let table = analysis_table(&[
            ["A", "王", "8", "100", "0.95", "30"],
            ["A", "MFGR", "8", "100", "0.95", "30"],
            ["A", "李", "0.01", "100", "0.95", "30"],
            ["", "陳", "8", "100", "0.95", "30"],
            ["B", "林", "8", "-1", "0.95", "30"],
            ["B", "張", "8", "100", "1.6", "30"],
            ["B", "黃", "8", "100", "0", "30"],
            ["B", "吳", "8", "100", "", "30"],
            ["B", "周", "8", "100", "0.2", ""],
        ]);
        let outcome = filter(&table, &QualityThresholds::default()).unwrap();
        assert_eq!(outcome.kept_rows, vec![0]);
        assert_eq!(outcome.dropped, 8);
        assert!(!outcome.is_noop());
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let table = analysis_table(&[
            ["A", "王", "8", "100", "0.2", "30"],
            ["A", "李", "8", "100", "1.5", "30"],
            ["A", "陳", "8", "100", "0.19", "30"],
        ]);
        let outcome = filter(&table, &QualityThresholds::default()).unwrap();
        assert_eq!(outcome.kept_rows, vec![0, 1]);
    }

    #[test]
    fn missing_operating_hours_count_as_zero() {
        let table = analysis_table(&[["A", "王", "", "100", "0.9", "30"]]);
        let outcome = filter(&table, &QualityThresholds::default()).unwrap();
        assert!(outcome.table.is_empty());
        assert_eq!(
            outcome.drop_counts,
            vec![(DropReason::Predicate(QualityPredicate::MinOperatingHours), 1)]
        );
    }

    #[test]
    fn only_predicates_with_columns_are_active() {
        let table = Table::from_rows(
            vec![columns::NAME.to_string()],
            vec![vec![Cell::text("王")], vec![Cell::text("MFG_R")]],
        );
        let outcome = filter(&table, &QualityThresholds::default()).unwrap();
        assert_eq!(
            outcome.active,
            vec![QualityPredicate::NotReservedName, QualityPredicate::NamePresent]
        );
        assert_eq!(outcome.table.len(), 1);
    }

    #[test]
    fn no_active_predicate_is_a_noop() {
        let table = Table::from_rows(vec!["料號".to_string()], vec![vec![Cell::text("P1")]]);
        let outcome = filter(&table, &QualityThresholds::default()).unwrap();
        assert!(outcome.is_noop());
        assert_eq!(outcome.table, table);
        assert_eq!(outcome.dropped, 0);
    }

    #[test]
    fn dropping_everything_is_not_a_noop() {
        let table = analysis_table(&[["A", "MFGR", "8", "100", "0.9", "30"]]);
        let outcome = filter(&table, &QualityThresholds::default()).unwrap();
        assert!(outcome.table.is_empty());
        assert!(!outcome.is_noop());
    }

    #[test]
    fn extra_conditions_are_anded() {
        let table = analysis_table(&[
            ["A", "王", "8", "100", "0.9", "30"],
            ["B", "李", "8", "100", "0.9", "30"],
        ]);
        let conditions = filter::parse_filters(&["工站 = B".to_string()]).unwrap();
        let outcome =
            filter_with_conditions(&table, &QualityThresholds::default(), &conditions).unwrap();
        assert_eq!(outcome.kept_rows, vec![1]);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let thresholds = QualityThresholds {
            efficiency_window_pct: PercentWindow {
                min: 150.0,
                max: 20.0,
            },
            ..QualityThresholds::default()
        };
        let err = filter(&Table::default(), &thresholds).unwrap_err();
        assert!(err.to_string().contains("quality.efficiency_window_pct"));
    }

    #[test]
    fn reserved_name_helper_trims() {
        assert!(is_reserved_name(&Cell::text(" MFGR "), &QualityThresholds::default()));
        assert!(!is_reserved_name(&Cell::Missing, &QualityThresholds::default()));
    }
}

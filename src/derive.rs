use std::fmt;

use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    columns,
    data::{Cell, parse_percent},
    error::{ReconError, ReconResult},
    table::Table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum Metric {
    ActualCt,
    Efficiency,
    CtDeviation,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::ActualCt, Metric::Efficiency, Metric::CtDeviation];

    pub fn inputs(self) -> &'static [&'static str] {
        match self {
            Metric::ActualCt => &[columns::OPERATING_HOURS, columns::ACTUAL_OUTPUT],
            Metric::Efficiency => &[columns::ACTUAL_OUTPUT, columns::THEORETICAL_OUTPUT],
            Metric::CtDeviation => &[columns::STANDARD_CT, columns::ACTUAL_CT],
        }
    }

    pub fn outputs(self) -> &'static [&'static str] {
        match self {
            Metric::ActualCt => &[columns::ACTUAL_CT],
            Metric::Efficiency => &[columns::EFFICIENCY],
            Metric::CtDeviation => &[columns::CT_DEVIATION, columns::CT_DEVIATION_RATE],
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Metric::ActualCt => "actual-ct",
            Metric::Efficiency => "efficiency",
            Metric::CtDeviation => "ct-deviation",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveOptions {
    pub required: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeriveOutcome {
    pub table: Table,
    pub computed: Vec<Metric>,
    pub skipped: Vec<(Metric, Vec<&'static str>)>,
}

pub fn actual_cycle_time(hours: Option<f64>, output: Option<f64>) -> Option<f64> {
    let (hours, output) = (hours?, output?);
    if output == 0.0 {
        return None;
    }
    finite(hours * 3600.0 / output)
}

pub fn efficiency_ratio(actual: Option<f64>, theoretical: Option<f64>) -> Option<f64> {
    let (actual, theoretical) = (actual?, theoretical?);
    if theoretical == 0.0 {
        return None;
    }
    finite(actual / theoretical)
}

pub fn ct_deviation(standard: Option<f64>, actual: Option<f64>) -> (Option<f64>, Option<f64>) {
    let deviation = match (standard, actual) {
        (Some(s), Some(a)) => finite(a - s),
        _ => None,
    };
    let rate = match (deviation, standard) {
        (Some(d), Some(s)) if s != 0.0 => finite(d / s * 100.0),
        _ => None,
    };
    (deviation, rate)
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

pub fn efficiency_ratios(table: &Table) -> Option<Vec<Option<f64>>> {
    if let Some(cells) = table.column(columns::EFFICIENCY) {
        return Some(
            cells
                .map(|cell| match cell {
                    Cell::Text(s) if s.trim_end().ends_with('%') => parse_percent(s),
                    other => other.to_numeric(),
                })
                .collect(),
        );
    }
    let cells = table.column(columns::EFFICIENCY_PCT)?;
    Some(
        cells
            .map(|cell| match cell {
                Cell::Text(s) => parse_percent(s),
                other => other.to_numeric().map(|pct| pct / 100.0),
            })
            .collect(),
    )
}

// Availability is decided per table; `required` metrics fail before any column is added.
pub fn derive(table: &Table, options: &DeriveOptions) -> ReconResult<DeriveOutcome> {
    let mut available: Vec<&str> = table.headers().iter().map(String::as_str).collect();
    let mut plan = Vec::new();
    let mut skipped = Vec::new();
    for metric in Metric::ALL {
        let missing: Vec<&'static str> = metric
            .inputs()
            .iter()
            .copied()
            .filter(|col| !available.contains(col))
            .collect();
        if missing.is_empty() {
            available.extend(metric.outputs());
            plan.push(metric);
        } else if options.required.contains(&metric) {
            return Err(ReconError::MissingDerivationColumn {
                metric: metric.to_string(),
                column: missing[0].to_string(),
            });
        } else {
            debug!("Skipping {metric}: missing column(s) {}", missing.join(", "));
            skipped.push((metric, missing));
        }
    }

    let mut derived = table.clone();
    for metric in &plan {
        compute(&mut derived, *metric);
    }
    info!(
        "Derived {} metric(s) across {} row(s)",
        plan.len(),
        derived.len()
    );
    Ok(DeriveOutcome {
        table: derived,
        computed: plan,
        skipped,
    })
}

fn compute(table: &mut Table, metric: Metric) {
    let input = |name: &str| table.numeric_column(name).unwrap_or_default();
    match metric {
        Metric::ActualCt => {
            let values = input(columns::OPERATING_HOURS)
                .into_iter()
                .zip(input(columns::ACTUAL_OUTPUT))
                .map(|(hours, output)| Cell::from_option(actual_cycle_time(hours, output)))
                .collect();
            table.set_column(columns::ACTUAL_CT, values);
        }
        Metric::Efficiency => {
            let values = input(columns::ACTUAL_OUTPUT)
                .into_iter()
                .zip(input(columns::THEORETICAL_OUTPUT))
                .map(|(actual, theoretical)| Cell::from_option(efficiency_ratio(actual, theoretical)))
                .collect();
            table.set_column(columns::EFFICIENCY, values);
        }
        Metric::CtDeviation => {
            let (deviations, rates): (Vec<Cell>, Vec<Cell>) = input(columns::STANDARD_CT)
                .into_iter()
                .zip(input(columns::ACTUAL_CT))
                .map(|(standard, actual)| {
                    let (deviation, rate) = ct_deviation(standard, actual);
                    (Cell::from_option(deviation), Cell::from_option(rate))
                })
                .unzip();
            table.set_column(columns::CT_DEVIATION, deviations);
            table.set_column(columns::CT_DEVIATION_RATE, rates);
        }
    }
}

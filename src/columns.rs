//! Canonical column names and the `columns` listing.
//!
//! Every stage addresses columns through these constants; the names follow
//! the labor-time and production-output exports the tool was built for.

use log::info;

use crate::{config::ReconConfig, normalize::SchemaMapping, table};

pub const STATION: &str = "工站";
pub const NAME: &str = "姓名";
pub const OPERATING_HOURS: &str = "人員作業時間";
pub const THEORETICAL_OUTPUT: &str = "理論產出";
pub const ACTUAL_OUTPUT: &str = "實際產出";
pub const STANDARD_CT: &str = "標準CT";
pub const ACTUAL_CT: &str = "實際CT";
pub const EFFICIENCY: &str = "效率";
pub const EFFICIENCY_PCT: &str = "效率值";
pub const CT_DEVIATION: &str = "CT差異";
pub const CT_DEVIATION_RATE: &str = "CT差異率";
pub const HEAD_COUNT: &str = "人數";

pub const STANDARD_WORK: &str = "標工";

pub const ANALYSIS_COLUMNS: &[&str] = &[
    STATION,
    NAME,
    OPERATING_HOURS,
    THEORETICAL_OUTPUT,
    ACTUAL_OUTPUT,
    EFFICIENCY,
    STANDARD_CT,
    ACTUAL_CT,
    CT_DEVIATION,
    CT_DEVIATION_RATE,
];

pub const CT_ANOMALY_COLUMNS: &[&str] = &[
    STATION,
    NAME,
    STANDARD_CT,
    ACTUAL_CT,
    CT_DEVIATION,
    CT_DEVIATION_RATE,
];

const DESCRIPTIONS: &[(&str, &str)] = &[
    (STATION, "station (production work-cell)"),
    (NAME, "operator name"),
    (OPERATING_HOURS, "person operating hours"),
    (THEORETICAL_OUTPUT, "theoretical output"),
    (ACTUAL_OUTPUT, "actual output"),
    (EFFICIENCY, "efficiency ratio (derived)"),
    (EFFICIENCY_PCT, "efficiency percent (optional input)"),
    (STANDARD_CT, "standard cycle time, seconds/unit"),
    (ACTUAL_CT, "actual cycle time, seconds/unit (derived)"),
    (CT_DEVIATION, "actual minus standard CT (derived)"),
    (CT_DEVIATION_RATE, "CT deviation as % of standard (derived)"),
    (HEAD_COUNT, "records per station (station metrics)"),
];

pub fn describe_rows(config: &ReconConfig) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = DESCRIPTIONS
        .iter()
        .map(|(name, description)| {
            vec![
                "canonical".to_string(),
                name.to_string(),
                description.to_string(),
            ]
        })
        .collect();
    let mapping_rows = |scope: &str, mapping: &SchemaMapping| {
        mapping
            .pairs()
            .map(|(from, to)| vec![scope.to_string(), from.to_string(), format!("-> {to}")])
            .collect::<Vec<_>>()
    };
    rows.extend(mapping_rows("labor", &config.mappings.labor));
    rows.extend(mapping_rows("output", &config.mappings.output));
    rows.extend(mapping_rows("merged", &config.mappings.merged));
    rows
}

pub fn execute(config: &ReconConfig) {
    let rows = describe_rows(config);
    let headers = vec![
        "scope".to_string(),
        "column".to_string(),
        "meaning".to_string(),
    ];
    table::print_table(&headers, &rows);
    info!("Listed {} canonical column(s) and mapping(s)", rows.len());
}

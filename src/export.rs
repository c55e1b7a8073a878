use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::Serialize;

use crate::{io_utils, pipeline::ProcessingStats, report::ReportBundle, table::Table};

#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    pub delimiter: u8,
    pub bom: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            bom: false,
        }
    }
}

impl ExportOptions {
    fn extension(&self) -> &'static str {
        if self.delimiter == io_utils::DEFAULT_TSV_DELIMITER {
            "tsv"
        } else {
            "csv"
        }
    }
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    #[serde(flatten)]
    summary: &'a crate::report::ReportSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing: Option<&'a ProcessingStats>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<&'a str>,
}

pub fn write_named_table(
    dir: &Path,
    name: &str,
    table: &Table,
    options: ExportOptions,
) -> Result<PathBuf> {
    let path = dir.join(format!("{name}.{}", options.extension()));
    io_utils::write_table(table, Some(&path), options.delimiter, options.bom)
        .with_context(|| format!("Exporting {name} table"))?;
    debug!("Wrote {} row(s) to {path:?}", table.len());
    Ok(path)
}

pub fn export_bundle(
    bundle: &ReportBundle,
    stats: Option<&ProcessingStats>,
    dir: &Path,
    options: ExportOptions,
) -> Result<Vec<PathBuf>> {
    for name in bundle.attachments.keys() {
        ensure_plain_file_name(name)?;
    }
    fs::create_dir_all(dir).with_context(|| format!("Creating output directory {dir:?}"))?;
    let mut written = Vec::new();
    for (name, table) in bundle.tables() {
        written.push(write_named_table(dir, name, &table, options)?);
    }
    for (name, content) in &bundle.attachments {
        let path = dir.join(name);
        fs::write(&path, content).with_context(|| format!("Writing attachment {path:?}"))?;
        written.push(path);
    }

    let document = SummaryDocument {
        summary: &bundle.summary,
        processing: stats,
        attachments: bundle.attachments.keys().map(String::as_str).collect(),
    };
    let summary_path = dir.join("summary.json");
    let json = serde_json::to_string_pretty(&document)?;
    fs::write(&summary_path, json).with_context(|| format!("Writing {summary_path:?}"))?;
    written.push(summary_path);

    info!("Exported {} file(s) to {dir:?}", written.len());
    Ok(written)
}

fn ensure_plain_file_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => bail!("Attachment name '{name}' must be a plain file name"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analytics::{AnomalyThresholds, analyze},
        columns,
        data::Cell,
        report::assemble,
    };
    use tempfile::tempdir;

    #[test]
    fn bundle_export_writes_tables_and_summary() {
        let filtered = Table::from_rows(
            vec![columns::STATION.into(), columns::NAME.into(), columns::EFFICIENCY.into()],
            vec![
                vec![Cell::text("A"), Cell::text("a"), Cell::Number(0.7)],
                vec![Cell::text("B"), Cell::text("b"), Cell::Number(1.1)],
            ],
        );
        let analytics = analyze(&filtered, &AnomalyThresholds::default()).unwrap();
        let mut bundle = assemble(&filtered, &analytics, 0.8);
        bundle.attach("chart.html", "<svg/>");

        let dir = tempdir().unwrap();
        let written = export_bundle(&bundle, None, dir.path(), ExportOptions::default()).unwrap();
        assert_eq!(written.len(), 8);
        assert!(dir.path().join("station_metrics.csv").exists());
        assert!(dir.path().join("chart.html").exists());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(json["record_count"], 2);
        assert_eq!(json["best_station"]["station"], "B");
        assert_eq!(json["attachments"][0], "chart.html");
        assert!(json.get("processing").is_none());
    }

    #[test]
    fn attachment_names_cannot_leave_the_output_directory() {
        let filtered = Table::from_rows(
            vec![columns::STATION.into(), columns::NAME.into(), columns::EFFICIENCY.into()],
            vec![vec![Cell::text("A"), Cell::text("a"), Cell::Number(0.9)]],
        );
        let analytics = analyze(&filtered, &AnomalyThresholds::default()).unwrap();
        let root = tempdir().unwrap();
        let out = root.path().join("report");

        for name in ["../escape.html", "/tmp/escape.html", "nested/chart.html", ".."] {
            let mut bundle = assemble(&filtered, &analytics, 0.8);
            bundle.attach(name, "<svg/>");
            let err = export_bundle(&bundle, None, &out, ExportOptions::default()).unwrap_err();
            assert!(err.to_string().contains("plain file name"), "{name}: {err}");
        }
        assert!(!root.path().join("escape.html").exists());
        assert!(!out.exists());
    }

    #[test]
    fn tab_delimiter_switches_extension() {
        let dir = tempdir().unwrap();
        let options = ExportOptions {
            delimiter: b'\t',
            bom: false,
        };
        let path = write_named_table(dir.path(), "filtered", &Table::with_columns(&["a"]), options)
            .unwrap();
        assert!(path.ends_with("filtered.tsv"));
    }
}

pub mod analytics;
pub mod cli;
pub mod columns;
pub mod config;
pub mod data;
pub mod derive;
pub mod error;
pub mod export;
pub mod filter;
pub mod io_utils;
pub mod join;
pub mod normalize;
pub mod pipeline;
pub mod preview;
pub mod quality;
pub mod report;
pub mod table;
mod yaml_provider;

use std::{collections::BTreeMap, env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands, ConfigCommands, InputArgs, OutputArgs, OverrideArgs},
    config::ReconConfig,
    data::format_percent,
    export::ExportOptions,
    pipeline::{Pipeline, ProcessingStats},
    report::ReportBundle,
    table::Table,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("efficiency_recon", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => handle_analyze(&args),
        Commands::Merge(args) => handle_merge(&args),
        Commands::Report(args) => handle_report(&args),
        Commands::Preview(args) => preview::execute(&args),
        Commands::Columns(args) => {
            let config = ReconConfig::load_or_default(args.config.as_deref())?;
            columns::execute(&config);
            Ok(())
        }
        Commands::Config(ConfigCommands::Init(args)) => handle_config_init(&args),
    }
}

fn resolve_config(input: &InputArgs, overrides: &OverrideArgs) -> Result<ReconConfig> {
    let mut config = ReconConfig::load_or_default(input.config.as_deref())?;
    apply_overrides(&mut config, overrides);
    config.validate()?;
    debug!("Effective configuration: {config:?}");
    Ok(config)
}

fn apply_overrides(config: &mut ReconConfig, overrides: &OverrideArgs) {
    let keys: Vec<String> = overrides
        .keys
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    if !keys.is_empty() {
        config.join.keys = keys;
    }
    if let Some(mode) = overrides.join_mode {
        config.join.mode = mode;
    }
    if let Some(hours) = overrides.min_hours {
        config.quality.min_operating_hours = hours;
    }
    if let Some(min) = overrides.efficiency_min {
        config.quality.efficiency_window_pct.min = min;
    }
    if let Some(max) = overrides.efficiency_max {
        config.quality.efficiency_window_pct.max = max;
    }
    if let Some(low) = overrides.low {
        config.anomaly.low = low;
    }
    if let Some(high) = overrides.high {
        config.anomaly.high = high;
    }
    if let Some(pct) = overrides.ct_deviation {
        config.anomaly.ct_deviation_pct = pct;
    }
    if let Some(n) = overrides.top_n {
        config.anomaly.top_n = n;
    }
}

fn read_input(path: &Path, input: &InputArgs) -> Result<Table> {
    let delimiter = io_utils::resolve_input_delimiter(path, input.delimiter);
    let encoding = io_utils::resolve_encoding(input.input_encoding.as_deref())?;
    info!(
        "Reading '{}' with delimiter '{}' ({})",
        path.display(),
        printable_delimiter(delimiter),
        encoding.name()
    );
    io_utils::read_table(path, delimiter, encoding)
}

fn export_options(out: &OutputArgs) -> ExportOptions {
    ExportOptions {
        delimiter: out
            .output_delimiter
            .unwrap_or(io_utils::DEFAULT_CSV_DELIMITER),
        bom: out.bom,
    }
}

fn handle_analyze(args: &cli::AnalyzeArgs) -> Result<()> {
    let mut config = resolve_config(&args.input, &args.overrides)?;
    if args.all_columns {
        config.analysis.project_columns = false;
    }
    let conditions = filter::parse_filters(&args.filters)?;
    let labor = read_input(&args.labor, &args.input)?;
    let output = read_input(&args.output, &args.input)?;

    let run = Pipeline::new(&config)
        .with_conditions(conditions)
        .run(&labor, &output)?;
    let options = export_options(&args.out);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Creating output directory {:?}", args.output_dir))?;
    export::write_named_table(&args.output_dir, "merged", run.merged(), options)?;
    export::write_named_table(&args.output_dir, "filtered", run.filtered_table(), options)?;

    let mut fingerprints = BTreeMap::new();
    for (role, path) in [("labor", &args.labor), ("output", &args.output)] {
        if !io_utils::is_dash(path) {
            fingerprints.insert(role.to_string(), io_utils::fingerprint(path)?);
        }
    }

    print_stats(&run.stats);
    // Upstream tables are already written when analytics fails here
    let mut bundle = run.report()?.clone();
    bundle.summary.fingerprints = fingerprints;
    export::export_bundle(&bundle, Some(&run.stats), &args.output_dir, options)?;
    print_summary(&bundle, args.print_rows);
    Ok(())
}

fn handle_merge(args: &cli::MergeArgs) -> Result<()> {
    let config = resolve_config(&args.input, &args.overrides)?;
    let labor = read_input(&args.labor, &args.input)?;
    let output = read_input(&args.output, &args.input)?;
    let merge = Pipeline::new(&config).merge(&labor, &output)?;

    if merge.joined.dropped_rows() > 0 {
        warn!(
            "{} row(s) without a complete join key were left out",
            merge.joined.dropped_rows()
        );
    }
    let delimiter = io_utils::resolve_output_delimiter(
        args.merged.as_deref(),
        args.out.output_delimiter,
        io_utils::DEFAULT_CSV_DELIMITER,
    );
    io_utils::write_table(merge.merged(), args.merged.as_deref(), delimiter, args.out.bom)?;
    info!(
        "Merged {} labor row(s) and {} output row(s) into {} row(s)",
        labor.len(),
        output.len(),
        merge.merged().len()
    );
    Ok(())
}

fn handle_report(args: &cli::ReportArgs) -> Result<()> {
    let config = resolve_config(&args.input, &args.overrides)?;
    let filtered = read_input(&args.input_file, &args.input)?;
    let mut bundle = Pipeline::new(&config).report_from_filtered(&filtered)?;
    if !io_utils::is_dash(&args.input_file) {
        bundle
            .summary
            .fingerprints
            .insert("filtered".to_string(), io_utils::fingerprint(&args.input_file)?);
    }
    export::export_bundle(&bundle, None, &args.output_dir, export_options(&args.out))?;
    print_summary(&bundle, 20);
    Ok(())
}

fn handle_config_init(args: &cli::ConfigInitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{:?} already exists; pass --force to overwrite it",
            args.output
        );
    }
    ReconConfig::default().save(&args.output)?;
    info!("Default configuration written to {:?}", args.output);
    Ok(())
}

fn print_stats(stats: &ProcessingStats) {
    let rows = vec![
        vec!["labor rows".to_string(), stats.labor_rows.to_string()],
        vec!["output rows".to_string(), stats.output_rows.to_string()],
        vec![
            "dropped (missing key)".to_string(),
            format!("{} / {}", stats.labor_dropped_keys, stats.output_dropped_keys),
        ],
        vec!["merged rows".to_string(), stats.merged_rows.to_string()],
        vec!["matched pairs".to_string(), stats.matched_pairs.to_string()],
        vec!["filtered rows".to_string(), stats.filtered_rows.to_string()],
        vec![
            "filter rate".to_string(),
            stats
                .filter_rate_pct
                .map(|pct| format!("{pct:.1}%"))
                .unwrap_or_else(|| "-".to_string()),
        ],
    ];
    table::print_table(&["stage".to_string(), "value".to_string()], &rows);
}

fn print_summary(bundle: &ReportBundle, station_rows: usize) {
    let summary = &bundle.summary;
    let percent = |pct: Option<f64>| format_percent(pct.map(|p| p / 100.0));
    let mut rows = vec![
        vec!["records".to_string(), summary.record_count.to_string()],
        vec!["stations".to_string(), summary.station_count.to_string()],
        vec![
            "mean efficiency".to_string(),
            percent(summary.overall_mean_efficiency_pct),
        ],
        vec![
            "qualification rate".to_string(),
            percent(summary.qualification_rate_pct),
        ],
    ];
    if let Some(best) = &summary.best_station {
        rows.push(vec![
            "best station".to_string(),
            format!(
                "{} ({})",
                best.station,
                format_percent(Some(best.mean_efficiency_pct / 100.0))
            ),
        ]);
    }
    table::print_table(&["metric".to_string(), "value".to_string()], &rows);
    println!();

    let station_rows: Vec<Vec<String>> = bundle
        .station_metrics
        .iter()
        .take(station_rows)
        .map(|metric| {
            vec![
                metric.station.clone(),
                percent(metric.mean_efficiency_pct),
                metric.head_count.to_string(),
            ]
        })
        .collect();
    table::print_table(
        &[
            columns::STATION.to_string(),
            columns::EFFICIENCY.to_string(),
            columns::HEAD_COUNT.to_string(),
        ],
        &station_rows,
    );
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}

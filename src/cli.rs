use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::join::JoinMode;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile labor-time and production-output exports into per-operator efficiency reports",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full pipeline and write the report bundle to a directory
    Analyze(AnalyzeArgs),
    /// Normalize, join and derive metrics; write the merged table
    Merge(MergeArgs),
    /// Rebuild the report bundle from a previously exported filtered table
    Report(ReportArgs),
    /// Preview the first few rows of a delimited file in a formatted table
    Preview(PreviewArgs),
    /// List canonical columns and the active schema mappings
    Columns(ColumnsArgs),
    /// Manage the YAML configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write the default configuration to a YAML file
    Init(ConfigInitArgs),
}

/// Options shared by every command that reads delimited input.
#[derive(Debug, Clone, Args)]
pub struct InputArgs {
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8, e.g. big5)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// YAML configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

/// Command-line overrides layered over the loaded configuration.
#[derive(Debug, Clone, Default, Args)]
pub struct OverrideArgs {
    /// Join key column; repeat or comma-separate for a composite key
    #[arg(short = 'k', long = "key", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub keys: Vec<String>,
    /// Join mode
    #[arg(long = "join", value_enum)]
    pub join_mode: Option<JoinMode>,
    /// Minimum operating hours for a row to be kept
    #[arg(long = "min-hours")]
    pub min_hours: Option<f64>,
    /// Lower bound of the accepted efficiency window, in percent
    #[arg(long = "efficiency-min")]
    pub efficiency_min: Option<f64>,
    /// Upper bound of the accepted efficiency window, in percent
    #[arg(long = "efficiency-max")]
    pub efficiency_max: Option<f64>,
    /// Efficiency ratio below which a row is flagged low
    #[arg(long = "low")]
    pub low: Option<f64>,
    /// Efficiency ratio above which a row is flagged high
    #[arg(long = "high")]
    pub high: Option<f64>,
    /// Absolute CT deviation rate, in percent, flagged as abnormal
    #[arg(long = "ct-deviation")]
    pub ct_deviation: Option<f64>,
    /// Number of top performers to report
    #[arg(long = "top")]
    pub top_n: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Prefix output files with a UTF-8 byte-order mark
    #[arg(long)]
    pub bom: bool,
    /// Delimiter for written files (defaults to comma)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Labor-time export
    #[arg(short = 'l', long = "labor")]
    pub labor: PathBuf,
    /// Production-output export
    #[arg(short = 'p', long = "output")]
    pub output: PathBuf,
    /// Directory receiving the report bundle
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: PathBuf,
    /// Additional row conditions such as `工站 = A1` or `效率 >= 0.5`
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Keep every merged column instead of the analysis projection
    #[arg(long = "all-columns")]
    pub all_columns: bool,
    /// Number of station rows printed to the terminal
    #[arg(long = "print-rows", default_value_t = 20)]
    pub print_rows: usize,
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub overrides: OverrideArgs,
    #[command(flatten)]
    pub out: OutputArgs,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Labor-time export
    #[arg(short = 'l', long = "labor")]
    pub labor: PathBuf,
    /// Production-output export
    #[arg(short = 'p', long = "output")]
    pub output: PathBuf,
    /// Merged table destination (stdout if omitted)
    #[arg(short = 'o', long = "merged")]
    pub merged: Option<PathBuf>,
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub overrides: OverrideArgs,
    #[command(flatten)]
    pub out: OutputArgs,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Filtered table previously written by `analyze`
    #[arg(short = 'i', long = "input")]
    pub input_file: PathBuf,
    /// Directory receiving the report bundle
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: PathBuf,
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub overrides: OverrideArgs,
    #[command(flatten)]
    pub out: OutputArgs,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// File to preview
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of rows to show
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// YAML configuration whose mappings are listed
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ConfigInitArgs {
    /// Destination YAML file
    #[arg(short = 'o', long = "output", default_value = "efficiency-recon.yml")]
    pub output: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_names_are_accepted() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("pipe"), Ok(b'|'));
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("，").is_err());
    }

    #[test]
    fn composite_keys_split_on_commas() {
        let cli = Cli::try_parse_from([
            "efficiency-recon",
            "merge",
            "-l",
            "a.csv",
            "-p",
            "b.csv",
            "--key",
            "工號,工站",
            "--join",
            "outer",
        ])
        .unwrap();
        let Commands::Merge(args) = cli.command else {
            panic!("expected merge");
        };
        assert_eq!(args.overrides.keys, vec!["工號", "工站"]);
        assert_eq!(args.overrides.join_mode, Some(JoinMode::Outer));
    }
}

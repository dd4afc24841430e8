use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::model::DebtType;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Merge GFS release vintages into one longitudinal liabilities table",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Normalize every vintage and write the master table (CSV + .dta)
    Merge(MergeArgs),
    /// Strip leading zeros, apply redenominations and re-difference the master table
    Correct(CorrectArgs),
    /// Extract keyword-matching rows from bulk release files into one CSV
    Extract(ExtractArgs),
    /// Count legitimate entries and covered countries per series group
    Summarize(SummarizeArgs),
    /// Preview the first few rows of a CSV or .dta file in a formatted table
    Preview(PreviewArgs),
    /// Write the default pipeline configuration as YAML
    InitConfig(InitConfigArgs),
}

/// Options shared by every command that reads the pipeline configuration.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// YAML pipeline configuration (defaults are used when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the directory holding CD_DTA/, WEB_CSV/ and the bulk releases
    #[arg(long = "data-root")]
    pub data_root: Option<PathBuf>,
    /// Override the directory outputs are written to
    #[arg(long = "output-dir")]
    pub output_dir: Option<PathBuf>,
    /// Character encoding of CSV inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Debt types to merge, in output order (default: total, domestic, foreign)
    #[arg(long = "debt-type", value_delimiter = ',', value_parser = parse_debt_type)]
    pub debt_types: Vec<DebtType>,
    /// Legacy vintages to read (overrides the configuration)
    #[arg(long = "legacy-years", value_delimiter = ',')]
    pub legacy_years: Option<Vec<i64>>,
    /// Wide vintages to read (overrides the configuration)
    #[arg(long = "wide-years", value_delimiter = ',')]
    pub wide_years: Option<Vec<i64>>,
    /// Spill each normalized unit to a columnar snapshot in this directory
    #[arg(long = "snapshot-dir")]
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CorrectArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Master CSV to correct (defaults to the merge output)
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Bulk series prefix such as GFSMAB, GFSIBS or GFSSSUC
    #[arg(short, long)]
    pub series: String,
    /// Vintages to scan (defaults to the configured wide years)
    #[arg(long, value_delimiter = ',')]
    pub years: Option<Vec<i64>>,
    /// Destination CSV file
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct SummarizeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Bulk series prefix such as GFSMAB, GFSIBS or GFSSSUC
    #[arg(short, long)]
    pub series: String,
    /// Vintages to summarize (defaults to the configured wide years)
    #[arg(long, value_delimiter = ',')]
    pub years: Option<Vec<i64>>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// File to preview (.csv, .tsv or .dta)
    #[arg(short, long)]
    pub input: PathBuf,
    /// Number of rows to show
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Destination YAML file
    #[arg(short, long, default_value = "gfs-vintages.yaml")]
    pub output: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn parse_debt_type(value: &str) -> Result<DebtType, String> {
    value.parse::<DebtType>().map_err(|err| err.to_string())
}

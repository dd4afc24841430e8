pub mod basis;
pub mod cli;
pub mod config;
pub mod data;
pub mod diff;
pub mod error;
pub mod gaps;
pub mod io_utils;
pub mod legacy;
pub mod master;
pub mod model;
pub mod outliers;
pub mod pipeline;
pub mod preview;
pub mod redenomination;
pub mod snapshot;
pub mod stata;
pub mod summary;
pub mod table;
pub mod wide;
pub mod yaml_provider;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, ConfigArgs},
    config::PipelineConfig,
    model::DebtType,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("gfs_vintages", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Merge(args) => handle_merge(&args),
        Commands::Correct(args) => handle_correct(&args),
        Commands::Extract(args) => handle_extract(&args),
        Commands::Summarize(args) => handle_summarize(&args),
        Commands::Preview(args) => handle_preview(&args),
        Commands::InitConfig(args) => handle_init_config(&args),
    }
}

/// Loads the configuration file (or defaults) and applies command-line overrides.
fn load_config(args: &ConfigArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(root) = &args.data_root {
        config.data_root = root.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(encoding) = &args.input_encoding {
        config.input_encoding = Some(encoding.clone());
    }
    debug!("Effective configuration: {config:?}");
    Ok(config)
}

fn handle_merge(args: &cli::MergeArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(years) = &args.legacy_years {
        config.legacy_years = years.clone();
    }
    if let Some(years) = &args.wide_years {
        config.wide_years = years.clone();
    }
    if let Some(dir) = &args.snapshot_dir {
        config.snapshot_dir = Some(dir.clone());
    }
    let debt_types = if args.debt_types.is_empty() {
        DebtType::ALL.to_vec()
    } else {
        args.debt_types.clone()
    };
    info!(
        "Merging {} legacy and {} wide vintage(s) from {:?}",
        config.legacy_years.len(),
        config.wide_years.len(),
        config.data_root
    );
    let report = pipeline::merge(&config, &debt_types)?;
    for (debt_type, rows) in &report.rows_by_debt_type {
        info!("{debt_type}: {rows} row(s)");
    }
    Ok(())
}

fn handle_correct(args: &cli::CorrectArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let outputs = pipeline::correct_master(&config, args.input.as_deref())?;
    for path in outputs {
        info!("Corrected table written to {path:?}");
    }
    Ok(())
}

fn handle_extract(args: &cli::ExtractArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let years = args.years.clone().unwrap_or_else(|| config.wide_years.clone());
    summary::extract(&config, &args.series, &years, &args.output)
        .with_context(|| format!("Extracting {} rows", args.series))?;
    Ok(())
}

fn handle_summarize(args: &cli::SummarizeArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let years = args.years.clone().unwrap_or_else(|| config.wide_years.clone());
    let out_dir = config.output_dir.join("Summaries");
    let (path, rows) = summary::summarize(&config, &args.series, &years, &out_dir)?;
    info!("{} group(s) in {path:?}", rows.len());
    Ok(())
}

fn handle_preview(args: &cli::PreviewArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let encoding = io_utils::resolve_encoding(config.input_encoding.as_deref())?;
    let rendered = preview::render_preview(&args.input, args.rows, encoding)
        .with_context(|| format!("Previewing {:?}", args.input))?;
    print!("{rendered}");
    Ok(())
}

fn handle_init_config(args: &cli::InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{:?} already exists; pass --force to overwrite it",
            args.output
        );
    }
    PipelineConfig::default().save(&args.output)?;
    info!("Default configuration written to {:?}", args.output);
    Ok(())
}

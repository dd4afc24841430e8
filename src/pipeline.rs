//! Orchestration of the merge and correction passes.
//!
//! A *unit* is one (debt type, source format, vintage) input file. Units fail
//! independently: a missing file or a malformed extract is logged, recorded in
//! the run report and skipped, while invalid arguments and values the output
//! format cannot hold abort the run.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use crate::{
    basis,
    config::PipelineConfig,
    diff::{self, DiffGrouping, FirstVintage},
    error::{self, PipelineError},
    gaps, io_utils, legacy, master,
    model::{CanonicalRecord, DebtType, MasterRecord, ReportingBasis, SourceFormat},
    outliers,
    snapshot::{self, UnitSnapshot},
    wide,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Loaded { rows: usize },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitOutcome {
    pub debt_type: DebtType,
    pub format: SourceFormat,
    pub vintage: i64,
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: UnitStatus,
}

/// Summary of one merge run, persisted as JSON next to the outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub units: Vec<UnitOutcome>,
    pub rows_by_debt_type: BTreeMap<DebtType, usize>,
    pub non_finite_replaced: usize,
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    pub fn loaded(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u.status, UnitStatus::Loaded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.units.len() - self.loaded()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io_utils::ensure_parent_dir(path)?;
        let json = serde_json::to_string_pretty(self).context("Serializing run report")?;
        std::fs::write(path, json).with_context(|| format!("Writing run report to {path:?}"))
    }
}

enum UnitData {
    InMemory(Vec<CanonicalRecord>),
    Spilled(PathBuf),
}

/// Loads, cleans and differences every unit of one debt type.
pub fn run_debt_type(
    config: &PipelineConfig,
    debt_type: DebtType,
    report: &mut RunReport,
) -> Result<Vec<MasterRecord>> {
    config.source.rule(debt_type)?;
    let encoding = io_utils::resolve_encoding(config.input_encoding.as_deref())?;

    let mut units = Vec::new();
    for &year in &config.legacy_years {
        let path = config.legacy_path(year);
        let result = legacy::read_legacy_table(&path, config.legacy_extension, encoding)
            .and_then(|table| legacy::normalize_legacy(&table, year, debt_type, &config.source, &path));
        if let Some(unit) = settle_unit(config, debt_type, SourceFormat::Legacy, year, path, result, report)? {
            units.push(unit);
        }
    }
    for &year in &config.wide_years {
        let path = config.wide_path(year);
        let result = wide::normalize_wide(
            &path,
            year,
            debt_type,
            &config.source,
            config.chunk_rows,
            encoding,
        );
        if let Some(unit) = settle_unit(config, debt_type, SourceFormat::Wide, year, path, result, report)? {
            units.push(unit);
        }
    }

    let mut records = Vec::new();
    for unit in units {
        match unit {
            UnitData::InMemory(mut rows) => records.append(&mut rows),
            UnitData::Spilled(path) => {
                records.extend(UnitSnapshot::load(&path)?.into_records()?);
            }
        }
    }
    if records.is_empty() {
        return Err(PipelineError::MissingInput {
            path: config.data_root.clone(),
        })
        .with_context(|| format!("No input unit contributed rows for debt type '{debt_type}'"));
    }

    for record in records.iter_mut() {
        record.sector_name = record.sector_name.trim().to_string();
        record.reporting_basis = ReportingBasis::from_label(record.reporting_basis.label());
    }
    let records = basis::select_majority_basis(records);
    let mut records = gaps::fill_country_names(records, debt_type);
    diff::difference_vintages(&mut records, DiffGrouping::CountryYear, FirstVintage::Zero);

    info!("{debt_type}: {} master row(s)", records.len());
    report.rows_by_debt_type.insert(debt_type, records.len());
    Ok(records)
}

fn settle_unit(
    config: &PipelineConfig,
    debt_type: DebtType,
    format: SourceFormat,
    vintage: i64,
    path: PathBuf,
    result: Result<Vec<CanonicalRecord>>,
    report: &mut RunReport,
) -> Result<Option<UnitData>> {
    let (status, unit) = match result {
        Ok(records) => {
            info!("Loaded {} {debt_type} row(s) from {path:?}", records.len());
            let status = UnitStatus::Loaded {
                rows: records.len(),
            };
            let unit = match &config.snapshot_dir {
                Some(dir) => {
                    let target = snapshot::snapshot_path(dir, debt_type, format, vintage);
                    UnitSnapshot::from_records(debt_type, format, vintage, &records).save(&target)?;
                    UnitData::Spilled(target)
                }
                None => UnitData::InMemory(records),
            };
            (status, Some(unit))
        }
        Err(err) if error::is_fatal(&err) => return Err(err),
        Err(err) => {
            warn!("Skipping {format} {vintage} for {debt_type}: {err:#}");
            (
                UnitStatus::Skipped {
                    reason: format!("{err:#}"),
                },
                None,
            )
        }
    };
    report.units.push(UnitOutcome {
        debt_type,
        format,
        vintage,
        path,
        status,
    });
    Ok(unit)
}

/// Runs every requested debt type and concatenates them in order.
pub fn run_all(
    config: &PipelineConfig,
    debt_types: &[DebtType],
    report: &mut RunReport,
) -> Result<Vec<MasterRecord>> {
    let mut master = Vec::new();
    // Repeated debt types run once, at their first position.
    for debt_type in debt_types.iter().copied().unique() {
        master.extend(run_debt_type(config, debt_type, report)?);
    }
    Ok(master)
}

/// Builds the master table and writes the CSV, the `.dta` and the run report.
pub fn merge(config: &PipelineConfig, debt_types: &[DebtType]) -> Result<RunReport> {
    if debt_types.is_empty() {
        return Err(PipelineError::InvalidArgument("no debt type selected".into()).into());
    }
    let mut report = RunReport::default();
    let mut records = run_all(config, debt_types, &mut report)?;

    let csv_path = config.output_path(&config.master_csv);
    master::write_master_csv(&csv_path, &records)?;
    report.non_finite_replaced = diff::normalize_non_finite(&mut records);
    if report.non_finite_replaced > 0 {
        info!(
            "Replaced {} non-finite diff value(s) with missing before .dta output",
            report.non_finite_replaced
        );
    }
    let dta_path = config.output_path(&config.master_dta);
    master::write_master_dta(&dta_path, &records, "Net incurrence of liabilities by vintage")?;
    report.outputs = vec![csv_path, dta_path];

    let report_path = config.output_path(&config.report_file);
    report.save(&report_path)?;
    info!(
        "Merged {} unit(s), skipped {}; report at {report_path:?}",
        report.loaded(),
        report.skipped()
    );
    Ok(report)
}

/// Outlier pass over a previously merged master CSV.
pub fn correct_master(config: &PipelineConfig, input: Option<&Path>) -> Result<Vec<PathBuf>> {
    let input = input.map_or_else(|| config.output_path(&config.master_csv), Path::to_path_buf);
    if !input.exists() {
        return Err(PipelineError::MissingInput { path: input }.into());
    }
    let records = master::read_master_csv(&input)?;
    info!("Correcting {} row(s) from {input:?}", records.len());

    let mut corrected = outliers::correct(records, &config.redenominations);
    let replaced = diff::normalize_non_finite(&mut corrected);
    if replaced > 0 {
        info!("Replaced {replaced} non-finite diff value(s) with missing");
    }

    let dta_path = config.output_path(&config.corrected_dta);
    master::write_master_dta(&dta_path, &corrected, "Net incurrence of liabilities, corrected")?;
    let csv_path = config.output_path(&config.corrected_csv);
    master::write_master_csv(&csv_path, &corrected)?;
    Ok(vec![dta_path, csv_path])
}

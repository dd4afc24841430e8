//! Normalizer for the legacy stacked time-series extracts.
//!
//! Legacy extracts hold one row per (series key, observation). The series key
//! encodes the debt type in its suffix and the recording variant in an infix
//! marker, which is what duplicate resolution keys on.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::debug;

use crate::{
    config::{LegacyExtension, SourceConfig},
    data::{RawTable, Value, parse_cell},
    error::PipelineError,
    io_utils,
    model::{CanonicalRecord, DebtType, ReportingBasis},
    stata,
};

/// A legacy row after field mapping, still carrying its series key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRecord {
    pub series_key: String,
    pub record: CanonicalRecord,
}

/// Reads a legacy extract from disk as a `.dta` file or a CSV export.
pub fn read_legacy_table(
    path: &Path,
    extension: LegacyExtension,
    encoding: &'static Encoding,
) -> Result<RawTable> {
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        }
        .into());
    }
    match extension {
        LegacyExtension::Dta => {
            stata::read_dta(path).with_context(|| format!("Reading legacy extract {path:?}"))
        }
        LegacyExtension::Csv => read_csv_table(path, encoding),
    }
}

fn read_csv_table(path: &Path, encoding: &'static Encoding) -> Result<RawTable> {
    let delimiter = io_utils::resolve_input_delimiter(path, None);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let mut table = RawTable::new(headers);
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} in {path:?}", row_idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)?;
        table.rows.push(decoded.iter().map(|cell| parse_cell(cell)).collect());
    }
    Ok(table)
}

struct LegacyIndices {
    key: usize,
    value: usize,
    year: usize,
    country_code: usize,
    country_name: Option<usize>,
    basis: Option<usize>,
    sector: Option<usize>,
}

fn resolve_indices(table: &RawTable, config: &SourceConfig, origin: &Path) -> Result<LegacyIndices> {
    let columns = &config.legacy;
    let required = |name: &str| {
        table.column_index(name).ok_or_else(|| PipelineError::SchemaMismatch {
            path: origin.to_path_buf(),
            detail: format!("required column '{name}' not found"),
        })
    };
    Ok(LegacyIndices {
        key: required(&columns.series_key)?,
        value: required(&columns.value)?,
        year: required(&columns.start_year)?,
        country_code: required(&columns.country_code)?,
        country_name: table.column_index(&columns.country_name),
        basis: table.column_index(&columns.reporting_basis),
        sector: table.column_index(&columns.sector),
    })
}

/// Maps a legacy extract into canonical records for one debt type and vintage.
///
/// Rows are selected by series-key suffix; rows without a value or with a
/// reserved infix are dropped; collisions are then resolved with
/// [`resolve_duplicates`].
pub fn normalize_legacy(
    table: &RawTable,
    vintage: i64,
    debt_type: DebtType,
    config: &SourceConfig,
    origin: &Path,
) -> Result<Vec<CanonicalRecord>> {
    let rule = config.rule(debt_type)?;
    let idx = resolve_indices(table, config, origin)?;

    let text = |row: usize, column: Option<usize>| -> String {
        column
            .and_then(|c| table.cell(row, c))
            .map(Value::as_text)
            .unwrap_or_default()
    };

    let mut keyed = Vec::new();
    for row in 0..table.len() {
        let Some(series_key) = table.cell(row, idx.key).map(Value::as_text) else {
            continue;
        };
        if !series_key.ends_with(&rule.legacy_suffix) {
            continue;
        }
        let Some(value) = table.cell(row, idx.value).and_then(Value::as_f64) else {
            continue;
        };
        if config.reserved_infixes.iter().any(|infix| series_key.contains(infix.as_str())) {
            debug!("Dropping reserved series {series_key} ({vintage})");
            continue;
        }
        let year = required_integer(table, row, idx.year, &config.legacy.start_year, origin)?;
        let country_code =
            required_integer(table, row, idx.country_code, &config.legacy.country_code, origin)?;
        let legacy_name = Some(text(row, idx.country_name)).filter(|n| !n.trim().is_empty());
        keyed.push(KeyedRecord {
            series_key,
            record: CanonicalRecord {
                country_code,
                country_name: None,
                year,
                vintage,
                value,
                reporting_basis: ReportingBasis::from_label(&text(row, idx.basis)),
                sector_name: text(row, idx.sector),
                legacy_name,
            },
        });
    }

    Ok(resolve_duplicates(keyed, &config.primary_infixes)
        .into_iter()
        .map(|k| k.record)
        .collect())
}

fn required_integer(table: &RawTable, row: usize, column: usize, name: &str, origin: &Path) -> Result<i64> {
    let cell = table.cell(row, column).ok_or_else(|| PipelineError::SchemaMismatch {
        path: origin.to_path_buf(),
        detail: format!("row {} has no '{name}'", row + 1),
    })?;
    cell.as_i64().map_err(|err| {
        PipelineError::SchemaMismatch {
            path: origin.to_path_buf(),
            detail: format!("row {} column '{name}': {err}", row + 1),
        }
        .into()
    })
}

/// Collapses rows sharing (year, country_code, vintage).
///
/// Inside a colliding group only rows whose key contains a primary infix
/// survive, so a group with no primary row disappears. Several primary rows
/// in one group stay as an unresolved collision. Identical rows are then
/// collapsed to their first occurrence. Applying this twice removes nothing
/// further.
pub fn resolve_duplicates(rows: Vec<KeyedRecord>, primary_infixes: &[String]) -> Vec<KeyedRecord> {
    let mut group_sizes: HashMap<(i64, i64, i64), usize> = HashMap::new();
    for row in &rows {
        *group_sizes.entry(group_key(&row.record)).or_insert(0) += 1;
    }

    let mut seen = HashSet::new();
    let mut kept: Vec<KeyedRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        let colliding = group_sizes[&group_key(&row.record)] > 1;
        if colliding && !is_primary(&row.series_key, primary_infixes) {
            debug!(
                "Discarding non-primary series {} for country {} year {}",
                row.series_key, row.record.country_code, row.record.year
            );
            continue;
        }
        if !seen.insert(row_signature(&row)) {
            continue;
        }
        kept.push(row);
    }
    kept
}

type RowSignature = (String, i64, i64, i64, u64, String, String, Option<String>);

fn row_signature(row: &KeyedRecord) -> RowSignature {
    let r = &row.record;
    (
        row.series_key.clone(),
        r.country_code,
        r.year,
        r.vintage,
        r.value.to_bits(),
        r.reporting_basis.label().to_string(),
        r.sector_name.clone(),
        r.legacy_name.clone(),
    )
}

fn group_key(record: &CanonicalRecord) -> (i64, i64, i64) {
    (record.year, record.country_code, record.vintage)
}

fn is_primary(series_key: &str, primary_infixes: &[String]) -> bool {
    primary_infixes.iter().any(|infix| series_key.contains(infix.as_str()))
}

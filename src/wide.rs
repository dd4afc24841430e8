//! Normalizer for the modern wide extracts (`GFSIBS{year}.csv`).
//!
//! Wide files carry one row per (country, series, attribute) with one column
//! per reference year. Observation rows and basis-of-recording rows share the
//! same series coordinates and are told apart by the attribute column.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::debug;
use regex::Regex;

use crate::{
    config::{SourceConfig, WideColumns},
    data::parse_numeric,
    error::PipelineError,
    io_utils,
    model::{CanonicalRecord, DebtType, ReportingBasis},
};

fn year_header() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"^\d+$").expect("static regex"))
}

struct WideIndices {
    country_code: usize,
    country_name: Option<usize>,
    sector_name: Option<usize>,
    attribute: usize,
    unit: usize,
    residence: usize,
    classification: usize,
    flow: usize,
    sector: usize,
    years: Vec<(usize, i64)>,
}

impl WideIndices {
    fn resolve(headers: &[String], config: &SourceConfig, origin: &Path) -> Result<Self> {
        let columns = &config.wide;
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let required = |name: &str| {
            find(name).ok_or_else(|| PipelineError::SchemaMismatch {
                path: origin.to_path_buf(),
                detail: format!("required column '{name}' not found"),
            })
        };
        let years = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| year_header().is_match(h.trim()))
            .filter_map(|(idx, h)| h.trim().parse::<i64>().ok().map(|year| (idx, year)))
            .filter(|(_, year)| config.year_in_window(*year))
            .collect();
        Ok(Self {
            country_code: required(&columns.country_code)?,
            country_name: find(&columns.country_name),
            sector_name: find(&columns.sector_name),
            attribute: required(&columns.attribute)?,
            unit: required(&columns.unit_code)?,
            residence: required(&columns.residence_code)?,
            classification: required(&columns.classification_code)?,
            flow: required(&columns.flow_code)?,
            sector: required(&columns.sector_code)?,
            years,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Observation,
    Basis,
}

/// A wide row that passed the series filter, narrowed to the fields we use.
#[derive(Debug, Clone)]
struct WideRow {
    kind: RowKind,
    country_code: i64,
    country_name: Option<String>,
    sector_name: String,
    cells: Vec<(i64, String)>,
}

/// Maps one wide extract into canonical records for `debt_type`.
pub fn normalize_wide(
    path: &Path,
    vintage: i64,
    debt_type: DebtType,
    config: &SourceConfig,
    chunk_rows: usize,
    encoding: &'static Encoding,
) -> Result<Vec<CanonicalRecord>> {
    let rule = config.rule(debt_type)?;
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        }
        .into());
    }

    let delimiter = io_utils::resolve_input_delimiter(path, None);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let indices = WideIndices::resolve(&headers, config, path)?;

    let mut kept = Vec::new();
    let mut chunks = 0usize;
    let total = io_utils::for_each_chunk(&mut reader, chunk_rows, |chunk| {
        chunks += 1;
        for raw in chunk {
            let fields = io_utils::decode_record(raw, encoding)?;
            if let Some(row) =
                filter_row(&fields, &indices, &config.wide, &rule.residence_code, path)?
            {
                kept.push(row);
            }
        }
        Ok(())
    })
    .with_context(|| format!("Scanning {path:?}"))?;
    debug!(
        "{path:?}: {} of {} row(s) matched {debt_type} in {chunks} chunk(s)",
        kept.len(),
        total
    );

    Ok(unpivot(kept, vintage, &config.basis_codes))
}

fn filter_row(
    fields: &[String],
    idx: &WideIndices,
    columns: &WideColumns,
    residence_code: &str,
    origin: &Path,
) -> Result<Option<WideRow>> {
    let field = |i: usize| fields.get(i).map(|f| f.trim()).unwrap_or_default();
    let selected = field(idx.unit) == columns.unit
        && field(idx.residence) == residence_code
        && field(idx.classification) == columns.classification
        && field(idx.flow) == columns.flow
        && field(idx.sector) == columns.sector;
    if !selected {
        return Ok(None);
    }
    let attribute = field(idx.attribute);
    let kind = if attribute == columns.value_attribute {
        RowKind::Observation
    } else if attribute == columns.basis_attribute {
        RowKind::Basis
    } else {
        return Ok(None);
    };

    let raw_code = field(idx.country_code);
    let country_code = raw_code.parse::<i64>().map_err(|_| PipelineError::SchemaMismatch {
        path: origin.to_path_buf(),
        detail: format!("country code '{raw_code}' is not an integer"),
    })?;
    let country_name = idx
        .country_name
        .map(field)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    let sector_name = idx.sector_name.map(field).unwrap_or_default().to_string();
    let cells = idx
        .years
        .iter()
        .filter_map(|(column, year)| {
            let cell = field(*column);
            (!cell.is_empty()).then(|| (*year, cell.to_string()))
        })
        .collect();

    Ok(Some(WideRow {
        kind,
        country_code,
        country_name,
        sector_name,
        cells,
    }))
}

fn unpivot(
    rows: Vec<WideRow>,
    vintage: i64,
    basis_codes: &BTreeMap<String, String>,
) -> Vec<CanonicalRecord> {
    let mut bases: HashMap<(i64, i64), &str> = HashMap::new();
    for row in rows.iter().filter(|r| r.kind == RowKind::Basis) {
        for (year, code) in &row.cells {
            bases.entry((row.country_code, *year)).or_insert(code.as_str());
        }
    }

    let mut records = Vec::new();
    for row in rows.iter().filter(|r| r.kind == RowKind::Observation) {
        for (year, cell) in &row.cells {
            let Some(value) = parse_numeric(cell) else {
                debug!(
                    "Dropping unparsable value '{cell}' for country {} year {year}",
                    row.country_code
                );
                continue;
            };
            let reporting_basis = bases
                .get(&(row.country_code, *year))
                .and_then(|code| basis_codes.get(*code))
                .map_or(ReportingBasis::Unspecified, |label| {
                    ReportingBasis::from_label(label)
                });
            records.push(CanonicalRecord {
                country_code: row.country_code,
                country_name: row.country_name.clone(),
                year: *year,
                vintage,
                value,
                reporting_basis,
                sector_name: row.sector_name.clone(),
                legacy_name: None,
            });
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const HEADER: &str = "Country Name,Country Code,Sector Name,Sector Code,Unit Code,Residence Code,\
Instrument and Assets Classification Code,\"Stocks, Transactions, and Other Flows Code\",Attribute,1969,2000,2001,2026";

    fn row(code: &str, residence: &str, attribute: &str, cells: [&str; 4]) -> String {
        format!(
            "Ruritania,{code},General government,S13,XDC,{residence},F,G33,{attribute},{}",
            cells.join(",")
        )
    }

    fn write_extract(rows: &[String]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("GFSIBS2016.csv");
        let mut body = String::from(HEADER);
        for r in rows {
            body.push('\n');
            body.push_str(r);
        }
        body.push('\n');
        fs::write(&path, body).unwrap();
        (dir, path)
    }

    fn normalize(path: &Path, debt_type: DebtType, chunk_rows: usize) -> Vec<CanonicalRecord> {
        normalize_wide(
            path,
            2016,
            debt_type,
            &SourceConfig::default(),
            chunk_rows,
            encoding_rs::UTF_8,
        )
        .unwrap()
    }

    #[test]
    fn unpivots_years_inside_window_with_basis_join() {
        let (_dir, path) = write_extract(&[
            row("111", "W0|S1", "Value", ["9", "1.5", "2.5", "9"]),
            row("111", "W0|S1", "Bases of recording (Cash/ Non Cash)", ["", "AC", "XX", ""]),
            row("111", "W1|S1", "Value", ["9", "7", "8", "9"]),
        ]);
        let records = normalize(&path, DebtType::Total, 10_000);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].year, 2000);
        assert_eq!(records[0].value, 1.5);
        assert_eq!(records[0].reporting_basis, ReportingBasis::Accrual);
        assert_eq!(records[1].reporting_basis, ReportingBasis::Unspecified);
        assert_eq!(records[0].country_name.as_deref(), Some("Ruritania"));
        assert_eq!(records[0].sector_name, "General government");
        assert_eq!(records[0].vintage, 2016);
    }

    #[test]
    fn empty_and_unparsable_cells_are_dropped() {
        let (_dir, path) = write_extract(&[row("111", "W2|S1", "Value", ["", "", "n/a", ""])]);
        assert!(normalize(&path, DebtType::Domestic, 10_000).is_empty());
    }

    #[test]
    fn chunk_size_does_not_change_output() {
        let rows: Vec<String> = (0..7)
            .map(|i| row(&(100 + i).to_string(), "W1|S1", "Value", ["", "1", "2", ""]))
            .collect();
        let (_dir, path) = write_extract(&rows);
        assert_eq!(
            normalize(&path, DebtType::Foreign, 3),
            normalize(&path, DebtType::Foreign, 10_000)
        );
        assert_eq!(normalize(&path, DebtType::Foreign, 3).len(), 14);
    }

    #[test]
    fn first_basis_row_wins() {
        let (_dir, path) = write_extract(&[
            row("5", "W0|S1", "Bases of recording (Cash/ Non Cash)", ["", "CA", "", ""]),
            row("5", "W0|S1", "Bases of recording (Cash/ Non Cash)", ["", "AC", "", ""]),
            row("5", "W0|S1", "Value", ["", "3", "", ""]),
        ]);
        let records = normalize(&path, DebtType::Total, 1);
        assert_eq!(records[0].reporting_basis, ReportingBasis::CashBasis);
    }

    #[test]
    fn missing_file_and_missing_columns_are_typed() {
        let dir = tempdir().unwrap();
        let absent = dir.path().join("GFSIBS1999.csv");
        let err = normalize_wide(&absent, 1999, DebtType::Total, &SourceConfig::default(), 10, encoding_rs::UTF_8)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::MissingInput { .. })));

        let bad = dir.path().join("GFSIBS2000.csv");
        fs::write(&bad, "Country Code,2000\n1,2\n").unwrap();
        let err = normalize_wide(&bad, 2000, DebtType::Total, &SourceConfig::default(), 10, encoding_rs::UTF_8)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::SchemaMismatch { .. })));
    }
}

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use itertools::Itertools;
use log::{info, warn};

use crate::{
    config::PipelineConfig,
    data::parse_numeric,
    error::PipelineError,
    io_utils,
};

pub const ENTRIES_HEADER: &str = "Sum of Legitimate Entries";
pub const COUNTRIES_HEADER: &str = "Number of Covered Countries";

/// Case-insensitive substring match against any keyword.
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

fn required_column(headers: &[String], name: &str, origin: &Path) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        PipelineError::SchemaMismatch {
            path: origin.to_path_buf(),
            detail: format!("required column '{name}' not found"),
        }
        .into()
    })
}

/// Concatenates keyword-matching rows of `series` across `years` into `output`,
/// appending a `Vintage` column. Missing or mismatched files are skipped.
pub fn extract(config: &PipelineConfig, series: &str, years: &[i64], output: &Path) -> Result<usize> {
    let encoding = io_utils::resolve_encoding(config.input_encoding.as_deref())?;
    let filter = KeywordFilter::new(&config.summary.keywords);
    let mut writer = io_utils::open_csv_writer(Some(output), io_utils::DEFAULT_CSV_DELIMITER)?;
    let mut baseline: Option<Vec<String>> = None;
    let mut written = 0usize;

    for &year in years {
        let path = config.bulk_path(series, year);
        if !path.exists() {
            warn!("Skipping {series} {year}: {path:?} not found");
            continue;
        }
        let result = extract_file(
            &path,
            year,
            config,
            &filter,
            encoding,
            &mut baseline,
            &mut writer,
        );
        match result {
            Ok(rows) => {
                info!("Extracted {rows} row(s) from {path:?}");
                written += rows;
            }
            Err(err) if crate::error::is_fatal(&err) => return Err(err),
            Err(err) => warn!("Skipping {series} {year}: {err:#}"),
        }
    }
    writer.flush().with_context(|| format!("Flushing {output:?}"))?;
    info!("Wrote {written} extracted row(s) to {output:?}");
    Ok(written)
}

fn extract_file(
    path: &Path,
    year: i64,
    config: &PipelineConfig,
    filter: &KeywordFilter,
    encoding: &'static Encoding,
    baseline: &mut Option<Vec<String>>,
    writer: &mut csv::Writer<Box<dyn std::io::Write>>,
) -> Result<usize> {
    let delimiter = io_utils::resolve_input_delimiter(path, None);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let keyword_idx = required_column(&headers, &config.summary.keyword_column, path)?;

    match baseline {
        Some(expected) if *expected != headers => {
            return Err(PipelineError::SchemaMismatch {
                path: path.to_path_buf(),
                detail: "headers differ from the first extracted file".into(),
            }
            .into());
        }
        Some(_) => {}
        None => {
            let mut out = headers.clone();
            out.push("Vintage".into());
            writer.write_record(&out).context("Writing extract header")?;
            *baseline = Some(headers.clone());
        }
    }

    let vintage = year.to_string();
    let mut rows = 0usize;
    io_utils::for_each_chunk(&mut reader, config.chunk_rows, |chunk| {
        for raw in chunk {
            let mut fields = io_utils::decode_record(raw, encoding)?;
            if !fields.get(keyword_idx).is_some_and(|f| filter.matches(f)) {
                continue;
            }
            fields.resize(headers.len(), String::new());
            fields.push(vintage.clone());
            writer.write_record(&fields)?;
            rows += 1;
        }
        Ok(())
    })
    .with_context(|| format!("Scanning {path:?}"))?;
    Ok(rows)
}

/// Coverage of one group of series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub group: Vec<String>,
    pub entries: usize,
    pub countries: usize,
}

#[derive(Default)]
struct GroupAccumulator {
    entries: usize,
    countries: HashSet<String>,
}

/// Per-group coverage of one bulk file: numeric year cells and distinct countries.
pub fn summarize_file(
    path: &Path,
    config: &PipelineConfig,
    encoding: &'static Encoding,
) -> Result<Vec<SummaryRow>> {
    let delimiter = io_utils::resolve_input_delimiter(path, None);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let wide = &config.source.wide;
    let keyword_idx = required_column(&headers, &config.summary.keyword_column, path)?;
    let attribute_idx = required_column(&headers, &wide.attribute, path)?;
    let country_idx = required_column(&headers, &wide.country_code, path)?;
    let group_idx = config
        .summary
        .group_columns
        .iter()
        .map(|name| required_column(&headers, name, path))
        .collect::<Result<Vec<_>>>()?;
    let year_idx: Vec<usize> = headers
        .iter()
        .positions(|h| h.starts_with("19") || h.starts_with("20"))
        .collect();

    let filter = KeywordFilter::new(&config.summary.keywords);
    let mut groups: BTreeMap<Vec<String>, GroupAccumulator> = BTreeMap::new();
    io_utils::for_each_chunk(&mut reader, config.chunk_rows, |chunk| {
        for raw in chunk {
            let fields = io_utils::decode_record(raw, encoding)?;
            let field = |i: usize| fields.get(i).map(String::as_str).unwrap_or_default();
            if field(attribute_idx) != wide.value_attribute || !filter.matches(field(keyword_idx)) {
                continue;
            }
            let key = group_idx.iter().map(|i| field(*i).to_string()).collect();
            let acc = groups.entry(key).or_default();
            acc.entries += year_idx
                .iter()
                .filter(|i| parse_numeric(field(**i)).is_some())
                .count();
            acc.countries.insert(field(country_idx).to_string());
        }
        Ok(())
    })
    .with_context(|| format!("Scanning {path:?}"))?;

    Ok(groups
        .into_iter()
        .map(|(group, acc)| SummaryRow {
            group,
            entries: acc.entries,
            countries: acc.countries.len(),
        })
        .collect())
}

/// Sums entries and keeps the widest country coverage per group, sorted by
/// entries descending.
pub fn aggregate(per_year: &[Vec<SummaryRow>]) -> Vec<SummaryRow> {
    let mut merged: BTreeMap<&[String], (usize, usize)> = BTreeMap::new();
    for row in per_year.iter().flatten() {
        let slot = merged.entry(row.group.as_slice()).or_insert((0, 0));
        slot.0 += row.entries;
        slot.1 = slot.1.max(row.countries);
    }
    merged
        .into_iter()
        .map(|(group, (entries, countries))| SummaryRow {
            group: group.to_vec(),
            entries,
            countries,
        })
        .sorted_by(|a, b| b.entries.cmp(&a.entries))
        .collect()
}

pub fn write_summary(path: &Path, group_columns: &[String], rows: &[SummaryRow]) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(Some(path), io_utils::DEFAULT_CSV_DELIMITER)?;
    let header = group_columns
        .iter()
        .map(String::as_str)
        .chain([ENTRIES_HEADER, COUNTRIES_HEADER]);
    writer.write_record(header)?;
    for row in rows {
        let record = row
            .group
            .iter()
            .cloned()
            .chain([row.entries.to_string(), row.countries.to_string()]);
        writer.write_record(record)?;
    }
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}

/// Writes `summary_analysis_{year}.csv` per available year under
/// `out_dir/{series}` and `aggregated_summary_{series}.csv` in `out_dir`.
pub fn summarize(
    config: &PipelineConfig,
    series: &str,
    years: &[i64],
    out_dir: &Path,
) -> Result<(PathBuf, Vec<SummaryRow>)> {
    let encoding = io_utils::resolve_encoding(config.input_encoding.as_deref())?;
    let mut per_year = Vec::new();
    for &year in years {
        let path = config.bulk_path(series, year);
        if !path.exists() {
            warn!("Skipping {series} {year}: {path:?} not found");
            continue;
        }
        let rows = match summarize_file(&path, config, encoding) {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Skipping {series} {year}: {err:#}");
                continue;
            }
        };
        let target = out_dir.join(series).join(format!("summary_analysis_{year}.csv"));
        write_summary(&target, &config.summary.group_columns, &rows)?;
        info!("Summary for {year} saved to {target:?}");
        per_year.push(rows);
    }
    if per_year.is_empty() {
        return Err(PipelineError::MissingInput {
            path: config.data_root.join(series),
        })
        .with_context(|| format!("No {series} file could be summarized"));
    }

    let aggregated = aggregate(&per_year);
    let target = out_dir.join(format!("aggregated_summary_{series}.csv"));
    write_summary(&target, &config.summary.group_columns, &aggregated)?;
    info!("Aggregated summary saved to {target:?}");
    Ok((target, aggregated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn row(group: &str, entries: usize, countries: usize) -> SummaryRow {
        SummaryRow {
            group: vec![group.to_string()],
            entries,
            countries,
        }
    }

    #[test]
    fn keyword_filter_ignores_case() {
        let filter = KeywordFilter::new(&["Debt".to_string(), "borrowing".to_string()]);
        assert!(filter.matches("Gross DEBT position"));
        assert!(filter.matches("Net borrowing"));
        assert!(!filter.matches("Revenue"));
    }

    #[test]
    fn aggregate_sums_entries_and_keeps_max_countries() {
        let aggregated = aggregate(&[
            vec![row("a", 5, 3), row("b", 9, 1)],
            vec![row("a", 7, 4)],
        ]);
        assert_eq!(aggregated, vec![row("a", 12, 4), row("b", 9, 1)]);
    }

    #[test]
    fn summarize_file_counts_numeric_year_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("GFSIBS2016.csv");
        fs::write(
            &path,
            "Country Code,Attribute,Flow,Sector,1999,2000,Notes\n\
             1,Value,Net debt,S13,1.0,,x\n\
             2,Value,Net debt,S13,2.0,3.0,x\n\
             2,Status,Net debt,S13,E,E,x\n\
             3,Value,Revenue,S13,4.0,5.0,x\n",
        )
        .unwrap();
        let mut config = PipelineConfig::default();
        config.summary.keyword_column = "Flow".into();
        config.summary.group_columns = vec!["Flow".into(), "Sector".into()];

        let rows = summarize_file(&path, &config, encoding_rs::UTF_8).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group, vec!["Net debt", "S13"]);
        assert_eq!(rows[0].entries, 3);
        assert_eq!(rows[0].countries, 2);
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use encoding_rs::Encoding;

use crate::{error::PipelineError, io_utils, stata, table};

/// Renders the first `rows` rows of a CSV or `.dta` file as a text table.
pub fn render_preview(path: &Path, rows: usize, encoding: &'static Encoding) -> Result<String> {
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        }
        .into());
    }
    let is_dta = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dta"));

    let (headers, body) = if is_dta {
        let table = stata::read_dta(path)?;
        let body = table
            .rows
            .iter()
            .take(rows)
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_ref().map(|v| v.as_display()).unwrap_or_default())
                    .collect()
            })
            .collect();
        (table.headers, body)
    } else {
        let delimiter = io_utils::resolve_input_delimiter(path, None);
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
        let headers = io_utils::reader_headers(&mut reader, encoding)?;
        let mut body = Vec::new();
        for (idx, record) in reader.byte_records().take(rows).enumerate() {
            let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
            body.push(io_utils::decode_record(&record, encoding)?);
        }
        (headers, body)
    };
    Ok(table::render_table(&headers, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn previews_leading_csv_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        fs::write(&path, "Year,Value\n2001,1\n2002,2\n2003,3\n").unwrap();
        let rendered = render_preview(&path, 2, encoding_rs::UTF_8).unwrap();
        assert_eq!(rendered.lines().count(), 4);
        assert!(rendered.contains("2002"));
        assert!(!rendered.contains("2003"));
    }
}

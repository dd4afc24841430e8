//! Stata `.dta` reader and writer (formats 113 to 115).
//!
//! The legacy CD-ROM extracts ship as `.dta` files, and downstream statistical
//! tooling consumes the master table in the same format. The writer always
//! emits format 114 in little-endian order; the reader accepts 113, 114 and
//! 115 in either byte order and applies value labels to labelled columns.
//!
//! Layout, in file order: header, descriptors (type list, names, sort list,
//! formats, value-label names), variable labels, expansion fields, data, and
//! value-label tables.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result, anyhow, bail, ensure};
use chrono::Local;
use encoding_rs::WINDOWS_1252;
use heck::ToSnakeCase;

use crate::{
    data::{RawTable, Value},
    error::PipelineError,
};

const WRITE_FORMAT: u8 = 114;
const BYTE_ORDER_HILO: u8 = 0x01;
const BYTE_ORDER_LOHI: u8 = 0x02;

const TYPE_BYTE: u8 = 251;
const TYPE_INT: u8 = 252;
const TYPE_LONG: u8 = 253;
const TYPE_FLOAT: u8 = 254;
const TYPE_DOUBLE: u8 = 255;
const MAX_STR_WIDTH: usize = 244;

const NAME_WIDTH: usize = 33;
const LABEL_WIDTH: usize = 81;
const TIMESTAMP_WIDTH: usize = 18;
const FORMAT_WIDTH_113: usize = 12;
const FORMAT_WIDTH_114: usize = 49;
const MAX_NAME_CHARS: usize = 32;

const BYTE_MAX_VALID: i8 = 100;
const INT_MAX_VALID: i16 = 32_740;
const LONG_MAX_VALID: i32 = 2_147_483_620;
const LONG_MIN_VALID: i64 = -2_147_483_647;
const LONG_MISSING: i32 = 2_147_483_621;
/// 2^127; floats at or above it are missing codes.
const FLOAT_MISSING_BITS: u32 = 0x7F00_0000;
/// 2^1023; doubles at or above it are missing codes.
const DOUBLE_MISSING_BITS: u64 = 0x7FE0_0000_0000_0000;

/// Column data handed to the writer.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Long(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Text(Vec<String>),
    /// Text stored as `long` codes plus a value-label table.
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    fn len(&self) -> usize {
        match self {
            ColumnValues::Long(v) => v.len(),
            ColumnValues::Double(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
            ColumnValues::Categorical(v) => v.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DtaColumn {
    /// Original header; becomes the variable label.
    pub header: String,
    pub values: ColumnValues,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DtaFrame {
    pub label: String,
    pub columns: Vec<DtaColumn>,
}

impl DtaFrame {
    pub fn push(&mut self, header: &str, values: ColumnValues) {
        self.columns.push(DtaColumn {
            header: header.to_string(),
            values,
        });
    }

    fn row_count(&self) -> Result<usize> {
        let rows = self.columns.first().map_or(0, |c| c.values.len());
        for column in &self.columns {
            ensure!(
                column.values.len() == rows,
                "Column '{}' has {} row(s), expected {rows}",
                column.header,
                column.values.len()
            );
        }
        Ok(rows)
    }
}

/// Stata variable name for a header: snake_case, `[a-z0-9_]`, at most 32 chars.
pub fn variable_name(header: &str) -> String {
    let mut name: String = header
        .to_snake_case()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name.chars().take(MAX_NAME_CHARS).collect()
}

pub fn write_dta(path: &Path, frame: &DtaFrame) -> Result<()> {
    let timestamp = Local::now().format("%d %b %Y %H:%M").to_string();
    let bytes = encode_dta(frame, &timestamp)?;
    fs::write(path, bytes).with_context(|| format!("Writing Stata file {path:?}"))
}

enum PlannedCells {
    Long(Vec<i32>),
    Double(Vec<f64>),
    Text { width: usize, cells: Vec<Vec<u8>> },
}

struct ColumnPlan {
    name: String,
    label: Vec<u8>,
    type_code: u8,
    format: String,
    value_labels: Option<Vec<(i32, Vec<u8>)>>,
    cells: PlannedCells,
}

fn unsupported(column: &str, detail: impl Into<String>) -> anyhow::Error {
    PipelineError::UnsupportedValue {
        column: column.to_string(),
        detail: detail.into(),
    }
    .into()
}

fn encode_text(column: &str, text: &str) -> Result<Vec<u8>> {
    let (encoded, _, had_errors) = WINDOWS_1252.encode(text);
    if had_errors {
        return Err(unsupported(column, format!("'{text}' is not representable in Latin-1")));
    }
    Ok(encoded.into_owned())
}

fn plan_long(column: &str, value: Option<i64>) -> Result<i32> {
    match value {
        None => Ok(LONG_MISSING),
        Some(v) if (LONG_MIN_VALID..=LONG_MAX_VALID as i64).contains(&v) => Ok(v as i32),
        Some(v) => Err(unsupported(column, format!("{v} is outside the Stata long range"))),
    }
}

fn plan_double(column: &str, value: Option<f64>) -> Result<f64> {
    match value {
        None => Ok(f64::from_bits(DOUBLE_MISSING_BITS)),
        Some(v) if !v.is_finite() => Err(unsupported(column, format!("non-finite value {v}"))),
        Some(v) if v >= f64::from_bits(DOUBLE_MISSING_BITS) => {
            Err(unsupported(column, format!("{v} collides with Stata missing codes")))
        }
        Some(v) => Ok(v),
    }
}

fn plan_column(column: &DtaColumn) -> Result<ColumnPlan> {
    let name = variable_name(&column.header);
    let label = encode_text(&column.header, &column.header)?;
    let header = column.header.as_str();
    let plan = match &column.values {
        ColumnValues::Long(values) => ColumnPlan {
            name,
            label,
            type_code: TYPE_LONG,
            format: "%12.0g".into(),
            value_labels: None,
            cells: PlannedCells::Long(
                values.iter().map(|v| plan_long(header, *v)).collect::<Result<_>>()?,
            ),
        },
        ColumnValues::Double(values) => ColumnPlan {
            name,
            label,
            type_code: TYPE_DOUBLE,
            format: "%10.0g".into(),
            value_labels: None,
            cells: PlannedCells::Double(
                values.iter().map(|v| plan_double(header, *v)).collect::<Result<_>>()?,
            ),
        },
        ColumnValues::Text(values) => {
            let cells = values
                .iter()
                .map(|v| encode_text(header, v))
                .collect::<Result<Vec<_>>>()?;
            let width = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);
            if width > MAX_STR_WIDTH {
                return Err(unsupported(
                    header,
                    format!("string of {width} bytes exceeds str{MAX_STR_WIDTH}"),
                ));
            }
            ColumnPlan {
                name,
                label,
                type_code: width as u8,
                format: format!("%{width}s"),
                value_labels: None,
                cells: PlannedCells::Text { width, cells },
            }
        }
        ColumnValues::Categorical(values) => {
            let mut categories: Vec<&str> = values.iter().flatten().map(String::as_str).collect();
            categories.sort_unstable();
            categories.dedup();
            let codes: HashMap<&str, i32> = categories
                .iter()
                .enumerate()
                .map(|(idx, c)| (*c, idx as i32))
                .collect();
            let cells = values
                .iter()
                .map(|v| v.as_deref().map_or(LONG_MISSING, |c| codes[c]))
                .collect();
            let value_labels = categories
                .iter()
                .enumerate()
                .map(|(idx, c)| Ok((idx as i32, encode_text(header, c)?)))
                .collect::<Result<Vec<_>>>()?;
            ColumnPlan {
                name,
                label,
                type_code: TYPE_LONG,
                format: "%12.0g".into(),
                value_labels: Some(value_labels),
                cells: PlannedCells::Long(cells),
            }
        }
    };
    Ok(plan)
}

fn put_fixed(buf: &mut Vec<u8>, bytes: &[u8], width: usize) {
    let len = bytes.len().min(width - 1);
    buf.extend_from_slice(&bytes[..len]);
    buf.resize(buf.len() + (width - len), 0);
}

/// Serializes `frame` as a format-114 little-endian file.
pub fn encode_dta(frame: &DtaFrame, timestamp: &str) -> Result<Vec<u8>> {
    let nobs = frame.row_count()?;
    let plans = frame.columns.iter().map(plan_column).collect::<Result<Vec<_>>>()?;
    let nvar = u16::try_from(plans.len()).map_err(|_| anyhow!("Too many columns for a .dta file"))?;
    let nobs_u32 = u32::try_from(nobs).map_err(|_| anyhow!("Too many rows for a .dta file"))?;

    let mut buf = Vec::new();
    buf.extend_from_slice(&[WRITE_FORMAT, BYTE_ORDER_LOHI, 0x01, 0x00]);
    buf.extend_from_slice(&nvar.to_le_bytes());
    buf.extend_from_slice(&nobs_u32.to_le_bytes());
    put_fixed(&mut buf, &encode_text("data label", &frame.label)?, LABEL_WIDTH);
    put_fixed(&mut buf, timestamp.as_bytes(), TIMESTAMP_WIDTH);

    buf.extend(plans.iter().map(|p| p.type_code));
    for plan in &plans {
        put_fixed(&mut buf, plan.name.as_bytes(), NAME_WIDTH);
    }
    buf.resize(buf.len() + 2 * (plans.len() + 1), 0);
    for plan in &plans {
        put_fixed(&mut buf, plan.format.as_bytes(), FORMAT_WIDTH_114);
    }
    for plan in &plans {
        let label_name = if plan.value_labels.is_some() { plan.name.as_str() } else { "" };
        put_fixed(&mut buf, label_name.as_bytes(), NAME_WIDTH);
    }
    for plan in &plans {
        put_fixed(&mut buf, &plan.label, LABEL_WIDTH);
    }
    // No expansion fields: just the terminator.
    buf.push(0);
    buf.extend_from_slice(&0u32.to_le_bytes());

    for row in 0..nobs {
        for plan in &plans {
            match &plan.cells {
                PlannedCells::Long(cells) => buf.extend_from_slice(&cells[row].to_le_bytes()),
                PlannedCells::Double(cells) => buf.extend_from_slice(&cells[row].to_le_bytes()),
                PlannedCells::Text { width, cells } => {
                    let cell = &cells[row];
                    buf.extend_from_slice(cell);
                    buf.resize(buf.len() + (width - cell.len()), 0);
                }
            }
        }
    }

    for plan in &plans {
        if let Some(labels) = &plan.value_labels {
            write_value_labels(&mut buf, &plan.name, labels);
        }
    }
    Ok(buf)
}

fn write_value_labels(buf: &mut Vec<u8>, name: &str, labels: &[(i32, Vec<u8>)]) {
    let mut offsets = Vec::with_capacity(labels.len());
    let mut text = Vec::new();
    for (_, label) in labels {
        offsets.push(text.len() as u32);
        text.extend_from_slice(label);
        text.push(0);
    }
    let n = labels.len() as u32;
    let table_len = 8 + 8 * n + text.len() as u32;

    buf.extend_from_slice(&table_len.to_le_bytes());
    put_fixed(buf, name.as_bytes(), NAME_WIDTH);
    buf.extend_from_slice(&[0, 0, 0]);
    buf.extend_from_slice(&n.to_le_bytes());
    buf.extend_from_slice(&(text.len() as u32).to_le_bytes());
    for offset in offsets {
        buf.extend_from_slice(&offset.to_le_bytes());
    }
    for (value, _) in labels {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.extend_from_slice(&text);
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            big_endian: false,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            bail!("Unexpected end of .dta data at byte {} (wanted {n} more)", self.pos);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out: [u8; N] = self.take(N)?.try_into()?;
        if self.big_endian {
            out.reverse();
        }
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn fixed_str(&mut self, width: usize) -> Result<String> {
        Ok(decode_text(self.take(width)?))
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let bytes = &bytes[..end];
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}

pub fn read_dta(path: &Path) -> Result<RawTable> {
    let bytes = fs::read(path).with_context(|| format!("Opening Stata file {path:?}"))?;
    parse_dta(&bytes).with_context(|| format!("Parsing Stata file {path:?}"))
}

/// Parses a format 113/114/115 file. Labelled integer cells become their label text.
pub fn parse_dta(bytes: &[u8]) -> Result<RawTable> {
    if bytes.starts_with(b"<stata_dta>") {
        bail!("XML-tagged .dta formats (117 and later) are not supported");
    }
    let mut cursor = ByteCursor::new(bytes);
    let format = cursor.u8()?;
    let format_width = match format {
        113 => FORMAT_WIDTH_113,
        114 | 115 => FORMAT_WIDTH_114,
        other => bail!("Unsupported .dta format {other}"),
    };
    cursor.big_endian = match cursor.u8()? {
        BYTE_ORDER_HILO => true,
        BYTE_ORDER_LOHI => false,
        other => bail!("Unknown .dta byte order marker {other}"),
    };
    cursor.take(2)?;
    let nvar = cursor.u16()? as usize;
    let nobs = cursor.u32()? as usize;
    cursor.take(LABEL_WIDTH + TIMESTAMP_WIDTH)?;

    let types = cursor.take(nvar)?.to_vec();
    let names = (0..nvar)
        .map(|_| cursor.fixed_str(NAME_WIDTH))
        .collect::<Result<Vec<_>>>()?;
    cursor.take(2 * (nvar + 1))?;
    cursor.take(format_width * nvar)?;
    let label_names = (0..nvar)
        .map(|_| cursor.fixed_str(NAME_WIDTH))
        .collect::<Result<Vec<_>>>()?;
    cursor.take(LABEL_WIDTH * nvar)?;

    loop {
        let kind = cursor.u8()?;
        let len = cursor.u32()? as usize;
        if kind == 0 && len == 0 {
            break;
        }
        cursor.take(len)?;
    }

    for (idx, code) in types.iter().enumerate() {
        if !matches!(*code, 1..=244 | TYPE_BYTE..=TYPE_DOUBLE) {
            bail!("Variable '{}' has unsupported type code {code}", names[idx]);
        }
    }

    let row_width: usize = types.iter().map(|code| cell_width(*code)).sum();
    ensure!(
        row_width > 0 || nobs == 0,
        "Header claims {nobs} observation(s) but declares no variables"
    );
    ensure!(
        nobs.checked_mul(row_width)
            .is_some_and(|needed| needed <= cursor.remaining()),
        "Header claims {nobs} observation(s) of {row_width} byte(s) but only {} byte(s) remain",
        cursor.remaining()
    );

    let mut table = RawTable::new(names);
    table.rows.reserve(nobs);
    for _ in 0..nobs {
        let row = types
            .iter()
            .map(|code| read_cell(&mut cursor, *code))
            .collect::<Result<Vec<_>>>()?;
        table.rows.push(row);
    }

    let value_labels = read_value_labels(&mut cursor)?;
    for (column, label_name) in label_names.iter().enumerate() {
        let Some(labels) = value_labels.get(label_name) else {
            continue;
        };
        for row in table.rows.iter_mut() {
            if let Some(Value::Integer(code)) = row[column]
                && let Some(text) = labels.get(&code)
            {
                row[column] = Some(Value::Text(text.clone()));
            }
        }
    }
    Ok(table)
}

fn cell_width(code: u8) -> usize {
    match code {
        TYPE_BYTE => 1,
        TYPE_INT => 2,
        TYPE_LONG | TYPE_FLOAT => 4,
        TYPE_DOUBLE => 8,
        width => width as usize,
    }
}

fn read_cell(cursor: &mut ByteCursor<'_>, code: u8) -> Result<Option<Value>> {
    let cell = match code {
        TYPE_BYTE => {
            let v = cursor.i8()?;
            (v <= BYTE_MAX_VALID).then_some(Value::Integer(v as i64))
        }
        TYPE_INT => {
            let v = cursor.i16()?;
            (v <= INT_MAX_VALID).then_some(Value::Integer(v as i64))
        }
        TYPE_LONG => {
            let v = cursor.i32()?;
            (v <= LONG_MAX_VALID).then_some(Value::Integer(v as i64))
        }
        TYPE_FLOAT => {
            let v = cursor.f32()?;
            (v < f32::from_bits(FLOAT_MISSING_BITS)).then_some(Value::Float(v as f64))
        }
        TYPE_DOUBLE => {
            let v = cursor.f64()?;
            (v < f64::from_bits(DOUBLE_MISSING_BITS)).then_some(Value::Float(v))
        }
        width => Some(Value::Text(cursor.fixed_str(width as usize)?)),
    };
    Ok(cell)
}

fn read_value_labels(cursor: &mut ByteCursor<'_>) -> Result<HashMap<String, HashMap<i64, String>>> {
    let mut tables = HashMap::new();
    while cursor.remaining() > 0 {
        let len = cursor.u32()? as usize;
        let name = cursor.fixed_str(NAME_WIDTH)?;
        cursor.take(3)?;
        let mut table = ByteCursor {
            bytes: cursor.take(len)?,
            pos: 0,
            big_endian: cursor.big_endian,
        };
        let n = table.u32()? as usize;
        let text_len = table.u32()? as usize;
        let offsets = (0..n).map(|_| table.u32()).collect::<Result<Vec<_>>>()?;
        let values = (0..n).map(|_| table.i32()).collect::<Result<Vec<_>>>()?;
        let text = table.take(text_len)?;
        let mut labels = HashMap::with_capacity(n);
        for (offset, value) in offsets.into_iter().zip(values) {
            let offset = offset as usize;
            ensure!(offset <= text.len(), "Value label offset {offset} out of range in '{name}'");
            labels.insert(value as i64, decode_text(&text[offset..]));
        }
        tables.insert(name, labels);
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DtaFrame {
        let mut frame = DtaFrame {
            label: "sample".into(),
            ..DtaFrame::default()
        };
        frame.push("Country Code", ColumnValues::Long(vec![Some(132), Some(913), None]));
        frame.push(
            "Value",
            ColumnValues::Double(vec![Some(1.5), None, Some(-2.0)]),
        );
        frame.push(
            "TimeSeriesKey",
            ColumnValues::Text(vec!["132_aB_GG_33".into(), "x".into(), String::new()]),
        );
        frame.push(
            "Rep_Basis",
            ColumnValues::Categorical(vec![
                Some("Cash Basis".into()),
                Some("Accrual".into()),
                None,
            ]),
        );
        frame
    }

    #[test]
    fn variable_names_are_snake_case_identifiers() {
        assert_eq!(variable_name("Country Code"), "country_code");
        assert_eq!(variable_name("Value_Diff_Perc"), "value_diff_perc");
        assert_eq!(variable_name("2014"), "_2014");
        assert!(variable_name(&"x".repeat(40)).len() <= 32);
    }

    #[test]
    fn header_layout_matches_format_114() {
        let bytes = encode_dta(&sample_frame(), "18 Oct 2026 09:30").unwrap();
        assert_eq!(bytes[0], 114);
        assert_eq!(bytes[1], BYTE_ORDER_LOHI);
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 4);
        assert_eq!(u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]), 3);
        let types_at = 10 + LABEL_WIDTH + TIMESTAMP_WIDTH;
        assert_eq!(&bytes[types_at..types_at + 4], &[TYPE_LONG, TYPE_DOUBLE, 12, TYPE_LONG]);
    }

    #[test]
    fn round_trips_through_reader() {
        let bytes = encode_dta(&sample_frame(), "18 Oct 2026 09:30").unwrap();
        let table = parse_dta(&bytes).unwrap();
        assert_eq!(
            table.headers,
            vec!["country_code", "value", "time_series_key", "rep_basis"]
        );
        assert_eq!(table.rows[0][0], Some(Value::Integer(132)));
        assert_eq!(table.rows[2][0], None);
        assert_eq!(table.rows[0][1], Some(Value::Float(1.5)));
        assert_eq!(table.rows[1][1], None);
        assert_eq!(table.rows[0][2], Some(Value::Text("132_aB_GG_33".into())));
        assert_eq!(table.rows[2][2], Some(Value::Text(String::new())));
        assert_eq!(table.rows[0][3], Some(Value::Text("Cash Basis".into())));
        assert_eq!(table.rows[1][3], Some(Value::Text("Accrual".into())));
        assert_eq!(table.rows[2][3], None);
    }

    #[test]
    fn big_endian_input_is_supported() {
        // Hand-built format 113 file: one byte column, one float column, two rows.
        let mut bytes = vec![113, BYTE_ORDER_HILO, 1, 0];
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.resize(bytes.len() + LABEL_WIDTH + TIMESTAMP_WIDTH, 0);
        bytes.extend_from_slice(&[TYPE_BYTE, TYPE_FLOAT]);
        for name in ["flag", "ratio"] {
            let start = bytes.len();
            bytes.extend_from_slice(name.as_bytes());
            bytes.resize(start + NAME_WIDTH, 0);
        }
        bytes.resize(bytes.len() + 2 * 3 + FORMAT_WIDTH_113 * 2 + NAME_WIDTH * 2 + LABEL_WIDTH * 2, 0);
        bytes.push(0);
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.push(7);
        bytes.extend_from_slice(&0.5f32.to_be_bytes());
        bytes.push(101);
        bytes.extend_from_slice(&f32::from_bits(FLOAT_MISSING_BITS).to_be_bytes());

        let table = parse_dta(&bytes).unwrap();
        assert_eq!(table.headers, vec!["flag", "ratio"]);
        assert_eq!(table.rows[0], vec![Some(Value::Integer(7)), Some(Value::Float(0.5))]);
        assert_eq!(table.rows[1], vec![None, None]);
    }

    #[test]
    fn non_finite_doubles_are_unsupported() {
        let mut frame = DtaFrame::default();
        frame.push("Value_Diff_Perc", ColumnValues::Double(vec![Some(f64::INFINITY)]));
        let err = encode_dta(&frame, "").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn out_of_range_longs_and_wide_strings_are_unsupported() {
        let mut frame = DtaFrame::default();
        frame.push("Country Code", ColumnValues::Long(vec![Some(i64::MAX)]));
        assert!(encode_dta(&frame, "").is_err());

        let mut frame = DtaFrame::default();
        frame.push("Sector Name", ColumnValues::Text(vec!["s".repeat(300)]));
        assert!(encode_dta(&frame, "").is_err());
    }

    #[test]
    fn header_claiming_more_rows_than_present_is_an_error() {
        let mut bytes = vec![114, BYTE_ORDER_LOHI, 1, 0];
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.resize(bytes.len() + LABEL_WIDTH + TIMESTAMP_WIDTH + 2, 0);
        bytes.push(0);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert!(parse_dta(&bytes).is_err());

        let mut truncated = encode_dta(&sample_frame(), "").unwrap();
        truncated[6..10].copy_from_slice(&1_000_000u32.to_le_bytes());
        let err = parse_dta(&truncated).unwrap_err();
        assert!(err.to_string().contains("1000000 observation(s)"));
    }

    #[test]
    fn xml_formats_are_rejected() {
        assert!(parse_dta(b"<stata_dta><header>").is_err());
    }
}

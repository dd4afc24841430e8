use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        Some(value) => Encoding::for_label(value.as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        // Bulk downloads occasionally carry ragged trailing columns.
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    has_headers: bool,
) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = Box::new(BufReader::new(
        File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
    ));
    Ok(open_csv_reader(reader, delimiter, has_headers))
}

/// Feeds the remaining records of `reader` to `handle` in chunks of at most
/// `chunk_rows`. Returns the number of records read.
pub fn for_each_chunk<R, F>(reader: &mut csv::Reader<R>, chunk_rows: usize, mut handle: F) -> Result<usize>
where
    R: Read,
    F: FnMut(&[csv::ByteRecord]) -> Result<()>,
{
    let chunk_rows = chunk_rows.max(1);
    let mut chunk: Vec<csv::ByteRecord> = Vec::with_capacity(chunk_rows);
    let mut total = 0usize;
    loop {
        let mut record = csv::ByteRecord::new();
        let more = reader
            .read_byte_record(&mut record)
            .with_context(|| format!("Reading row {}", total + 2))?;
        if more {
            total += 1;
            chunk.push(record);
        }
        if chunk.len() == chunk_rows || (!more && !chunk.is_empty()) {
            handle(&chunk)?;
            chunk.clear();
        }
        if !more {
            return Ok(total);
        }
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Creating output directory {parent:?}"))?;
    }
    Ok(())
}

/// Opens a UTF-8 CSV writer at `path`, or stdout when `path` is `None`.
pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) => {
            ensure_parent_dir(p)?;
            Box::new(BufWriter::new(
                File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
            ))
        }
        None => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    // `Encoding::decode` sniffs and strips a leading byte order mark.
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;
    use std::io::Cursor;

    #[test]
    fn encoding_defaults_to_utf8() {
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
        assert_eq!(resolve_encoding(Some("  ")).unwrap(), UTF_8);
        assert_eq!(resolve_encoding(Some("latin1")).unwrap(), WINDOWS_1252);
        assert!(resolve_encoding(Some("klingon")).is_err());
    }

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), Some(b';')), b';');
    }

    #[test]
    fn chunks_cover_every_record_once() {
        let mut reader = open_csv_reader(Cursor::new(b"n\n1\n2\n3\n4\n5\n".to_vec()), b',', true);
        let mut sizes = Vec::new();
        let total = for_each_chunk(&mut reader, 2, |chunk| {
            sizes.push(chunk.len());
            Ok(())
        })
        .unwrap();
        assert_eq!(total, 5);
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn headers_drop_byte_order_mark_and_decode_latin1() {
        let mut reader = open_csv_reader(Cursor::new(b"\xEF\xBB\xBFCode,Name\n".to_vec()), b',', true);
        assert_eq!(reader_headers(&mut reader, UTF_8).unwrap(), vec!["Code", "Name"]);

        let record = csv::ByteRecord::from(vec![&b"C\xF4te d'Ivoire"[..]]);
        assert_eq!(
            decode_record(&record, WINDOWS_1252).unwrap(),
            vec!["Côte d'Ivoire"]
        );
        assert!(decode_record(&record, UTF_8).is_err());
    }
}

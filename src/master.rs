use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::{
    io_utils,
    model::{MasterRecord, ReportingBasis},
    stata::{self, ColumnValues, DtaFrame},
};

pub fn write_master_csv(path: &Path, records: &[MasterRecord]) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(Some(path), io_utils::DEFAULT_CSV_DELIMITER)?;
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("Writing master row to {path:?}"))?;
    }
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    info!("Wrote {} row(s) to {path:?}", records.len());
    Ok(())
}

pub fn read_master_csv(path: &Path) -> Result<Vec<MasterRecord>> {
    let delimiter = io_utils::resolve_input_delimiter(path, None);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<MasterRecord>().enumerate() {
        records.push(row.with_context(|| format!("Parsing row {} of {path:?}", idx + 2))?);
    }
    Ok(records)
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

/// Column layout of the master table in `.dta` form.
///
/// Text columns become value-labelled `long`s. A non-finite `Value` is written
/// as missing. Diff columns must already be finite or missing; see
/// [`crate::diff::normalize_non_finite`].
pub fn master_frame(records: &[MasterRecord], label: &str) -> DtaFrame {
    let longs = |f: fn(&MasterRecord) -> i64| {
        ColumnValues::Long(records.iter().map(|r| Some(f(r))).collect())
    };
    let doubles = |f: fn(&MasterRecord) -> Option<f64>| {
        ColumnValues::Double(records.iter().map(f).collect())
    };
    let categories = |f: fn(&MasterRecord) -> Option<String>| {
        ColumnValues::Categorical(records.iter().map(f).collect())
    };

    let mut frame = DtaFrame {
        label: label.to_string(),
        ..DtaFrame::default()
    };
    frame.push("Country Code", longs(|r| r.country_code));
    frame.push("Country Name", categories(|r| r.country_name.clone()));
    frame.push("Year", longs(|r| r.year));
    frame.push("Vintage", longs(|r| r.vintage));
    frame.push(
        "Rep_Basis",
        categories(|r| match &r.reporting_basis {
            ReportingBasis::Unspecified => None,
            basis => Some(basis.label().to_string()),
        }),
    );
    frame.push("Value", doubles(|r| r.value.is_finite().then_some(r.value)));
    frame.push("Sector Name", categories(|r| non_empty(&r.sector_name)));
    frame.push("Descriptor", categories(|r| non_empty(&r.descriptor)));
    frame.push("Residence Name", categories(|r| non_empty(&r.residence_name)));
    frame.push("Value_Diff", doubles(|r| r.value_diff));
    frame.push("Value_Diff_Perc", doubles(|r| r.value_diff_perc));
    frame.push("Abs_Diff_Perc", doubles(|r| r.abs_diff_perc));
    frame
}

pub fn write_master_dta(path: &Path, records: &[MasterRecord], label: &str) -> Result<()> {
    io_utils::ensure_parent_dir(path)?;
    stata::write_dta(path, &master_frame(records, label))?;
    info!("Wrote {} row(s) to {path:?}", records.len());
    Ok(())
}

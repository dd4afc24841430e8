use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    error::PipelineError,
    model::{CanonicalRecord, DebtType, ReportingBasis, SourceFormat},
};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    // Must stay the first field: `load` peeks at it when the body fails to decode.
    version: u32,
    pub debt_type: DebtType,
    pub format: SourceFormat,
    pub vintage: i64,
    country_code: Vec<i64>,
    country_name: Vec<Option<String>>,
    year: Vec<i64>,
    value: Vec<f64>,
    reporting_basis: Vec<String>,
    sector_name: Vec<String>,
    legacy_name: Vec<Option<String>>,
}

pub fn snapshot_path(dir: &Path, debt_type: DebtType, format: SourceFormat, vintage: i64) -> PathBuf {
    dir.join(format!("{debt_type}_{format}_{vintage}.bin"))
}

impl UnitSnapshot {
    pub fn from_records(
        debt_type: DebtType,
        format: SourceFormat,
        vintage: i64,
        records: &[CanonicalRecord],
    ) -> Self {
        let mut snapshot = UnitSnapshot {
            version: SNAPSHOT_VERSION,
            debt_type,
            format,
            vintage,
            country_code: Vec::with_capacity(records.len()),
            country_name: Vec::with_capacity(records.len()),
            year: Vec::with_capacity(records.len()),
            value: Vec::with_capacity(records.len()),
            reporting_basis: Vec::with_capacity(records.len()),
            sector_name: Vec::with_capacity(records.len()),
            legacy_name: Vec::with_capacity(records.len()),
        };
        for record in records {
            snapshot.country_code.push(record.country_code);
            snapshot.country_name.push(record.country_name.clone());
            snapshot.year.push(record.year);
            snapshot.value.push(record.value);
            snapshot.reporting_basis.push(record.reporting_basis.label().to_string());
            snapshot.sector_name.push(record.sector_name.clone());
            snapshot.legacy_name.push(record.legacy_name.clone());
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.country_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.country_code.is_empty()
    }

    pub fn into_records(self) -> Result<Vec<CanonicalRecord>> {
        let rows = self.len();
        ensure!(
            [
                self.country_name.len(),
                self.year.len(),
                self.value.len(),
                self.reporting_basis.len(),
                self.sector_name.len(),
                self.legacy_name.len(),
            ]
            .iter()
            .all(|len| *len == rows),
            "Snapshot columns for {}/{}/{} have unequal lengths",
            self.debt_type,
            self.format,
            self.vintage
        );
        let vintage = self.vintage;
        let records = self
            .country_code
            .into_iter()
            .zip(self.country_name)
            .zip(self.year)
            .zip(self.value)
            .zip(self.reporting_basis)
            .zip(self.sector_name)
            .zip(self.legacy_name)
            .map(
                |((((((country_code, country_name), year), value), basis), sector_name), legacy_name)| {
                    CanonicalRecord {
                        country_code,
                        country_name,
                        year,
                        vintage,
                        value,
                        reporting_basis: ReportingBasis::from_label(&basis),
                        sector_name,
                        legacy_name,
                    }
                },
            )
            .collect();
        Ok(records)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating snapshot directory {parent:?}"))?;
        }
        let file = File::create(path).with_context(|| format!("Creating snapshot file {path:?}"))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .with_context(|| format!("Writing snapshot file {path:?}"))?;
        writer
            .flush()
            .with_context(|| format!("Flushing snapshot file {path:?}"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("Opening snapshot file {path:?}"))?;
        let version_error = |found: u32| PipelineError::SnapshotVersion {
            path: path.to_path_buf(),
            found,
            expected: SNAPSHOT_VERSION,
        };
        match bincode::serde::decode_from_slice::<UnitSnapshot, _>(&bytes, bincode::config::standard()) {
            Ok((snapshot, _)) if snapshot.version != SNAPSHOT_VERSION => {
                Err(version_error(snapshot.version).into())
            }
            Ok((snapshot, _)) => Ok(snapshot),
            Err(err) => {
                let peeked =
                    bincode::serde::decode_from_slice::<u32, _>(&bytes, bincode::config::standard());
                match peeked {
                    Ok((found, _)) if found != SNAPSHOT_VERSION => Err(version_error(found).into()),
                    _ => Err(err).with_context(|| format!("Reading snapshot file {path:?}")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Vec<CanonicalRecord> {
        vec![
            CanonicalRecord {
                country_code: 132,
                country_name: None,
                year: 2001,
                vintage: 2006,
                value: 10.5,
                reporting_basis: ReportingBasis::CashBasis,
                sector_name: "General government".into(),
                legacy_name: Some("France".into()),
            },
            CanonicalRecord {
                country_code: 913,
                country_name: Some("Belarus".into()),
                year: 2002,
                vintage: 2006,
                value: -3.0,
                reporting_basis: ReportingBasis::Other("Mixed".into()),
                sector_name: String::new(),
                legacy_name: None,
            },
        ]
    }

    #[test]
    fn save_and_load_restores_records() {
        let dir = tempdir().unwrap();
        let path = snapshot_path(dir.path(), DebtType::Total, SourceFormat::Legacy, 2006);
        assert!(path.ends_with("total_legacy_2006.bin"));

        UnitSnapshot::from_records(DebtType::Total, SourceFormat::Legacy, 2006, &sample())
            .save(&path)
            .unwrap();
        let loaded = UnitSnapshot::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.into_records().unwrap(), sample());
    }

    #[test]
    fn version_mismatch_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stale.bin");
        let mut snapshot =
            UnitSnapshot::from_records(DebtType::Foreign, SourceFormat::Wide, 2016, &sample());
        snapshot.version = SNAPSHOT_VERSION + 1;
        snapshot.save(&path).unwrap();

        let err = UnitSnapshot::load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::SnapshotVersion { found, .. }) if *found == SNAPSHOT_VERSION + 1
        ));
    }
}

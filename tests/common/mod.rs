#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use gfs_vintages::config::{LegacyExtension, PipelineConfig};
use tempfile::{TempDir, tempdir};

pub const LEGACY_HEADER: &str = "TimeSeriesKey,OValue17,OStartYY,CTRY_CODE,CTRY_NAME,Rep_Basis,S_Desc";

pub const WIDE_HEADER: &str = "Country Name,Country Code,Sector Name,Sector Code,Unit Code,Residence Code,\
Instrument and Assets Classification Code,\"Stocks, Transactions, and Other Flows Code\",Attribute,2000,2001,2002";

/// Scratch directory laid out like a pipeline data root, removed on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn data_root(&self) -> PathBuf {
        self.path().join("data")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    /// Writes `contents` under the workspace, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(&path, contents).expect("write fixture");
        path
    }

    /// Writes a legacy CSV extract for `vintage` from comma-separated rows.
    pub fn write_legacy(&self, vintage: i64, rows: &[&str]) -> PathBuf {
        let mut body = String::from(LEGACY_HEADER);
        for row in rows {
            body.push('\n');
            body.push_str(row);
        }
        body.push('\n');
        self.write(&format!("data/CD_DTA/gfs_{vintage}_CDROM.csv"), &body)
    }

    /// Writes a wide extract for `vintage` from comma-separated rows.
    pub fn write_wide(&self, vintage: i64, rows: &[&str]) -> PathBuf {
        let mut body = String::from(WIDE_HEADER);
        for row in rows {
            body.push('\n');
            body.push_str(row);
        }
        body.push('\n');
        self.write(&format!("data/WEB_CSV/GFSIBS{vintage}.csv"), &body)
    }

    /// Configuration reading CSV legacy extracts from this workspace.
    pub fn config(&self, legacy_years: &[i64], wide_years: &[i64]) -> PipelineConfig {
        PipelineConfig {
            data_root: self.data_root(),
            output_dir: self.output_dir(),
            legacy_years: legacy_years.to_vec(),
            wide_years: wide_years.to_vec(),
            legacy_extension: LegacyExtension::Csv,
            ..PipelineConfig::default()
        }
    }

    /// France across two legacy vintages and one wide vintage, all three debt types.
    pub fn write_france_fixture(&self) {
        self.write_legacy(
            2006,
            &[
                "132_aB_GG_33,100,2001,132,FRANCE,Cash Basis,General government",
                "132_aB_GG_331,60,2001,132,FRANCE,Cash Basis,General government",
                "132_aB_GG_332,40,2001,132,FRANCE,Cash Basis,General government",
                "132_aZ_GG_33,999,2001,132,FRANCE,Cash Basis,General government",
            ],
        );
        self.write_legacy(
            2008,
            &[
                "132_aB_GG_33,110,2001,132,FRANCE,Cash Basis ,General government ",
                "132_aC_GG_33,555,2001,132,FRANCE,Cash Basis,General government",
            ],
        );
        self.write_wide(
            2016,
            &[
                "France,132,General government,S13,XDC,W0|S1,F,G33,Value,,121,",
                "France,132,General government,S13,XDC,W0|S1,F,G33,Bases of recording (Cash/ Non Cash),,CA,",
                "France,132,General government,S13,EUR,W0|S1,F,G33,Value,,7,",
            ],
        );
    }
}

pub fn approx(actual: Option<f64>, expected: f64) -> bool {
    actual.is_some_and(|v| (v - expected).abs() < 1e-9)
}

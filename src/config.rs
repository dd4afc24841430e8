use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{error::PipelineError, model::DebtType, redenomination::RedenominationRule, yaml_provider};

/// Per-debt-type predicates for both source formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtTypeRule {
    /// Series-key suffix selecting the series in legacy extracts.
    pub legacy_suffix: String,
    /// `Residence Code` value selecting the series in wide extracts.
    pub residence_code: String,
}

/// Column names and values the legacy extracts are read with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyColumns {
    pub series_key: String,
    pub value: String,
    pub start_year: String,
    pub country_code: String,
    pub country_name: String,
    pub reporting_basis: String,
    pub sector: String,
}

impl Default for LegacyColumns {
    fn default() -> Self {
        Self {
            series_key: "TimeSeriesKey".into(),
            value: "OValue17".into(),
            start_year: "OStartYY".into(),
            country_code: "CTRY_CODE".into(),
            country_name: "CTRY_NAME".into(),
            reporting_basis: "Rep_Basis".into(),
            sector: "S_Desc".into(),
        }
    }
}

/// Column names and exact-match codes the wide extracts are filtered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WideColumns {
    pub country_code: String,
    pub country_name: String,
    pub sector_name: String,
    pub attribute: String,
    pub unit_code: String,
    pub residence_code: String,
    pub classification_code: String,
    pub flow_code: String,
    pub sector_code: String,
    /// Attribute label of observation rows.
    pub value_attribute: String,
    /// Attribute label of the basis-of-recording rows.
    pub basis_attribute: String,
    /// Required `Unit Code` (domestic currency).
    pub unit: String,
    /// Required classification code (total financial assets/liabilities).
    pub classification: String,
    /// Required flow code (net incurrence of liabilities).
    pub flow: String,
    /// Required sector code (general government).
    pub sector: String,
}

impl Default for WideColumns {
    fn default() -> Self {
        Self {
            country_code: "Country Code".into(),
            country_name: "Country Name".into(),
            sector_name: "Sector Name".into(),
            attribute: "Attribute".into(),
            unit_code: "Unit Code".into(),
            residence_code: "Residence Code".into(),
            classification_code: "Instrument and Assets Classification Code".into(),
            flow_code: "Stocks, Transactions, and Other Flows Code".into(),
            sector_code: "Sector Code".into(),
            value_attribute: "Value".into(),
            basis_attribute: "Bases of recording (Cash/ Non Cash)".into(),
            unit: "XDC".into(),
            classification: "F".into(),
            flow: "G33".into(),
            sector: "S13".into(),
        }
    }
}

/// Matching rules for both source formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub debt_types: BTreeMap<DebtType, DebtTypeRule>,
    /// Series-key infixes marking non-primary or adjustment series; dropped.
    pub reserved_infixes: Vec<String>,
    /// Series-key infixes preferred when rows collide on (year, country, vintage).
    pub primary_infixes: Vec<String>,
    /// Wide-format basis codes mapped to reporting-basis labels.
    pub basis_codes: BTreeMap<String, String>,
    pub legacy: LegacyColumns,
    pub wide: WideColumns,
    pub first_year: i64,
    pub last_year: i64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let debt_types = BTreeMap::from([
            (
                DebtType::Total,
                DebtTypeRule {
                    legacy_suffix: "GG_33".into(),
                    residence_code: "W0|S1".into(),
                },
            ),
            (
                DebtType::Domestic,
                DebtTypeRule {
                    legacy_suffix: "GG_331".into(),
                    residence_code: "W2|S1".into(),
                },
            ),
            (
                DebtType::Foreign,
                DebtTypeRule {
                    legacy_suffix: "GG_332".into(),
                    residence_code: "W1|S1".into(),
                },
            ),
        ]);
        Self {
            debt_types,
            reserved_infixes: vec!["_aZ_".into(), "_cZ_".into()],
            primary_infixes: vec!["_aB_".into(), "_cB_".into()],
            basis_codes: BTreeMap::from([
                ("AC".to_string(), "Accrual".to_string()),
                ("CA".to_string(), "Cash Basis".to_string()),
            ]),
            legacy: LegacyColumns::default(),
            wide: WideColumns::default(),
            first_year: 1970,
            last_year: 2025,
        }
    }
}

impl SourceConfig {
    /// Looks up the predicates for `debt_type`, failing before any file is touched.
    pub fn rule(&self, debt_type: DebtType) -> Result<&DebtTypeRule, PipelineError> {
        self.debt_types.get(&debt_type).ok_or_else(|| {
            PipelineError::InvalidArgument(format!(
                "no source predicates configured for debt type '{debt_type}'"
            ))
        })
    }

    pub fn year_in_window(&self, year: i64) -> bool {
        (self.first_year..=self.last_year).contains(&year)
    }
}

/// Extension of the legacy extracts on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyExtension {
    Dta,
    Csv,
}

impl LegacyExtension {
    pub fn as_str(self) -> &'static str {
        match self {
            LegacyExtension::Dta => "dta",
            LegacyExtension::Csv => "csv",
        }
    }
}

/// Bulk-file keyword extraction and summary settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub keywords: Vec<String>,
    pub keyword_column: String,
    pub group_columns: Vec<String>,
    pub release_date: String,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["debt".into(), "liabilities".into(), "borrowing".into()],
            keyword_column: "Stocks, Transactions, and Other Flows Name".into(),
            group_columns: vec![
                "Stocks, Transactions, and Other Flows Name".into(),
                "Sector Name".into(),
                "Unit Name".into(),
                "Residence Name".into(),
                "Instrument and Assets Classification Name".into(),
            ],
            release_date: "01-16-2025".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_root: PathBuf,
    pub output_dir: PathBuf,
    pub legacy_years: Vec<i64>,
    pub wide_years: Vec<i64>,
    pub legacy_extension: LegacyExtension,
    /// Label of the wide files' input encoding (defaults to utf-8).
    pub input_encoding: Option<String>,
    /// Rows held in memory per chunk while scanning wide extracts.
    pub chunk_rows: usize,
    /// When set, each normalized unit is spilled to a columnar snapshot here.
    pub snapshot_dir: Option<PathBuf>,
    pub master_csv: String,
    pub master_dta: String,
    pub corrected_dta: String,
    pub corrected_csv: String,
    pub report_file: String,
    pub source: SourceConfig,
    pub redenominations: Vec<RedenominationRule>,
    pub summary: SummaryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            output_dir: PathBuf::from("bld/data/Merged"),
            legacy_years: vec![2004, 2005, 2006, 2007, 2008, 2009, 2010, 2012, 2013],
            wide_years: vec![2014, 2015, 2016, 2017, 2019, 2020, 2024],
            legacy_extension: LegacyExtension::Dta,
            input_encoding: None,
            chunk_rows: 10_000,
            snapshot_dir: None,
            master_csv: "all_types_net_incurrence_liabilities.csv".into(),
            master_dta: "all_types_net_incurrence_liabilities.dta".into(),
            corrected_dta: "net_incurrence_outlier_filtered.dta".into(),
            corrected_csv: "net_incurrence_outlier_filtered.csv".into(),
            report_file: "run_report.json".into(),
            source: SourceConfig::default(),
            redenominations: RedenominationRule::defaults(),
            summary: SummaryConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: PipelineConfig = yaml_provider::load_from_path(path)
            .with_context(|| format!("Loading pipeline config from {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        yaml_provider::save_to_path(path, self)
            .with_context(|| format!("Writing pipeline config to {path:?}"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_rows == 0 {
            return Err(PipelineError::InvalidArgument("chunk_rows must be positive".into()).into());
        }
        if self.source.first_year > self.source.last_year {
            return Err(PipelineError::InvalidArgument(format!(
                "year window {}..={} is empty",
                self.source.first_year, self.source.last_year
            ))
            .into());
        }
        let mut seen = HashSet::new();
        for rule in &self.redenominations {
            if !seen.insert(rule.country_code) {
                return Err(PipelineError::InvalidArgument(format!(
                    "more than one redenomination rule for country {}; windows would overlap",
                    rule.country_code
                ))
                .into());
            }
            if !rule.factor.is_finite() || rule.factor == 0.0 {
                return Err(PipelineError::InvalidArgument(format!(
                    "redenomination factor for country {} must be finite and non-zero",
                    rule.country_code
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn legacy_path(&self, year: i64) -> PathBuf {
        self.data_root.join("CD_DTA").join(format!(
            "gfs_{year}_CDROM.{}",
            self.legacy_extension.as_str()
        ))
    }

    pub fn wide_path(&self, year: i64) -> PathBuf {
        self.data_root
            .join("WEB_CSV")
            .join(format!("GFSIBS{year}.csv"))
    }

    /// Bulk release file, e.g. `GFSMAB/GFSMAB2016/GFSMAB2016_01-16-2025.csv`.
    pub fn bulk_path(&self, series: &str, year: i64) -> PathBuf {
        self.data_root
            .join(series)
            .join(format!("{series}{year}"))
            .join(format!("{series}{year}_{}.csv", self.summary.release_date))
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const NET_INCURRENCE_DESCRIPTOR: &str = "Net incurrence of liabilities";

/// Residence split of the liabilities series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtType {
    Total,
    Domestic,
    Foreign,
}

impl DebtType {
    pub const ALL: [DebtType; 3] = [DebtType::Total, DebtType::Domestic, DebtType::Foreign];

    pub fn label(self) -> &'static str {
        match self {
            DebtType::Total => "total",
            DebtType::Domestic => "domestic",
            DebtType::Foreign => "foreign",
        }
    }
}

impl fmt::Display for DebtType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DebtType {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "total" => Ok(DebtType::Total),
            "domestic" => Ok(DebtType::Domestic),
            "foreign" => Ok(DebtType::Foreign),
            other => Err(PipelineError::InvalidArgument(format!(
                "unknown debt type '{other}'; choose from 'total', 'domestic', or 'foreign'"
            ))),
        }
    }
}

/// Source format family a unit was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Legacy,
    Wide,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Legacy => f.write_str("legacy"),
            SourceFormat::Wide => f.write_str("wide"),
        }
    }
}

/// Accounting basis a country reported under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReportingBasis {
    Accrual,
    CashBasis,
    #[default]
    Unspecified,
    Other(String),
}

impl ReportingBasis {
    pub fn label(&self) -> &str {
        match self {
            ReportingBasis::Accrual => "Accrual",
            ReportingBasis::CashBasis => "Cash Basis",
            ReportingBasis::Unspecified => "",
            ReportingBasis::Other(label) => label,
        }
    }

    /// Interprets a free-text label. Surrounding whitespace is ignored.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "" => ReportingBasis::Unspecified,
            "Accrual" => ReportingBasis::Accrual,
            "Cash Basis" => ReportingBasis::CashBasis,
            other => ReportingBasis::Other(other.to_string()),
        }
    }
}

impl From<String> for ReportingBasis {
    fn from(value: String) -> Self {
        ReportingBasis::from_label(&value)
    }
}

impl From<ReportingBasis> for String {
    fn from(value: ReportingBasis) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for ReportingBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One normalized observation: a value for `year` as published in `vintage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub country_code: i64,
    pub country_name: Option<String>,
    pub year: i64,
    pub vintage: i64,
    pub value: f64,
    pub reporting_basis: ReportingBasis,
    pub sector_name: String,
    /// Country name as spelled in legacy extracts; consumed by the gap filler.
    pub legacy_name: Option<String>,
}

/// One row of the master longitudinal table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    #[serde(rename = "Country Code")]
    pub country_code: i64,
    #[serde(rename = "Country Name")]
    pub country_name: Option<String>,
    #[serde(rename = "Year")]
    pub year: i64,
    #[serde(rename = "Vintage")]
    pub vintage: i64,
    #[serde(rename = "Rep_Basis")]
    pub reporting_basis: ReportingBasis,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "Sector Name")]
    pub sector_name: String,
    #[serde(rename = "Descriptor")]
    pub descriptor: String,
    #[serde(rename = "Residence Name")]
    pub residence_name: String,
    #[serde(rename = "Value_Diff")]
    pub value_diff: Option<f64>,
    #[serde(rename = "Value_Diff_Perc")]
    pub value_diff_perc: Option<f64>,
    #[serde(rename = "Abs_Diff_Perc", default)]
    pub abs_diff_perc: Option<f64>,
}

impl MasterRecord {
    pub fn from_canonical(record: CanonicalRecord, debt_type: DebtType) -> Self {
        Self {
            country_code: record.country_code,
            country_name: record.country_name,
            year: record.year,
            vintage: record.vintage,
            reporting_basis: record.reporting_basis,
            value: record.value,
            sector_name: record.sector_name,
            descriptor: NET_INCURRENCE_DESCRIPTOR.to_string(),
            residence_name: debt_type.label().to_string(),
            value_diff: None,
            value_diff_perc: None,
            abs_diff_perc: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debt_type_rejects_unknown_labels() {
        assert_eq!("Domestic".parse::<DebtType>().unwrap(), DebtType::Domestic);
        let err = "external".parse::<DebtType>().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
    }

    #[test]
    fn reporting_basis_labels_round_trip() {
        for label in ["Accrual", "Cash Basis", "", "Mixed"] {
            assert_eq!(ReportingBasis::from_label(label).label(), label);
        }
        assert_eq!(
            ReportingBasis::from_label("  Accrual "),
            ReportingBasis::Accrual
        );
    }
}

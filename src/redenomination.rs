use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::model::MasterRecord;

/// Upper bound on the publishing vintage a rule covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VintageBound {
    /// Vintages strictly before the given release.
    Before(i64),
    /// Vintages up to and including the given release.
    AtMost(i64),
}

impl VintageBound {
    pub fn contains(self, vintage: i64) -> bool {
        match self {
            VintageBound::Before(bound) => vintage < bound,
            VintageBound::AtMost(bound) => vintage <= bound,
        }
    }
}

impl fmt::Display for VintageBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VintageBound::Before(bound) => write!(f, "vintage < {bound}"),
            VintageBound::AtMost(bound) => write!(f, "vintage <= {bound}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedenominationRule {
    pub country: String,
    pub country_code: i64,
    pub vintage: VintageBound,
    /// Inclusive upper bound on the reference year; `None` covers every year.
    #[serde(default)]
    pub max_year: Option<i64>,
    pub factor: f64,
}

impl RedenominationRule {
    pub fn matches(&self, record: &MasterRecord) -> bool {
        record.country_code == self.country_code
            && self.vintage.contains(record.vintage)
            && self.max_year.is_none_or(|max| record.year <= max)
    }

    /// Curated redenomination events.
    pub fn defaults() -> Vec<Self> {
        vec![
            // 1 new ruble = 10,000 old rubles (2016 reform).
            Self {
                country: "Belarus".into(),
                country_code: 913,
                vintage: VintageBound::Before(2017),
                max_year: None,
                factor: 1.0 / 10_000.0,
            },
            Self {
                country: "Slovakia".into(),
                country_code: 936,
                vintage: VintageBound::AtMost(2012),
                max_year: Some(2008),
                factor: 1.0 / 30.12592,
            },
            Self {
                country: "Slovenia".into(),
                country_code: 961,
                vintage: VintageBound::AtMost(2012),
                max_year: Some(2006),
                factor: 1.0 / 239.6357537,
            },
            Self {
                country: "France".into(),
                country_code: 132,
                vintage: VintageBound::AtMost(2012),
                max_year: Some(1989),
                factor: 1.0 / 6.559527714,
            },
            Self {
                country: "Malta".into(),
                country_code: 181,
                vintage: VintageBound::AtMost(2012),
                max_year: Some(2007),
                factor: 3.03609922,
            },
            Self {
                country: "Estonia".into(),
                country_code: 939,
                vintage: VintageBound::Before(2012),
                max_year: Some(2008),
                factor: 1.0 / 15.408140379155446,
            },
        ]
    }
}

/// Rescales every record covered by a rule, at most once per record.
///
/// Returns the number of corrected records per rule, in rule order. Diff
/// columns are stale afterwards and must be recomputed.
pub fn apply_redenominations(records: &mut [MasterRecord], rules: &[RedenominationRule]) -> Vec<usize> {
    let mut applied = vec![0usize; rules.len()];
    for record in records.iter_mut() {
        if let Some((idx, rule)) = rules.iter().enumerate().find(|(_, rule)| rule.matches(record)) {
            record.value *= rule.factor;
            applied[idx] += 1;
        }
    }
    for (rule, count) in rules.iter().zip(&applied) {
        if *count > 0 {
            info!(
                "Redenominated {count} record(s) for {} ({}, {}{})",
                rule.country,
                rule.country_code,
                rule.vintage,
                rule.max_year
                    .map(|max| format!(", year <= {max}"))
                    .unwrap_or_default()
            );
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MasterRecord, ReportingBasis};

    fn record(country_code: i64, year: i64, vintage: i64, value: f64) -> MasterRecord {
        MasterRecord {
            country_code,
            country_name: None,
            year,
            vintage,
            reporting_basis: ReportingBasis::Accrual,
            value,
            sector_name: "General government".into(),
            descriptor: crate::model::NET_INCURRENCE_DESCRIPTOR.into(),
            residence_name: "total".into(),
            value_diff: None,
            value_diff_perc: None,
            abs_diff_perc: None,
        }
    }

    #[test]
    fn belarus_rule_covers_all_years_before_2017() {
        let rules = RedenominationRule::defaults();
        let mut records = vec![
            record(913, 1995, 2016, 50_000.0),
            record(913, 2015, 2017, 5.0),
        ];
        let applied = apply_redenominations(&mut records, &rules);
        assert!((records[0].value - 5.0).abs() < 1e-9);
        assert_eq!(records[1].value, 5.0);
        assert_eq!(applied[0], 1);
    }

    #[test]
    fn year_bound_is_inclusive_and_vintage_bound_varies() {
        let rules = RedenominationRule::defaults();
        let mut records = vec![
            record(936, 2008, 2012, 30.12592),
            record(936, 2009, 2012, 7.0),
            record(936, 2008, 2013, 7.0),
            record(939, 2008, 2012, 7.0),
            record(939, 2008, 2011, 15.408140379155446),
        ];
        apply_redenominations(&mut records, &rules);
        assert!((records[0].value - 1.0).abs() < 1e-12);
        assert_eq!(records[1].value, 7.0);
        assert_eq!(records[2].value, 7.0);
        assert_eq!(records[3].value, 7.0);
        assert!((records[4].value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn malta_is_scaled_up() {
        let rules = RedenominationRule::defaults();
        let mut records = vec![record(181, 2000, 2010, 1.0)];
        apply_redenominations(&mut records, &rules);
        assert!((records[0].value - 3.03609922).abs() < 1e-12);
    }

    #[test]
    fn unrelated_countries_are_untouched() {
        let rules = RedenominationRule::defaults();
        let mut records = vec![record(111, 1980, 2004, 42.0)];
        let applied = apply_redenominations(&mut records, &rules);
        assert_eq!(records[0].value, 42.0);
        assert!(applied.iter().all(|c| *c == 0));
    }
}

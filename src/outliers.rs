use std::collections::HashMap;

use log::{debug, info};

use crate::{
    diff::{self, DiffGrouping, FirstVintage},
    model::MasterRecord,
    redenomination::{RedenominationRule, apply_redenominations},
};

/// Stable sort by (country_code, year, vintage, residence_name).
pub fn sort_for_correction(records: &mut [MasterRecord]) {
    records.sort_by(|a, b| {
        (a.country_code, a.year, a.vintage)
            .cmp(&(b.country_code, b.year, b.vintage))
            .then_with(|| a.residence_name.cmp(&b.residence_name))
    });
}

/// Drops spurious leading zeros.
///
/// Within each (country_code, year, residence_name) group, in vintage order,
/// the first record is dropped when the group has at least two records, the
/// first value is exactly zero and the second is not. Input must already be
/// sorted with [`sort_for_correction`].
pub fn drop_leading_zeros(records: Vec<MasterRecord>) -> Vec<MasterRecord> {
    let dropped = leading_zero_mask(&records);
    let before = records.len();
    let kept: Vec<MasterRecord> = records
        .into_iter()
        .zip(dropped)
        .filter_map(|(record, drop)| (!drop).then_some(record))
        .collect();
    debug!("Dropped {} leading zero record(s)", before - kept.len());
    kept
}

fn leading_zero_mask(records: &[MasterRecord]) -> Vec<bool> {
    // First and second position of each group, in scan order.
    let mut heads: HashMap<(i64, i64, &str), (usize, Option<usize>)> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        heads
            .entry((record.country_code, record.year, record.residence_name.as_str()))
            .and_modify(|(_, second)| {
                if second.is_none() {
                    *second = Some(idx);
                }
            })
            .or_insert((idx, None));
    }

    let mut dropped = vec![false; records.len()];
    for (first, second) in heads.values() {
        if let Some(second) = second
            && records[*first].value == 0.0
            && records[*second].value != 0.0
        {
            dropped[*first] = true;
        }
    }
    dropped
}

/// Leading-zero strip, redenomination, then a fresh diff in correction mode.
pub fn correct(mut records: Vec<MasterRecord>, rules: &[RedenominationRule]) -> Vec<MasterRecord> {
    sort_for_correction(&mut records);
    let mut records = drop_leading_zeros(records);
    let applied = apply_redenominations(&mut records, rules);
    info!(
        "Corrected {} record(s) across {} redenomination rule(s)",
        applied.iter().sum::<usize>(),
        rules.len()
    );
    diff::difference_vintages(
        &mut records,
        DiffGrouping::CountryYearResidence,
        FirstVintage::Missing,
    );
    diff::fill_absolute_percent(&mut records);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NET_INCURRENCE_DESCRIPTOR, ReportingBasis};

    fn record(country_code: i64, vintage: i64, value: f64) -> MasterRecord {
        MasterRecord {
            country_code,
            country_name: None,
            year: 2000,
            vintage,
            reporting_basis: ReportingBasis::Accrual,
            value,
            sector_name: String::new(),
            descriptor: NET_INCURRENCE_DESCRIPTOR.into(),
            residence_name: "total".into(),
            value_diff: None,
            value_diff_perc: None,
            abs_diff_perc: None,
        }
    }

    fn values(records: &[MasterRecord]) -> Vec<f64> {
        records.iter().map(|r| r.value).collect()
    }

    #[test]
    fn leading_zero_followed_by_value_is_dropped() {
        let records = vec![record(1, 1, 0.0), record(1, 2, 5.0), record(1, 3, 6.0)];
        assert_eq!(values(&drop_leading_zeros(records)), vec![5.0, 6.0]);
    }

    #[test]
    fn double_leading_zero_is_kept() {
        let records = vec![record(1, 1, 0.0), record(1, 2, 0.0), record(1, 3, 6.0)];
        assert_eq!(values(&drop_leading_zeros(records)), vec![0.0, 0.0, 6.0]);
    }

    #[test]
    fn single_zero_is_kept() {
        let records = vec![record(1, 1, 0.0), record(2, 1, 0.0), record(2, 2, 3.0)];
        assert_eq!(values(&drop_leading_zeros(records)), vec![0.0, 3.0]);
    }

    #[test]
    fn correct_rediffs_after_rescaling() {
        let records = vec![record(913, 2016, 100_000.0), record(913, 2017, 11.0)];
        let corrected = correct(records, &RedenominationRule::defaults());
        assert!((corrected[0].value - 10.0).abs() < 1e-9);
        assert_eq!(corrected[0].value_diff, None);
        assert!((corrected[1].value_diff.unwrap() - 1.0).abs() < 1e-9);
        assert!((corrected[1].abs_diff_perc.unwrap() - 10.0).abs() < 1e-6);
    }
}

use std::{collections::HashMap, hash::Hash};

use crate::model::MasterRecord;

/// What the first vintage of a group gets in `value_diff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstVintage {
    /// Write `0.0` (merge pass).
    Zero,
    /// Leave the diff missing (correction pass).
    Missing,
}

/// Grouping used by the differencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffGrouping {
    /// (country_code, year)
    CountryYear,
    /// (country_code, year, residence_name)
    CountryYearResidence,
}

/// Stable sort by (country_code, year, vintage).
pub fn sort_by_vintage(records: &mut [MasterRecord]) {
    records.sort_by_key(|r| (r.country_code, r.year, r.vintage));
}

/// Sorts `records` and fills `value_diff` and `value_diff_perc`.
///
/// A zero previous value yields an infinite percentage for a non-zero delta
/// and a missing one for a zero delta. Infinities are kept here; see
/// [`normalize_non_finite`].
pub fn difference_vintages(records: &mut [MasterRecord], grouping: DiffGrouping, first: FirstVintage) {
    sort_by_vintage(records);
    match grouping {
        DiffGrouping::CountryYear => scan(records, first, |r| (r.country_code, r.year)),
        DiffGrouping::CountryYearResidence => scan(records, first, |r| {
            (r.country_code, r.year, r.residence_name.clone())
        }),
    }
}

fn scan<K, F>(records: &mut [MasterRecord], first: FirstVintage, key: F)
where
    K: Eq + Hash,
    F: Fn(&MasterRecord) -> K,
{
    let mut previous: HashMap<K, f64> = HashMap::new();
    for record in records.iter_mut() {
        match previous.insert(key(record), record.value) {
            Some(prior) => {
                let diff = record.value - prior;
                record.value_diff = Some(diff);
                record.value_diff_perc = percent_change(diff, prior);
            }
            None => {
                record.value_diff = match first {
                    FirstVintage::Zero => Some(0.0),
                    FirstVintage::Missing => None,
                };
                record.value_diff_perc = None;
            }
        }
    }
}

fn percent_change(diff: f64, prior: f64) -> Option<f64> {
    let perc = diff / prior * 100.0;
    if perc.is_nan() { None } else { Some(perc) }
}

/// Fills `abs_diff_perc` from `value_diff_perc`.
pub fn fill_absolute_percent(records: &mut [MasterRecord]) {
    for record in records.iter_mut() {
        record.abs_diff_perc = record.value_diff_perc.map(f64::abs);
    }
}

/// Replaces every non-finite diff column value with missing.
pub fn normalize_non_finite(records: &mut [MasterRecord]) -> usize {
    let mut replaced = 0usize;
    for record in records.iter_mut() {
        for slot in [
            &mut record.value_diff,
            &mut record.value_diff_perc,
            &mut record.abs_diff_perc,
        ] {
            if slot.is_some_and(|v| !v.is_finite()) {
                *slot = None;
                replaced += 1;
            }
        }
    }
    replaced
}

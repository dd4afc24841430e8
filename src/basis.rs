use std::collections::BTreeMap;

use log::debug;

use crate::model::{CanonicalRecord, ReportingBasis};

/// Keeps, per country, only the records of its most frequent reporting basis.
///
/// Equally frequent bases resolve to the one whose label sorts first (the
/// empty label, then `Accrual`, then `Cash Basis`). That ordering is an
/// artefact of grouping by label, not an accounting preference. Surviving
/// records keep their input order.
pub fn select_majority_basis(records: Vec<CanonicalRecord>) -> Vec<CanonicalRecord> {
    let chosen = majority_basis_by_country(&records);
    let before = records.len();
    let kept: Vec<CanonicalRecord> = records
        .into_iter()
        .filter(|r| chosen.get(&r.country_code) == Some(&r.reporting_basis))
        .collect();
    debug!(
        "Basis selection kept {} of {before} record(s) across {} country(ies)",
        kept.len(),
        chosen.len()
    );
    kept
}

/// Most frequent basis per country code.
pub fn majority_basis_by_country(records: &[CanonicalRecord]) -> BTreeMap<i64, ReportingBasis> {
    let mut counts: BTreeMap<(i64, String), (usize, &ReportingBasis)> = BTreeMap::new();
    for record in records {
        let entry = counts
            .entry((record.country_code, record.reporting_basis.label().to_string()))
            .or_insert((0, &record.reporting_basis));
        entry.0 += 1;
    }

    let mut chosen: BTreeMap<i64, (usize, ReportingBasis)> = BTreeMap::new();
    // Keys iterate in (country, label) order, so a strictly-greater test keeps the first label on ties.
    for ((country_code, _), (count, basis)) in counts {
        match chosen.get(&country_code) {
            Some((best, _)) if *best >= count => {}
            _ => {
                chosen.insert(country_code, (count, basis.clone()));
            }
        }
    }
    chosen
        .into_iter()
        .map(|(country, (_, basis))| (country, basis))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(country_code: i64, vintage: i64, basis: ReportingBasis) -> CanonicalRecord {
        CanonicalRecord {
            country_code,
            country_name: None,
            year: 2000,
            vintage,
            value: 1.0,
            reporting_basis: basis,
            sector_name: String::new(),
            legacy_name: None,
        }
    }

    #[test]
    fn keeps_only_majority_basis_per_country() {
        let records = vec![
            record(1, 2004, ReportingBasis::CashBasis),
            record(1, 2005, ReportingBasis::Accrual),
            record(1, 2006, ReportingBasis::Accrual),
            record(2, 2004, ReportingBasis::CashBasis),
        ];
        let kept = select_majority_basis(records);
        assert_eq!(kept.len(), 3);
        assert!(
            kept.iter()
                .filter(|r| r.country_code == 1)
                .all(|r| r.reporting_basis == ReportingBasis::Accrual)
        );
        assert_eq!(kept[2].country_code, 2);
    }

    #[test]
    fn ties_go_to_first_label_in_sort_order() {
        let records = vec![
            record(7, 2004, ReportingBasis::CashBasis),
            record(7, 2005, ReportingBasis::Accrual),
        ];
        let chosen = majority_basis_by_country(&records);
        assert_eq!(chosen[&7], ReportingBasis::Accrual);

        let records = vec![
            record(8, 2004, ReportingBasis::Accrual),
            record(8, 2005, ReportingBasis::Unspecified),
        ];
        let chosen = majority_basis_by_country(&records);
        assert_eq!(chosen[&8], ReportingBasis::Unspecified);
    }
}

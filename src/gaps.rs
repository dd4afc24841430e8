use crate::model::{CanonicalRecord, DebtType, MasterRecord};

/// Fills missing country names and lifts records into the master schema.
///
/// Records are stably sorted by country code. Within each country the name is
/// forward-filled, then back-filled; a name still missing falls back to the
/// legacy extract's spelling. Empty names count as missing.
pub fn fill_country_names(mut records: Vec<CanonicalRecord>, debt_type: DebtType) -> Vec<MasterRecord> {
    records.sort_by_key(|r| r.country_code);
    for record in records.iter_mut() {
        if record.country_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            record.country_name = None;
        }
    }

    let mut start = 0;
    while start < records.len() {
        let code = records[start].country_code;
        let end = records[start..]
            .iter()
            .position(|r| r.country_code != code)
            .map_or(records.len(), |offset| start + offset);
        fill_group(&mut records[start..end]);
        start = end;
    }

    records
        .into_iter()
        .map(|mut record| {
            if record.country_name.is_none() {
                record.country_name = record.legacy_name.take();
            }
            MasterRecord::from_canonical(record, debt_type)
        })
        .collect()
}

fn fill_group(group: &mut [CanonicalRecord]) {
    let mut last: Option<String> = None;
    for record in group.iter_mut() {
        match &record.country_name {
            Some(name) => last = Some(name.clone()),
            None => record.country_name = last.clone(),
        }
    }
    let mut next: Option<String> = None;
    for record in group.iter_mut().rev() {
        match &record.country_name {
            Some(name) => next = Some(name.clone()),
            None => record.country_name = next.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NET_INCURRENCE_DESCRIPTOR, ReportingBasis};

    fn record(country_code: i64, name: Option<&str>, legacy: Option<&str>) -> CanonicalRecord {
        CanonicalRecord {
            country_code,
            country_name: name.map(str::to_string),
            year: 2000,
            vintage: 2010,
            value: 1.0,
            reporting_basis: ReportingBasis::Unspecified,
            sector_name: String::new(),
            legacy_name: legacy.map(str::to_string),
        }
    }

    // The legacy fallback is per record, after the group fill.
    #[test]
    fn fills_forward_then_backward_within_country() {
        let records = vec![
            record(5, None, Some("FRANCE")),
            record(5, Some("France"), None),
            record(5, None, None),
            record(9, None, Some("Malta")),
            record(9, Some(""), None),
        ];
        let filled = fill_country_names(records, DebtType::Total);
        let names: Vec<_> = filled.iter().map(|r| r.country_name.clone()).collect();
        assert_eq!(
            names,
            vec![
                Some("France".to_string()),
                Some("France".to_string()),
                Some("France".to_string()),
                Some("Malta".to_string()),
                None,
            ]
        );
    }

    #[test]
    fn adds_descriptor_and_residence_columns() {
        let filled = fill_country_names(vec![record(1, Some("A"), None)], DebtType::Foreign);
        assert_eq!(filled[0].descriptor, NET_INCURRENCE_DESCRIPTOR);
        assert_eq!(filled[0].residence_name, "foreign");
    }

    #[test]
    fn sort_is_stable_by_country_code() {
        let mut first = record(3, Some("C"), None);
        first.vintage = 2004;
        let mut second = record(3, Some("C"), None);
        second.vintage = 2005;
        let filled = fill_country_names(
            vec![first, record(1, Some("A"), None), second],
            DebtType::Total,
        );
        assert_eq!(filled[0].country_code, 1);
        assert_eq!(filled[1].vintage, 2004);
        assert_eq!(filled[2].vintage, 2005);
    }
}

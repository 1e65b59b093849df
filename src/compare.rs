//! Period-over-period comparison of completed quantities.

use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::aggregate::{aggregate_by_date, merge_by_date, sum_by_group, DatedSums, GroupKey, Table, DIFERENCIA};
use crate::catalog::Snapshot;
use crate::errors::{CoreError, Insufficiency};
use crate::process::normalize::NormalizedRecord;

/// One loaded snapshot and its normalized records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRecords {
    pub snapshot: Snapshot,
    pub records: Vec<NormalizedRecord>,
}

/// Per-group sums over rows whose status flag is set.
pub fn completed_sums(records: &[NormalizedRecord]) -> BTreeMap<GroupKey, f64> {
    sum_by_group(records, |r| r.status_flag)
}

/// Keep only rows tagged `tag`, but only when the snapshot carries period
/// tags at all; untagged snapshots are used whole.
pub fn restrict_to_period(records: &[NormalizedRecord], tag: Option<&str>) -> Vec<NormalizedRecord> {
    match tag {
        Some(tag) if records.iter().any(|r| r.period_tag.is_some()) => records
            .iter()
            .filter(|r| r.period_tag.as_deref() == Some(tag))
            .cloned()
            .collect(),
        _ => records.to_vec(),
    }
}

/// `Dif_dd/mm_dd/mm`, or `Dif_dd/mm/yyyy_dd/mm/yyyy` once the series spans
/// more than one calendar year (day and month alone would collide).
fn delta_label(earlier: &DatedSums, later: &DatedSums, with_year: bool) -> String {
    let fmt = if with_year { "%d/%m/%Y" } else { "%d/%m" };
    format!("Dif_{}_{}", earlier.date.format(fmt), later.date.format(fmt))
}

fn spans_years(dates: &[DatedSums]) -> bool {
    match (dates.first(), dates.last()) {
        (Some(first), Some(last)) => first.date.year() != last.date.year(),
        _ => false,
    }
}

/// Completed quantity per snapshot date, plus one delta column per pair of
/// consecutive dates.
pub fn compare_series(snapshots: &[SnapshotRecords]) -> Result<Table, CoreError> {
    if snapshots.is_empty() {
        return Err(CoreError::EmptyResult(Insufficiency::NoSnapshots));
    }
    let dated: Vec<DatedSums> = snapshots
        .iter()
        .map(|s| DatedSums {
            date: s.snapshot.date,
            sums: completed_sums(&s.records),
        })
        .collect();

    let mut table = aggregate_by_date(&dated);
    if table.is_empty() {
        return Err(CoreError::EmptyResult(Insufficiency::NoRecords));
    }

    let dates = merge_by_date(&dated);
    let with_year = spans_years(&dates);
    for i in 1..dates.len() {
        table.push_measure(delta_label(&dates[i - 1], &dates[i], with_year), |v| v[i] - v[i - 1]);
    }
    debug!(dates = dates.len(), rows = table.rows.len(), "series compared");
    Ok(table)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TwoPeriodComparison {
    pub earlier: Snapshot,
    pub later: Snapshot,
    /// Earlier column, later column, then `Diferencia = later - earlier`.
    pub table: Table,
    /// Sum of positive differences.
    pub gains: f64,
    /// Sum of negative differences (zero or below).
    pub losses: f64,
}

/// Compare two snapshots, optionally restricted to one sub-period.
///
/// Argument order does not matter; the earlier date becomes the first
/// column. Two snapshots with the same date cannot be compared.
pub fn compare_two(
    a: &SnapshotRecords,
    b: &SnapshotRecords,
    period: Option<&str>,
) -> Result<TwoPeriodComparison, CoreError> {
    let (earlier, later) = if a.snapshot.date <= b.snapshot.date { (a, b) } else { (b, a) };
    if earlier.snapshot.date == later.snapshot.date {
        return Err(CoreError::EmptyResult(Insufficiency::TooFewSnapshots {
            required: 2,
            available: 1,
        }));
    }

    let dated: Vec<DatedSums> = [earlier, later]
        .iter()
        .map(|s| DatedSums {
            date: s.snapshot.date,
            sums: completed_sums(&restrict_to_period(&s.records, period)),
        })
        .collect();

    let mut table = aggregate_by_date(&dated);
    if table.is_empty() {
        return Err(CoreError::EmptyResult(Insufficiency::NoRecords));
    }
    table.push_measure(DIFERENCIA, |v| v[1] - v[0]);

    let mut gains = 0.0;
    let mut losses = 0.0;
    for row in &table.rows {
        let diff = row.values[2];
        if diff > 0.0 {
            gains += diff;
        } else if diff < 0.0 {
            losses += diff;
        }
    }
    debug!(
        earlier = %earlier.snapshot.name,
        later = %later.snapshot.name,
        gains,
        losses,
        "two snapshots compared"
    );

    Ok(TwoPeriodComparison {
        earlier: earlier.snapshot.clone(),
        later: later.snapshot.clone(),
        table,
        gains,
        losses,
    })
}

/// Compare the two most recent of `snapshots` (ascending by date).
pub fn compare_latest_two(
    snapshots: &[SnapshotRecords],
    period: Option<&str>,
) -> Result<TwoPeriodComparison, CoreError> {
    match snapshots {
        [.., a, b] => compare_two(a, b, period),
        _ => Err(CoreError::EmptyResult(Insufficiency::TooFewSnapshots {
            required: 2,
            available: snapshots.len(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::SnapshotId;
    use chrono::NaiveDate;

    fn rec(level: &str, element: &str, qty: f64, done: bool, period: Option<&str>) -> NormalizedRecord {
        NormalizedRecord {
            level: level.into(),
            element: element.into(),
            quantity: Some(qty),
            status_flag: done,
            status_category: None,
            period_tag: period.map(String::from),
            executed_on: None,
        }
    }

    fn snap(day: u32, records: Vec<NormalizedRecord>) -> SnapshotRecords {
        let name = format!("{:02}-01-2024_AO_GENERAL.txt", day);
        SnapshotRecords {
            snapshot: Snapshot {
                id: SnapshotId::new(format!("dir/{name}")),
                name,
                date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            },
            records,
        }
    }

    #[test]
    fn missing_group_is_zero_filled_with_negative_delta() {
        let a = snap(5, vec![rec("L1", "E1", 5.0, true, None)]);
        let b = snap(12, vec![rec("L2", "E2", 1.0, true, None)]);

        let table = compare_series(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(table.measures, vec!["05-01-2024", "12-01-2024", "Dif_05/01_12/01"]);
        assert_eq!(table.value("L1", "E1", "12-01-2024"), Some(0.0));
        assert_eq!(table.value("L1", "E1", "Dif_05/01_12/01"), Some(-5.0));
        assert_eq!(table.value("L2", "E2", "Dif_05/01_12/01"), Some(1.0));

        let two = compare_two(&a, &b, None).unwrap();
        assert_eq!(two.table.value("L1", "E1", DIFERENCIA), Some(-5.0));
        assert_eq!(two.gains, 1.0);
        assert_eq!(two.losses, -5.0);
    }

    #[test]
    fn series_only_counts_completed_rows() {
        let a = snap(
            1,
            vec![rec("N1", "Muro", 2.0, true, None), rec("N1", "Muro", 7.0, false, None)],
        );
        let table = compare_series(&[a]).unwrap();
        assert_eq!(table.measures, vec!["01-01-2024"], "one date gives no deltas");
        assert_eq!(table.value("N1", "Muro", "01-01-2024"), Some(2.0));
    }

    #[test]
    fn series_of_three_has_two_deltas() {
        let snaps = vec![
            snap(1, vec![rec("N1", "Muro", 1.0, true, None)]),
            snap(8, vec![rec("N1", "Muro", 3.0, true, None)]),
            snap(15, vec![rec("N1", "Muro", 4.5, true, None)]),
        ];
        let table = compare_series(&snaps).unwrap();
        assert_eq!(table.measures.len(), 5);
        assert_eq!(table.value("N1", "Muro", "Dif_01/01_08/01"), Some(2.0));
        assert_eq!(table.value("N1", "Muro", "Dif_08/01_15/01"), Some(1.5));
    }

    #[test]
    fn empty_inputs_are_insufficient() {
        assert!(matches!(
            compare_series(&[]),
            Err(CoreError::EmptyResult(Insufficiency::NoSnapshots))
        ));
        let nothing_done = snap(1, vec![rec("N1", "Muro", 1.0, false, None)]);
        assert!(matches!(
            compare_series(&[nothing_done]),
            Err(CoreError::EmptyResult(Insufficiency::NoRecords))
        ));
    }

    #[test]
    fn two_snapshot_comparison_needs_two_dates() {
        let one = vec![snap(1, vec![rec("N1", "Muro", 1.0, true, None)])];
        match compare_latest_two(&one, None) {
            Err(CoreError::EmptyResult(Insufficiency::TooFewSnapshots { required, available })) => {
                assert_eq!((required, available), (2, 1));
            }
            other => panic!("expected insufficiency, got {other:?}"),
        }

        let same_day = snap(1, vec![rec("N1", "Muro", 2.0, true, None)]);
        assert!(compare_two(&one[0], &same_day, None)
            .unwrap_err()
            .is_empty_result());
    }

    #[test]
    fn latest_two_picks_the_tail_and_orders_columns() {
        let snaps = vec![
            snap(1, vec![rec("N1", "Muro", 100.0, true, None)]),
            snap(8, vec![rec("N1", "Muro", 3.0, true, None)]),
            snap(15, vec![rec("N1", "Muro", 4.0, true, None)]),
        ];
        let cmp = compare_latest_two(&snaps, None).unwrap();
        assert_eq!(cmp.earlier.date.to_string(), "2024-01-08");
        assert_eq!(cmp.table.measures, vec!["08-01-2024", "15-01-2024", DIFERENCIA]);

        let swapped = compare_two(&snaps[2], &snaps[1], None).unwrap();
        assert_eq!(swapped, cmp);
    }

    #[test]
    fn period_restriction_only_applies_to_tagged_snapshots() {
        let tagged = snap(
            1,
            vec![
                rec("N1", "Muro", 2.0, true, Some("Semana 01")),
                rec("N1", "Muro", 50.0, true, Some("Semana 02")),
            ],
        );
        let untagged = snap(8, vec![rec("N1", "Muro", 10.0, true, None)]);

        let cmp = compare_two(&tagged, &untagged, Some("Semana 01")).unwrap();
        assert_eq!(cmp.table.value("N1", "Muro", "01-01-2024"), Some(2.0));
        assert_eq!(cmp.table.value("N1", "Muro", "08-01-2024"), Some(10.0));
        assert_eq!(cmp.gains, 8.0);
        assert_eq!(cmp.losses, 0.0);

        let all = compare_two(&tagged, &untagged, None).unwrap();
        assert_eq!(all.table.value("N1", "Muro", "01-01-2024"), Some(52.0));
    }

    #[test]
    fn blank_period_column_means_no_restriction() {
        // Column present but empty on every row: nothing is tagged.
        let a = snap(1, vec![rec("N1", "Muro", 2.0, true, None), rec("N1", "Losa", 3.0, true, None)]);
        let b = snap(8, vec![rec("N1", "Muro", 6.0, true, None)]);

        assert_eq!(restrict_to_period(&a.records, Some("Semana 01")), a.records);
        let cmp = compare_two(&a, &b, Some("Semana 01")).unwrap();
        assert_eq!(cmp.table.value("N1", "Losa", "01-01-2024"), Some(3.0));
        assert_eq!(cmp.table.value("N1", "Muro", DIFERENCIA), Some(4.0));
    }

    #[test]
    fn deltas_across_a_year_boundary_keep_distinct_labels() {
        let dated = |y: i32, d: u32, qty: f64| {
            let mut s = snap(d, vec![rec("N1", "Muro", qty, true, None)]);
            s.snapshot.date = NaiveDate::from_ymd_opt(y, 1, d).unwrap();
            s
        };
        let snaps = vec![
            dated(2024, 5, 1.0),
            dated(2024, 12, 2.0),
            dated(2025, 5, 10.0),
            dated(2025, 12, 30.0),
        ];
        let table = compare_series(&snaps).unwrap();

        let deltas: Vec<&String> = table.measures.iter().filter(|m| m.starts_with("Dif_")).collect();
        assert_eq!(deltas.len(), 3);
        let mut unique = deltas.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3, "labels collide: {deltas:?}");

        assert_eq!(table.value("N1", "Muro", "Dif_05/01/2024_12/01/2024"), Some(1.0));
        assert_eq!(table.value("N1", "Muro", "Dif_12/01/2024_05/01/2025"), Some(8.0));
        assert_eq!(table.value("N1", "Muro", "Dif_05/01/2025_12/01/2025"), Some(20.0));
    }
}

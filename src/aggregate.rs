//! Group-by-and-pivot over normalized records.
//!
//! Values stay unrounded here; rounding happens in [`crate::present`].

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::process::normalize::NormalizedRecord;

pub const LEVEL: &str = "Nivel";
pub const ELEMENT: &str = "Elementos";
pub const SI: &str = "Si";
pub const NO: &str = "No";
pub const TOTAL: &str = "Total";
pub const SI_PCT: &str = "Si %";
pub const NO_PCT: &str = "No %";
pub const AVANCE_PCT: &str = "% Avance";
pub const DIFERENCIA: &str = "Diferencia";

/// Label of a date column.
pub const DATE_LABEL_FORMAT: &str = "%d-%m-%Y";

pub type GroupKey = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregateMode {
    /// `Si` / `No` sums split on the status flag, plus total and shares.
    BooleanSplit,
    /// One column per status category label, plus total and share of the
    /// grand total.
    StatusCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub level: String,
    pub element: String,
    /// One value per entry of [`Table::measures`].
    pub values: Vec<f64>,
}

/// Rows keyed by (level, element), sorted by key, with named measure columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub measures: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, measure: &str) -> Option<usize> {
        self.measures.iter().position(|m| m == measure)
    }

    pub fn row(&self, level: &str, element: &str) -> Option<&TableRow> {
        self.rows
            .iter()
            .find(|r| r.level == level && r.element == element)
    }

    pub fn value(&self, level: &str, element: &str, measure: &str) -> Option<f64> {
        let idx = self.column_index(measure)?;
        self.row(level, element).map(|r| r.values[idx])
    }

    /// Append a column computed from each row's existing values.
    pub fn push_measure<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[f64]) -> f64,
    {
        for row in &mut self.rows {
            let v = f(&row.values);
            row.values.push(v);
        }
        self.measures.push(name.into());
    }

    /// Sum of one column over all rows.
    pub fn column_sum(&self, measure: &str) -> f64 {
        match self.column_index(measure) {
            Some(idx) => self.rows.iter().map(|r| r.values[idx]).sum(),
            None => 0.0,
        }
    }

    fn from_grid(measures: Vec<String>, grid: BTreeMap<GroupKey, Vec<f64>>) -> Self {
        let rows = grid
            .into_iter()
            .map(|((level, element), values)| TableRow {
                level,
                element,
                values,
            })
            .collect();
        Self { measures, rows }
    }
}

fn share(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        part / total * 100.0
    }
}

/// Per-(level, element) quantity sums over the records `keep` accepts.
pub fn sum_by_group<F>(records: &[NormalizedRecord], keep: F) -> BTreeMap<GroupKey, f64>
where
    F: Fn(&NormalizedRecord) -> bool,
{
    let mut sums = BTreeMap::new();
    for r in records.iter().filter(|r| keep(r)) {
        *sums
            .entry((r.level.clone(), r.element.clone()))
            .or_insert(0.0) += r.amount();
    }
    sums
}

pub fn aggregate(records: &[NormalizedRecord], mode: AggregateMode) -> Table {
    let table = match mode {
        AggregateMode::BooleanSplit => boolean_split(records),
        AggregateMode::StatusCategory => status_category(records),
    };
    debug!(?mode, records = records.len(), rows = table.rows.len(), "aggregated");
    table
}

fn boolean_split(records: &[NormalizedRecord]) -> Table {
    let mut grid: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for r in records {
        let cell = grid
            .entry((r.level.clone(), r.element.clone()))
            .or_insert_with(|| vec![0.0, 0.0]);
        if r.status_flag {
            cell[0] += r.amount();
        } else {
            cell[1] += r.amount();
        }
    }

    let mut table = Table::from_grid(vec![SI.into(), NO.into()], grid);
    table.push_measure(TOTAL, |v| v[0] + v[1]);
    table.push_measure(SI_PCT, |v| share(v[0], v[2]));
    table.push_measure(NO_PCT, |v| share(v[1], v[2]));
    table
}

fn status_category(records: &[NormalizedRecord]) -> Table {
    let labels: Vec<String> = records
        .iter()
        .filter_map(|r| r.status_category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut grid: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for r in records {
        let Some(category) = &r.status_category else {
            continue;
        };
        // labels is sorted and holds every category seen above
        let Ok(idx) = labels.binary_search(category) else {
            continue;
        };
        grid.entry((r.level.clone(), r.element.clone()))
            .or_insert_with(|| vec![0.0; labels.len()])[idx] += r.amount();
    }

    let n = labels.len();
    let mut table = Table::from_grid(labels, grid);
    table.push_measure(TOTAL, |v| v[..n].iter().sum());
    let grand_total = table.column_sum(TOTAL);
    table.push_measure(AVANCE_PCT, |v| share(v[n], grand_total));
    table
}

/// Per-group sums of one snapshot, tagged with the snapshot date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatedSums {
    pub date: NaiveDate,
    pub sums: BTreeMap<GroupKey, f64>,
}

/// Ascending by date, with entries that share a date summed into one.
pub fn merge_by_date(series: &[DatedSums]) -> Vec<DatedSums> {
    let mut merged: BTreeMap<NaiveDate, BTreeMap<GroupKey, f64>> = BTreeMap::new();
    for item in series {
        let slot = merged.entry(item.date).or_default();
        for (key, v) in &item.sums {
            *slot.entry(key.clone()).or_insert(0.0) += v;
        }
    }
    merged
        .into_iter()
        .map(|(date, sums)| DatedSums { date, sums })
        .collect()
}

/// One column per distinct date, ascending; groups missing on a date are 0.
pub fn aggregate_by_date(series: &[DatedSums]) -> Table {
    let merged = merge_by_date(series);
    let measures = merged
        .iter()
        .map(|d| d.date.format(DATE_LABEL_FORMAT).to_string())
        .collect();

    let mut grid: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for (idx, dated) in merged.iter().enumerate() {
        for (key, v) in &dated.sums {
            grid.entry(key.clone())
                .or_insert_with(|| vec![0.0; merged.len()])[idx] += v;
        }
    }
    Table::from_grid(measures, grid)
}

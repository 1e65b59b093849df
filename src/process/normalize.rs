//! Raw rows → canonical records.
//!
//! Every coercion here is total: a bad number becomes `None`, an odd status
//! spelling becomes `false`, and a row without level or element is dropped.
//! The only failure is structural (a required column is missing), and that is
//! decided once per snapshot in [`normalize_table`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::date_parser::parse_execution_date;
use super::utils::{non_blank, parse_decimal, TruthySet};
use super::{RawRow, RawTable};
use crate::config::ColumnNames;
use crate::errors::CoreError;

/// The three progress reports built from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    /// Hormigones: poured concrete volume.
    Concrete,
    /// Moldajes: formwork area.
    Formwork,
    /// Enfierraduras: reinforcement quantity.
    Rebar,
}

impl WorkType {
    pub const ALL: [WorkType; 3] = [WorkType::Concrete, WorkType::Formwork, WorkType::Rebar];

    pub fn quantity_column<'a>(&self, names: &'a ColumnNames) -> &'a str {
        match self {
            WorkType::Concrete => &names.concrete,
            WorkType::Formwork => &names.formwork,
            WorkType::Rebar => &names.rebar,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            WorkType::Concrete => "Avance de Hormigones",
            WorkType::Formwork => "Avance de Moldajes",
            WorkType::Rebar => "Avance de Enfierraduras",
        }
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkType::Concrete => "concrete",
            WorkType::Formwork => "formwork",
            WorkType::Rebar => "rebar",
        };
        f.write_str(s)
    }
}

/// Row admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Admission {
    /// Keep every row with a level and an element.
    #[default]
    Lenient,
    /// Additionally drop rows whose quantity is missing or not positive.
    Strict,
}

/// Which columns to read, and which of them a snapshot must have.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub level: String,
    pub element: String,
    pub quantity: String,
    pub status: String,
    pub category: String,
    pub period: String,
    pub executed_on: String,
    pub truthy: TruthySet,
    require_status: bool,
    require_category: bool,
}

impl ColumnSpec {
    pub fn new(names: &ColumnNames, truthy: &TruthySet, work: WorkType) -> Self {
        Self {
            level: names.level.clone(),
            element: names.element.clone(),
            quantity: work.quantity_column(names).to_string(),
            status: names.status.clone(),
            category: names.category.clone(),
            period: names.period.clone(),
            executed_on: names.executed_on.clone(),
            truthy: truthy.clone(),
            require_status: false,
            require_category: false,
        }
    }

    /// Snapshots lacking the status column are rejected.
    pub fn requiring_status(mut self) -> Self {
        self.require_status = true;
        self
    }

    /// Snapshots lacking the status-category column are rejected.
    pub fn requiring_category(mut self) -> Self {
        self.require_category = true;
        self
    }

    pub fn with_quantity(mut self, column: impl Into<String>) -> Self {
        self.quantity = column.into();
        self
    }

    pub fn required_columns(&self) -> Vec<String> {
        let mut cols = vec![self.level.clone(), self.element.clone(), self.quantity.clone()];
        if self.require_status {
            cols.push(self.status.clone());
        }
        if self.require_category {
            cols.push(self.category.clone());
        }
        cols
    }
}

impl Default for ColumnSpec {
    fn default() -> Self {
        ColumnSpec::new(&ColumnNames::default(), &TruthySet::default(), WorkType::Concrete)
    }
}

/// The unit every aggregation consumes. `level` and `element` are never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub level: String,
    pub element: String,
    pub quantity: Option<f64>,
    pub status_flag: bool,
    pub status_category: Option<String>,
    pub period_tag: Option<String>,
    pub executed_on: Option<NaiveDate>,
}

impl NormalizedRecord {
    /// Quantity for summation: missing counts as zero.
    pub fn amount(&self) -> f64 {
        self.quantity.unwrap_or(0.0)
    }

    pub fn has_valid_quantity(&self) -> bool {
        matches!(self.quantity, Some(q) if q > 0.0)
    }
}

fn normalize_row(row: &RawRow, spec: &ColumnSpec, admission: Admission) -> Option<NormalizedRecord> {
    let level = row.get(&spec.level).and_then(non_blank)?;
    let element = row.get(&spec.element).and_then(non_blank)?;
    let quantity = row.get(&spec.quantity).and_then(parse_decimal);

    let record = NormalizedRecord {
        level,
        element,
        quantity,
        status_flag: spec.truthy.classify(row.get(&spec.status)),
        status_category: row.get(&spec.category).and_then(non_blank),
        period_tag: row.get(&spec.period).and_then(non_blank),
        executed_on: row.get(&spec.executed_on).and_then(parse_execution_date),
    };

    if admission == Admission::Strict && !record.has_valid_quantity() {
        return None;
    }
    Some(record)
}

/// Normalize rows without any structural check. Rows that fail admission are
/// dropped silently.
pub fn normalize_rows(rows: &[RawRow], spec: &ColumnSpec, admission: Admission) -> Vec<NormalizedRecord> {
    let records: Vec<NormalizedRecord> = rows
        .iter()
        .filter_map(|row| normalize_row(row, spec, admission))
        .collect();
    if records.len() < rows.len() {
        debug!(
            kept = records.len(),
            dropped = rows.len() - records.len(),
            "rows dropped during normalization"
        );
    }
    records
}

/// Normalize a whole snapshot, rejecting it if a required column is absent.
pub fn normalize_table(
    snapshot: &str,
    table: &RawTable,
    spec: &ColumnSpec,
    admission: Admission,
) -> Result<Vec<NormalizedRecord>, CoreError> {
    let expected = spec.required_columns();
    let missing: Vec<String> = expected
        .iter()
        .filter(|c| !table.has_column(c))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::StructuralMismatch {
            snapshot: snapshot.to_string(),
            expected,
            found: table.headers.clone(),
            missing,
        });
    }
    Ok(normalize_rows(&table.rows, spec, admission))
}

/// Render records back into raw rows under `spec`'s column names.
///
/// Normalizing the output again reproduces `records` exactly: quantities are
/// written with `.` decimals in their shortest round-trip form and flags with
/// the canonical truthy spelling.
pub fn to_raw_rows(records: &[NormalizedRecord], spec: &ColumnSpec) -> Vec<RawRow> {
    records
        .iter()
        .map(|r| {
            RawRow::from_pairs([
                (spec.level.as_str(), r.level.clone()),
                (spec.element.as_str(), r.element.clone()),
                (
                    spec.quantity.as_str(),
                    r.quantity.map(|q| q.to_string()).unwrap_or_default(),
                ),
                (
                    spec.status.as_str(),
                    if r.status_flag {
                        spec.truthy.canonical().to_string()
                    } else {
                        "no".to_string()
                    },
                ),
                (spec.category.as_str(), r.status_category.clone().unwrap_or_default()),
                (spec.period.as_str(), r.period_tag.clone().unwrap_or_default()),
                (
                    spec.executed_on.as_str(),
                    r.executed_on
                        .map(|d| d.format("%d-%m-%Y").to_string())
                        .unwrap_or_default(),
                ),
            ])
        })
        .collect()
}

/// Explicit caller-chosen filters. Nothing here is applied implicitly by the
/// aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub level: Option<String>,
    pub element: Option<String>,
    /// Keep only rows whose status flag is true.
    pub completed_only: bool,
    pub period_tag: Option<String>,
}

impl RecordFilter {
    pub fn completed() -> Self {
        Self {
            completed_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        if self.completed_only && !record.status_flag {
            return false;
        }
        if let Some(level) = &self.level {
            if record.level != *level {
                return false;
            }
        }
        if let Some(element) = &self.element {
            if record.element != *element {
                return false;
            }
        }
        if let Some(tag) = &self.period_tag {
            if record.period_tag.as_deref() != Some(tag.as_str()) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, records: &[NormalizedRecord]) -> Vec<NormalizedRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

//! The presentation boundary: rounding, column metadata, and output formats.

use anyhow::Result;
use arrow::{
    array::{ArrayRef, Float64Array, StringArray},
    datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use serde::{ser::SerializeMap, ser::SerializeStruct, Serialize, Serializer};
use std::{fmt::Write as _, sync::Arc};

use crate::aggregate::{Table, ELEMENT, LEVEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Numeric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub label: String,
    pub kind: ColumnKind,
    /// Grouping columns are hidden from the grid body.
    pub hidden: bool,
    pub row_group: bool,
}

impl ColumnMeta {
    fn group(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            kind: ColumnKind::Text,
            hidden: true,
            row_group: true,
        }
    }

    fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            kind: ColumnKind::Numeric,
            hidden: false,
            row_group: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Text(_) => None,
        }
    }

    fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(v) => format!("{:.2}", v),
        }
    }
}

/// A finished table: `Nivel`, `Elementos`, then the measure columns, with
/// every number rounded to 2 decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentedTable {
    pub title: String,
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Cell>>,
}

pub fn round2(v: f64) -> f64 {
    let r = (v * 100.0).round() / 100.0;
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

pub fn present(title: impl Into<String>, table: &Table) -> PresentedTable {
    let mut columns = vec![ColumnMeta::group(LEVEL), ColumnMeta::group(ELEMENT)];
    columns.extend(table.measures.iter().map(|m| ColumnMeta::numeric(m)));

    let rows = table
        .rows
        .iter()
        .map(|r| {
            let mut cells = Vec::with_capacity(columns.len());
            cells.push(Cell::Text(r.level.clone()));
            cells.push(Cell::Text(r.element.clone()));
            cells.extend(r.values.iter().map(|v| Cell::Number(round2(*v))));
            cells
        })
        .collect();

    PresentedTable {
        title: title.into(),
        columns,
        rows,
    }
}

impl PresentedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Aligned plain-text rendering: title, header, one line per row.
    pub fn render_text(&self) -> String {
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| r.iter().map(Cell::display).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                body.iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(c.label.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title);
        let line = |cells: Vec<&str>, out: &mut String| {
            let parts: Vec<String> = cells
                .iter()
                .zip(&self.columns)
                .zip(&widths)
                .map(|((s, col), w)| match col.kind {
                    ColumnKind::Numeric => format!("{:>w$}", s, w = *w),
                    ColumnKind::Text => format!("{:<w$}", s, w = *w),
                })
                .collect();
            let _ = writeln!(out, "{}", parts.join("  ").trim_end());
        };
        line(self.columns.iter().map(|c| c.label.as_str()).collect(), &mut out);
        for row in &body {
            line(row.iter().map(String::as_str).collect(), &mut out);
        }
        out
    }

    /// Arrow batch with one Utf8 column per text column and one Float64
    /// column per measure.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| {
                let dt = match c.kind {
                    ColumnKind::Text => ArrowDataType::Utf8,
                    ColumnKind::Numeric => ArrowDataType::Float64,
                };
                Field::new(&c.name, dt, false)
            })
            .collect();

        let arrays: Vec<ArrayRef> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| -> ArrayRef {
                match c.kind {
                    ColumnKind::Text => Arc::new(StringArray::from(
                        self.rows.iter().map(|r| r[i].display()).collect::<Vec<_>>(),
                    )),
                    ColumnKind::Numeric => Arc::new(Float64Array::from(
                        self.rows
                            .iter()
                            .map(|r| r[i].as_number().unwrap_or(0.0))
                            .collect::<Vec<_>>(),
                    )),
                }
            })
            .collect();

        Ok(RecordBatch::try_new(Arc::new(ArrowSchema::new(fields)), arrays)?)
    }
}

/// One row as a JSON object, keys in column order.
struct RowObject<'a> {
    columns: &'a [ColumnMeta],
    cells: &'a [Cell],
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (col, cell) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(&col.name, cell)?;
        }
        map.end()
    }
}

impl Serialize for PresentedTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<RowObject<'_>> = self
            .rows
            .iter()
            .map(|cells| RowObject {
                columns: &self.columns,
                cells,
            })
            .collect();
        let mut s = serializer.serialize_struct("PresentedTable", 3)?;
        s.serialize_field("title", &self.title)?;
        s.serialize_field("columns", &self.columns)?;
        s.serialize_field("rows", &rows)?;
        s.end()
    }
}

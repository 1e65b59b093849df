//! Progress aggregation for construction reports.
//!
//! Raw `*_AO_GENERAL.txt` snapshots (tab separated, one title line, one header
//! line) are normalized into [`NormalizedRecord`]s, grouped by level and
//! element, and compared across dated snapshots.

pub mod aggregate;
pub mod catalog;
pub mod compare;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod pipeline;
pub mod present;
pub mod process;

pub use aggregate::{aggregate, aggregate_by_date, AggregateMode, DatedSums, Table, TableRow};
pub use catalog::{Catalog, CatalogStats, Snapshot};
pub use compare::{compare_latest_two, compare_series, compare_two, SnapshotRecords, TwoPeriodComparison};
pub use config::{ColumnNames, Config, SourceKind};
pub use errors::{CoreError, Insufficiency};
pub use fetch::{AnySource, CachedSource, FsSource, HttpSource, SnapshotEntry, SnapshotId, SnapshotSource};
pub use pipeline::{LoadReport, Pipeline, ViewOutcome};
pub use present::{present, Cell, ColumnKind, ColumnMeta, PresentedTable};
pub use process::normalize::{
    normalize_rows, normalize_table, to_raw_rows, Admission, ColumnSpec, NormalizedRecord,
    RecordFilter, WorkType,
};
pub use process::utils::TruthySet;
pub use process::{load_report, RawRow, RawTable};

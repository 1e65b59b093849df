// src/pipeline.rs
//! Catalog → fetch → parse → normalize → aggregate, with per-snapshot
//! failures collected instead of raised.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::{aggregate, AggregateMode, Table};
use crate::catalog::{Catalog, CatalogStats, Snapshot};
use crate::compare::{compare_latest_two, compare_series, SnapshotRecords, TwoPeriodComparison};
use crate::config::{ColumnNames, Config};
use crate::errors::{CoreError, Insufficiency};
use crate::fetch::SnapshotSource;
use crate::process::load_report;
use crate::process::normalize::{normalize_table, Admission, ColumnSpec, RecordFilter, WorkType};
use crate::process::utils::TruthySet;

/// What happened to the snapshots a view asked for.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Snapshots selected for loading.
    pub total: usize,
    /// Snapshots that made it through parsing and the structural check.
    pub processed: usize,
    pub skipped: Vec<CoreError>,
    pub catalog: CatalogStats,
}

impl LoadReport {
    pub fn summary(&self) -> String {
        let mut s = format!("processed {} of {} snapshots", self.processed, self.total);
        if self.catalog.undated > 0 {
            s.push_str(&format!(", {} undated file(s) ignored", self.catalog.undated));
        }
        s
    }
}

/// A view result together with the load report behind it.
#[derive(Debug)]
pub struct ViewOutcome<T> {
    pub outcome: Result<T, CoreError>,
    pub report: LoadReport,
}

impl<T> ViewOutcome<T> {
    fn new(outcome: Result<T, CoreError>, report: LoadReport) -> Self {
        Self { outcome, report }
    }

    fn insufficient(why: Insufficiency, report: LoadReport) -> Self {
        Self::new(Err(CoreError::EmptyResult(why)), report)
    }
}

/// Parse and normalize one fetched snapshot. Runs on the rayon pool.
fn parse_snapshot(
    snapshot: Snapshot,
    bytes: Result<Vec<u8>>,
    spec: &ColumnSpec,
    admission: Admission,
) -> Result<SnapshotRecords, CoreError> {
    let bytes = bytes.map_err(|e| CoreError::unavailable(&snapshot.name, format!("{:#}", e)))?;
    let table = load_report(&bytes).map_err(|e| CoreError::unavailable(&snapshot.name, format!("{:#}", e)))?;
    let records = normalize_table(&snapshot.name, &table, spec, admission)?;
    debug!(snapshot = %snapshot.name, rows = table.rows.len(), records = records.len(), "normalized");
    Ok(SnapshotRecords { snapshot, records })
}

/// Every snapshot of a batch whose parse task died is reported unavailable.
fn task_failed(snapshots: &[Snapshot], err: impl std::fmt::Display) -> Vec<Result<SnapshotRecords, CoreError>> {
    snapshots
        .iter()
        .map(|s| Err(CoreError::unavailable(&s.name, format!("parse task failed: {}", err))))
        .collect()
}

pub struct Pipeline<S> {
    source: S,
    collection: String,
    suffix: String,
    max_concurrency: usize,
    admission: Admission,
    columns: ColumnNames,
    truthy: TruthySet,
}

impl<S: SnapshotSource> Pipeline<S> {
    pub fn new(source: S, cfg: &Config) -> Self {
        Self {
            source,
            collection: cfg.source.collection.clone(),
            suffix: cfg.source.suffix.clone(),
            max_concurrency: cfg.source.max_concurrency.max(1),
            admission: cfg.compare.admission,
            columns: cfg.columns.clone(),
            truthy: cfg.truthy.clone(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn column_spec(&self, work: WorkType) -> ColumnSpec {
        ColumnSpec::new(&self.columns, &self.truthy, work)
    }

    /// List the collection and build the dated catalog.
    #[instrument(level = "debug", skip(self), fields(collection = %self.collection))]
    pub async fn catalog(&self) -> Result<Catalog> {
        let entries = self.source.list(&self.collection).await?;
        Ok(Catalog::from_entries(entries, &self.suffix))
    }

    /// A failed listing is logged and treated as an empty collection.
    async fn catalog_or_empty(&self) -> Catalog {
        match self.catalog().await {
            Ok(c) => c,
            Err(e) => {
                warn!(collection = %self.collection, error = %format!("{:#}", e), "listing failed");
                Catalog::default()
            }
        }
    }

    /// Fetch up to `max_concurrency` snapshots at a time, then parse and
    /// normalize them in parallel. Output keeps the order of `snapshots`.
    #[instrument(level = "debug", skip_all, fields(count = snapshots.len(), quantity = %spec.quantity))]
    pub async fn load(&self, snapshots: &[Snapshot], spec: &ColumnSpec) -> (Vec<SnapshotRecords>, Vec<CoreError>) {
        let fetched: Vec<(Snapshot, Result<Vec<u8>>)> = stream::iter(snapshots.iter().cloned())
            .map(|snap| async move {
                let bytes = self.source.fetch(&snap.id).await;
                (snap, bytes)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        // Parsing is CPU bound; keep it off the async workers.
        let admission = self.admission;
        let owned_spec = spec.clone();
        let parse_task = tokio::task::spawn_blocking(move || {
            fetched
                .into_par_iter()
                .map(|(snap, bytes)| parse_snapshot(snap, bytes, &owned_spec, admission))
                .collect::<Vec<Result<SnapshotRecords, CoreError>>>()
        });
        let parsed = match parse_task.await {
            Ok(parsed) => parsed,
            Err(e) => task_failed(snapshots, e),
        };

        let mut loaded = Vec::with_capacity(parsed.len());
        let mut skipped = Vec::new();
        for result in parsed {
            match result {
                Ok(s) => loaded.push(s),
                Err(e) => {
                    warn!(error = %e, "skipping snapshot");
                    skipped.push(e);
                }
            }
        }
        (loaded, skipped)
    }

    async fn load_with_report(
        &self,
        catalog: &Catalog,
        selected: &[Snapshot],
        spec: &ColumnSpec,
    ) -> (Vec<SnapshotRecords>, LoadReport) {
        let (loaded, skipped) = self.load(selected, spec).await;
        let report = LoadReport {
            total: selected.len(),
            processed: loaded.len(),
            skipped,
            catalog: catalog.stats(),
        };
        info!("{}", report.summary());
        (loaded, report)
    }

    /// Load one snapshot (the named one, or the latest) for a single-snapshot view.
    async fn load_single(
        &self,
        name: Option<&str>,
        spec: &ColumnSpec,
    ) -> Result<(SnapshotRecords, LoadReport), ViewOutcome<()>> {
        let catalog = self.catalog_or_empty().await;
        let chosen = match name {
            Some(n) => catalog.find(n),
            None => catalog.latest(),
        };
        let Some(chosen) = chosen.cloned() else {
            let report = LoadReport {
                catalog: catalog.stats(),
                ..LoadReport::default()
            };
            let outcome = match name {
                Some(n) => Err(CoreError::unavailable(n, "not found in the collection")),
                None => Err(CoreError::EmptyResult(Insufficiency::NoSnapshots)),
            };
            return Err(ViewOutcome::new(outcome, report));
        };

        let (mut loaded, report) = self
            .load_with_report(&catalog, std::slice::from_ref(&chosen), spec)
            .await;
        match loaded.pop() {
            Some(s) => Ok((s, report)),
            None => Err(ViewOutcome::insufficient(Insufficiency::NoSnapshots, report)),
        }
    }

    fn single_view(
        &self,
        loaded: SnapshotRecords,
        report: LoadReport,
        filter: &RecordFilter,
        mode: AggregateMode,
    ) -> ViewOutcome<Table> {
        let records = filter.apply(&loaded.records);
        let table = aggregate(&records, mode);
        if table.is_empty() {
            return ViewOutcome::insufficient(Insufficiency::NoRecords, report);
        }
        ViewOutcome::new(Ok(table), report)
    }

    /// Quantity per status category for one snapshot.
    #[instrument(skip(self))]
    pub async fn current_status(&self, work: WorkType, snapshot: Option<&str>) -> ViewOutcome<Table> {
        let spec = self.column_spec(work).requiring_category();
        match self.load_single(snapshot, &spec).await {
            Ok((loaded, report)) => {
                self.single_view(loaded, report, &RecordFilter::default(), AggregateMode::StatusCategory)
            }
            Err(v) => ViewOutcome::new(v.outcome.map(|_| Table::default()), v.report),
        }
    }

    /// Completed vs pending quantity for one snapshot.
    #[instrument(skip(self))]
    pub async fn current_split(
        &self,
        work: WorkType,
        snapshot: Option<&str>,
        filter: &RecordFilter,
    ) -> ViewOutcome<Table> {
        let spec = self.column_spec(work).requiring_status();
        match self.load_single(snapshot, &spec).await {
            Ok((loaded, report)) => self.single_view(loaded, report, filter, AggregateMode::BooleanSplit),
            Err(v) => ViewOutcome::new(v.outcome.map(|_| Table::default()), v.report),
        }
    }

    /// Completed concrete volume per snapshot date with week-over-week
    /// deltas, over the most recent `last` snapshots (all when `None`).
    #[instrument(skip(self))]
    pub async fn weekly_series(&self, last: Option<usize>, filter: &RecordFilter) -> ViewOutcome<Table> {
        let catalog = self.catalog_or_empty().await;
        let selected = match last {
            Some(n) => catalog.last_n(n),
            None => catalog.snapshots(),
        };
        let spec = self.column_spec(WorkType::Concrete).requiring_status();
        let (mut loaded, report) = self.load_with_report(&catalog, selected, &spec).await;
        if loaded.is_empty() {
            return ViewOutcome::insufficient(Insufficiency::NoSnapshots, report);
        }
        for s in &mut loaded {
            s.records = filter.apply(&s.records);
        }
        ViewOutcome::new(compare_series(&loaded), report)
    }

    /// Completed concrete volume in the two most recent snapshots,
    /// restricted to `period` where the snapshot carries period tags.
    #[instrument(skip(self))]
    pub async fn latest_comparison(&self, period: Option<&str>) -> ViewOutcome<TwoPeriodComparison> {
        let catalog = self.catalog_or_empty().await;
        let selected = catalog.last_two();
        if selected.len() < 2 {
            let report = LoadReport {
                catalog: catalog.stats(),
                ..LoadReport::default()
            };
            return ViewOutcome::insufficient(
                Insufficiency::TooFewSnapshots {
                    required: 2,
                    available: selected.len(),
                },
                report,
            );
        }
        let spec = self.column_spec(WorkType::Concrete).requiring_status();
        let (loaded, report) = self.load_with_report(&catalog, selected, &spec).await;
        ViewOutcome::new(compare_latest_two(&loaded, period), report)
    }
}

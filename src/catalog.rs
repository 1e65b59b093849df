//! Dated, ordered view over a collection listing.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, trace};

use crate::fetch::{SnapshotEntry, SnapshotId};
use crate::process::date_parser::parse_snapshot_date;

/// One dated report extract. The date comes from the name, never from
/// file metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub name: String,
    pub date: NaiveDate,
}

/// How many listed entries made it into the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    /// Entries returned by the listing.
    pub listed: usize,
    /// Entries whose name carries the report suffix.
    pub candidates: usize,
    /// Candidates dropped because no date pattern matched.
    pub undated: usize,
}

/// Snapshots sorted ascending by date; ties keep listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    snapshots: Vec<Snapshot>,
    stats: CatalogStats,
}

impl Catalog {
    pub fn from_entries(entries: Vec<SnapshotEntry>, suffix: &str) -> Self {
        let mut stats = CatalogStats {
            listed: entries.len(),
            ..CatalogStats::default()
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            if !entry.name.ends_with(suffix) {
                trace!(name = %entry.name, "ignoring non-report entry");
                continue;
            }
            stats.candidates += 1;
            match parse_snapshot_date(&entry.name) {
                Some(date) => snapshots.push(Snapshot {
                    id: entry.id,
                    name: entry.name,
                    date,
                }),
                None => {
                    trace!(name = %entry.name, "no date in snapshot name");
                    stats.undated += 1;
                }
            }
        }
        // stable: same-date snapshots stay in discovery order
        snapshots.sort_by_key(|s| s.date);

        debug!(
            listed = stats.listed,
            candidates = stats.candidates,
            undated = stats.undated,
            "catalog built"
        );
        Self { snapshots, stats }
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn stats(&self) -> CatalogStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The most recent `n` snapshots, still ascending.
    pub fn last_n(&self, n: usize) -> &[Snapshot] {
        let start = self.snapshots.len().saturating_sub(n);
        &self.snapshots[start..]
    }

    pub fn last_two(&self) -> &[Snapshot] {
        self.last_n(2)
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn find(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.name == name)
    }
}

// src/fetch/mod.rs
//! Snapshot retrieval: one trait, interchangeable sources.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fmt, future::Future, path::PathBuf};

use crate::config::{SourceConfig, SourceKind};

pub mod cache;
pub mod fs;
pub mod http;

pub use cache::CachedSource;
pub use fs::FsSource;
pub use http::HttpSource;

/// Opaque handle a source hands out in its listing and accepts in `fetch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One listed item, before any date parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotEntry {
    pub id: SnapshotId,
    pub name: String,
    pub modified: Option<DateTime<Utc>>,
}

impl SnapshotEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: SnapshotId::new(id),
            name: name.into(),
            modified: None,
        }
    }
}

/// Where snapshots come from. Failures are reported, never panicked on; the
/// pipeline turns them into skipped snapshots.
pub trait SnapshotSource: Send + Sync {
    /// Everything in `collection`, in discovery order.
    fn list(&self, collection: &str) -> impl Future<Output = Result<Vec<SnapshotEntry>>> + Send;

    /// Raw bytes of one snapshot.
    fn fetch(&self, id: &SnapshotId) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// The source selected by configuration.
#[derive(Debug, Clone)]
pub enum AnySource {
    Fs(FsSource),
    Http(HttpSource),
}

impl AnySource {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self> {
        Ok(match cfg.kind {
            SourceKind::Fs => AnySource::Fs(FsSource::new(PathBuf::from(&cfg.root))),
            SourceKind::Http => AnySource::Http(
                HttpSource::new(&cfg.root)
                    .with_context(|| format!("building http source for {}", cfg.root))?
                    .with_retries(cfg.max_retries, cfg.initial_backoff_ms),
            ),
        })
    }
}

impl SnapshotSource for AnySource {
    async fn list(&self, collection: &str) -> Result<Vec<SnapshotEntry>> {
        match self {
            AnySource::Fs(s) => s.list(collection).await,
            AnySource::Http(s) => s.list(collection).await,
        }
    }

    async fn fetch(&self, id: &SnapshotId) -> Result<Vec<u8>> {
        match self {
            AnySource::Fs(s) => s.fetch(id).await,
            AnySource::Http(s) => s.fetch(id).await,
        }
    }
}

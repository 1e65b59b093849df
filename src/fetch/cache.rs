use anyhow::Result;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::trace;

use super::{SnapshotEntry, SnapshotId, SnapshotSource};

type Entries = HashMap<SnapshotId, (Instant, Arc<Vec<u8>>)>;

/// Keeps fetched bytes for `ttl`, then refetches. Listings always go to the
/// inner source. A zero `ttl` turns the cache off.
#[derive(Debug, Clone)]
pub struct CachedSource<S> {
    inner: S,
    ttl: Duration,
    entries: Arc<Mutex<Entries>>,
}

impl<S> CachedSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn lookup(&self, id: &SnapshotId) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(id) {
            Some((stored, bytes)) if stored.elapsed() < self.ttl => Some(bytes.as_ref().clone()),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    fn store(&self, id: &SnapshotId, bytes: &[u8]) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
        entries.insert(id.clone(), (Instant::now(), Arc::new(bytes.to_vec())));
    }
}

impl<S: SnapshotSource> SnapshotSource for CachedSource<S> {
    async fn list(&self, collection: &str) -> Result<Vec<SnapshotEntry>> {
        self.inner.list(collection).await
    }

    async fn fetch(&self, id: &SnapshotId) -> Result<Vec<u8>> {
        if self.ttl.is_zero() {
            return self.inner.fetch(id).await;
        }
        if let Some(bytes) = self.lookup(id) {
            trace!(%id, "cache hit");
            return Ok(bytes);
        }
        let bytes = self.inner.fetch(id).await?;
        self.store(id, &bytes);
        Ok(bytes)
    }
}

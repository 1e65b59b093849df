use anyhow::{Context, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::{SnapshotEntry, SnapshotId, SnapshotSource};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry number `attempt` (1-based): doubles each time, capped
/// at one minute.
fn backoff_delay(initial_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(initial_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

/// Snapshots published as links on a directory index page.
///
/// A collection is a path relative to the base URL; ids are absolute file
/// URLs. Every request is retried with exponential backoff.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base: Url,
    max_retries: u32,
    initial_backoff_ms: u64,
}

impl HttpSource {
    pub fn new(base: &str) -> Result<Self> {
        let mut base = Url::parse(base).with_context(|| format!("parsing base URL {}", base))?;
        // joins are relative to the directory, not the last segment
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_BACKOFF_MS,
        })
    }

    pub fn with_retries(mut self, max_retries: u32, initial_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    fn collection_url(&self, collection: &str) -> Result<Url> {
        let collection = collection.trim().trim_matches('/');
        if collection.is_empty() {
            return Ok(self.base.clone());
        }
        self.base
            .join(&format!("{}/", collection))
            .with_context(|| format!("joining collection {} onto {}", collection, self.base))
    }

    async fn get_bytes_core(&self, url: &Url) -> Result<Vec<u8>> {
        debug!("GET {}", url);
        let bytes = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", url))?
            .bytes()
            .await
            .with_context(|| format!("Reading body from {}", url))?;
        Ok(bytes.to_vec())
    }

    async fn get_bytes_with_retry(&self, url: &Url) -> Result<Vec<u8>> {
        let mut attempts = 0;
        loop {
            match self.get_bytes_core(url).await {
                Ok(b) => return Ok(b),
                Err(e) if attempts < self.max_retries => {
                    attempts += 1;
                    let backoff = backoff_delay(self.initial_backoff_ms, attempts);
                    warn!(%url, attempt = attempts, delay_ms = backoff.as_millis() as u64, error = %e, "Retrying");
                    sleep(backoff).await;
                }
                Err(e) => {
                    error!(%url, error = %e, "Exhausted retries");
                    return Err(e);
                }
            }
        }
    }
}

/// File links on an index page, resolved against `page`. Directory links,
/// sort links (`?C=N;O=D`) and the parent link are skipped.
pub fn extract_links(html: &str, page: &Url) -> Vec<SnapshotEntry> {
    let selector = Selector::parse("a[href]").expect("anchor selector should parse");
    let doc = Html::parse_document(html);
    let mut out: Vec<SnapshotEntry> = Vec::new();
    for href in doc.select(&selector).filter_map(|e| e.value().attr("href")) {
        if href.starts_with('?') || href.ends_with('/') {
            continue;
        }
        let Ok(url) = page.join(href) else {
            continue;
        };
        let Some(name) = url
            .path_segments()
            .and_then(|mut segs| segs.next_back())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
        else {
            continue;
        };
        if out.iter().any(|e| e.id.as_str() == url.as_str()) {
            continue;
        }
        out.push(SnapshotEntry::new(url.to_string(), name));
    }
    out
}

impl SnapshotSource for HttpSource {
    #[instrument(level = "debug", skip(self), fields(base = %self.base))]
    async fn list(&self, collection: &str) -> Result<Vec<SnapshotEntry>> {
        let page = self.collection_url(collection)?;
        let body = self.get_bytes_with_retry(&page).await?;
        let html = String::from_utf8_lossy(&body);
        let entries = extract_links(&html, &page);
        debug!(count = entries.len(), "listed index links");
        Ok(entries)
    }

    async fn fetch(&self, id: &SnapshotId) -> Result<Vec<u8>> {
        let url = Url::parse(id.as_str()).with_context(|| format!("snapshot id {} is not a URL", id))?;
        self.get_bytes_with_retry(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"<html><body>
<h1>Index of /obra/semanal</h1>
<a href="?C=N;O=D">Name</a>
<a href="/obra/">Parent Directory</a>
<a href="05-01-2024_AO_GENERAL.txt">05-01-2024_AO_GENERAL.txt</a>
<a href="10-01-2024_AO_GENERAL.txt">10-01-2024_AO_GENERAL.txt</a>
<a href="https://cdn.example.org/x/12-01-2024_AO_GENERAL.txt">mirror</a>
<a href="05-01-2024_AO_GENERAL.txt">duplicate</a>
<a href="viejos/">viejos/</a>
</body></html>"#;

    #[test]
    fn extracts_file_links_in_page_order() {
        let page = Url::parse("https://example.org/obra/semanal/").unwrap();
        let entries = extract_links(INDEX, &page);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "05-01-2024_AO_GENERAL.txt",
                "10-01-2024_AO_GENERAL.txt",
                "12-01-2024_AO_GENERAL.txt"
            ]
        );
        assert_eq!(
            entries[0].id.as_str(),
            "https://example.org/obra/semanal/05-01-2024_AO_GENERAL.txt"
        );
        assert_eq!(
            entries[2].id.as_str(),
            "https://cdn.example.org/x/12-01-2024_AO_GENERAL.txt"
        );
    }

    #[test]
    fn collections_resolve_under_base() {
        let source = HttpSource::new("https://example.org/obra").unwrap();
        assert_eq!(
            source.collection_url("").unwrap().as_str(),
            "https://example.org/obra/"
        );
        assert_eq!(
            source.collection_url("/semanal/").unwrap().as_str(),
            "https://example.org/obra/semanal/"
        );
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(HttpSource::new("not a url").is_err());
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(500, 100), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_delay(u64::MAX, 2), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_delay(0, 64), Duration::ZERO);
    }

    #[test]
    fn many_retries_do_not_overflow() {
        let src = HttpSource::new("http://localhost/obra").unwrap().with_retries(u32::MAX, u64::MAX / 2);
        for attempt in [1, 31, 63, 64, 65, u32::MAX] {
            assert!(backoff_delay(src.initial_backoff_ms, attempt) <= Duration::from_millis(MAX_BACKOFF_MS));
        }
    }
}

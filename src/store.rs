//! Storage and fetch collaborators
//!
//! The pipeline only sees these traits; the concrete implementations are a
//! JSON-file store, a reqwest fetcher, and in-memory doubles for tests.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::record::Record;
use crate::subscription::SubscriptionSource;

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Persisted record list. `read` returns `None` when nothing has been saved
/// yet, which callers treat as an empty list.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read_records(&self) -> Result<Option<Vec<Record>>>;
    async fn save_records(&self, records: &[Record]) -> Result<()>;
}

/// Persisted subscription source list
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn read_sources(&self) -> Result<Option<Vec<SubscriptionSource>>>;
    async fn save_sources(&self, sources: &[SubscriptionSource]) -> Result<()>;
}

/// Remote fetch, optionally through the configured proxy
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_text(&self, url: &str, use_proxy: bool) -> Result<String>;
}

// ============================================================================
// JSON File Store
// ============================================================================

/// Record and source lists persisted as JSON files
pub struct JsonFileStore {
    records_path: PathBuf,
    sources_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(records_path: impl Into<PathBuf>, sources_path: impl Into<PathBuf>) -> Self {
        Self {
            records_path: records_path.into(),
            sources_path: sources_path.into(),
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        path: &PathBuf,
    ) -> Result<Option<T>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!("No file at {}, starting empty", path.display());
            return Ok(None);
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    async fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(value)?;
        tokio::fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn read_records(&self) -> Result<Option<Vec<Record>>> {
        Self::read_json(&self.records_path).await
    }

    async fn save_records(&self, records: &[Record]) -> Result<()> {
        Self::write_json(&self.records_path, &records).await
    }
}

#[async_trait]
impl SubscriptionStore for JsonFileStore {
    async fn read_sources(&self) -> Result<Option<Vec<SubscriptionSource>>> {
        Self::read_json(&self.sources_path).await
    }

    async fn save_sources(&self, sources: &[SubscriptionSource]) -> Result<()> {
        Self::write_json(&self.sources_path, &sources).await
    }
}

// ============================================================================
// HTTP Fetcher
// ============================================================================

/// Reqwest-backed fetcher with an optional proxy for flagged sources
pub struct HttpFetcher {
    direct: reqwest::Client,
    proxied: Option<reqwest::Client>,
}

impl HttpFetcher {
    pub fn new(proxy_url: Option<&str>) -> Result<Self> {
        let builder = || {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .user_agent(concat!("sublink/", env!("CARGO_PKG_VERSION")))
        };

        let direct = builder().build().context("Failed to build HTTP client")?;
        let proxied = match proxy_url {
            Some(url) => {
                let proxy =
                    reqwest::Proxy::all(url).context("Invalid proxy URL")?;
                Some(
                    builder()
                        .proxy(proxy)
                        .build()
                        .context("Failed to build proxied HTTP client")?,
                )
            }
            None => None,
        };

        Ok(Self { direct, proxied })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str, use_proxy: bool) -> Result<String> {
        let client = if use_proxy {
            self.proxied
                .as_ref()
                .context("Source wants a proxy but none is configured")?
        } else {
            &self.direct
        };

        let response = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Request to {} returned an error status", url))?;

        response
            .text()
            .await
            .with_context(|| format!("Failed to read body from {}", url))
    }
}

// ============================================================================
// In-Memory Doubles
// ============================================================================

/// In-memory store for tests; writes can be switched to fail.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Option<Vec<Record>>>,
    sources: Mutex<Option<Vec<SubscriptionSource>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        let store = Self::default();
        *store.records.lock().unwrap_or_else(|e| e.into_inner()) = Some(records);
        store
    }

    pub fn set_sources(&self, sources: Vec<SubscriptionSource>) {
        *self.sources.lock().unwrap_or_else(|e| e.into_inner()) = Some(sources);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_default()
    }

    pub fn sources(&self) -> Vec<SubscriptionSource> {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn read_records(&self) -> Result<Option<Vec<Record>>> {
        Ok(self.records.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn save_records(&self, records: &[Record]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("Simulated write failure");
        }
        *self.records.lock().unwrap_or_else(|e| e.into_inner()) = Some(records.to_vec());
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn read_sources(&self) -> Result<Option<Vec<SubscriptionSource>>> {
        Ok(self.sources.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn save_sources(&self, sources: &[SubscriptionSource]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("Simulated write failure");
        }
        *self.sources.lock().unwrap_or_else(|e| e.into_inner()) = Some(sources.to_vec());
        Ok(())
    }
}

/// Canned-response fetcher for tests
#[derive(Default)]
pub struct MemoryFetcher {
    responses: Mutex<std::collections::HashMap<String, String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stub(&self, url: &str, body: &str) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), body.to_string());
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch_text(&self, url: &str, _use_proxy: bool) -> Result<String> {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
            .with_context(|| format!("No stubbed response for {}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Payload, SsPayload};

    fn sample_record() -> Record {
        Record {
            id: "id1".to_string(),
            ps: "Sample".to_string(),
            on: 0,
            host: "example.com:8388".to_string(),
            scy: "aes-128-gcm".to_string(),
            hash: "h1".to_string(),
            payload: Payload::Shadowsocks(SsPayload {
                add: "example.com".to_string(),
                port: 8388,
                pwd: "pw".to_string(),
                scy: "aes-128-gcm".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(
            dir.path().join("records.json"),
            dir.path().join("sources.json"),
        );

        assert!(store.read_records().await.unwrap().is_none());

        store.save_records(&[sample_record()]).await.unwrap();
        let records = store.read_records().await.unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ps, "Sample");
    }

    #[tokio::test]
    async fn test_json_file_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(
            dir.path().join("nested/deep/records.json"),
            dir.path().join("nested/sources.json"),
        );
        store.save_records(&[]).await.unwrap();
        assert!(store.read_records().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        tokio::fs::write(&path, "not json").await.unwrap();
        let store = JsonFileStore::new(path, dir.path().join("sources.json"));
        assert!(store.read_records().await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_fail_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.save_records(&[sample_record()]).await.is_err());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_memory_fetcher_stub() {
        let fetcher = MemoryFetcher::new();
        fetcher.stub("https://example.com/sub", "body");
        assert_eq!(
            fetcher.fetch_text("https://example.com/sub", false).await.unwrap(),
            "body"
        );
        assert!(fetcher.fetch_text("https://other", false).await.is_err());
    }
}

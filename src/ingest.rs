//! Ingest orchestration
//!
//! The `Ingestor` owns the collaborator handles and drives every pipeline:
//! read the persisted list, decode candidates, merge, and write back. The
//! merged list is only committed when a save succeeds and something actually
//! changed; a failed write leaves the previous list untouched.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::codec::classify::{decode_link_lines, records_to_bundle, records_to_uris};
use crate::codec::protocols::CodecRegistry;
use crate::error::IngestError;
use crate::fingerprint::Fingerprinter;
use crate::merge::{MergeOutcome, merge_candidates};
use crate::record::Record;
use crate::store::{Fetcher, RecordStore, SubscriptionStore};
use crate::subscription::{
    SourceImportReport, SubscriptionSource, encode_source, extract_share_links, feed_to_records,
    import_sources,
};

/// Counters reported back after an import or refresh
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub new_count: usize,
    pub existing_count: usize,
    pub error_count: usize,
}

impl ImportReport {
    fn from_outcome(outcome: &MergeOutcome) -> Self {
        Self {
            new_count: outcome.new_count,
            existing_count: outcome.existing_count,
            error_count: outcome.error_count,
        }
    }

    fn absorb(&mut self, other: Self) {
        self.new_count += other.new_count;
        self.existing_count += other.existing_count;
        self.error_count += other.error_count;
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new, {} existing, {} failed",
            self.new_count, self.existing_count, self.error_count
        )
    }
}

/// Aggregate of one batch refresh
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub report: ImportReport,
}

// ============================================================================
// Ingestor
// ============================================================================

pub struct Ingestor {
    records: Arc<dyn RecordStore>,
    sources: Arc<dyn SubscriptionStore>,
    fetcher: Arc<dyn Fetcher>,
    registry: CodecRegistry,
    fingerprinter: Fingerprinter,
}

impl Ingestor {
    pub fn new(
        records: Arc<dyn RecordStore>,
        sources: Arc<dyn SubscriptionStore>,
        fetcher: Arc<dyn Fetcher>,
        registry: CodecRegistry,
        fingerprinter: Fingerprinter,
    ) -> Self {
        Self {
            records,
            sources,
            fetcher,
            registry,
            fingerprinter,
        }
    }

    /// Imports pasted share-link text into the persisted list.
    pub async fn import_text(&self, content: &str) -> Result<ImportReport, IngestError> {
        let existing = self.read_records().await?;
        let candidates = decode_link_lines(&self.registry, &self.fingerprinter, content);
        let outcome = merge_candidates(candidates, &existing);
        self.commit(&outcome).await?;
        Ok(ImportReport::from_outcome(&outcome))
    }

    /// Fetches and ingests one subscription source.
    pub async fn refresh_source(
        &self,
        source: &SubscriptionSource,
    ) -> Result<ImportReport, IngestError> {
        info!("Refreshing '{}' ({})", source.name, source.url);

        let body = self
            .fetcher
            .fetch_text(&source.url, source.is_proxy)
            .await
            .map_err(|e| IngestError::Fetch {
                url: source.url.clone(),
                source: e,
            })?;

        let existing = self.read_records().await?;

        let candidates = if source.is_html {
            let links = extract_share_links(&body);
            info!("Scraped {} links from '{}'", links.len(), source.name);
            decode_link_lines(&self.registry, &self.fingerprinter, &links.join("\n"))
        } else {
            match feed_to_records(&self.registry, &self.fingerprinter, &body)? {
                Some(candidates) => candidates,
                None => {
                    info!("Feed '{}' has no servers array, nothing to do", source.name);
                    return Ok(ImportReport::default());
                }
            }
        };

        let outcome = merge_candidates(candidates, &existing);
        self.commit(&outcome).await?;
        Ok(ImportReport::from_outcome(&outcome))
    }

    /// Refreshes sources one after another. A failing source is logged and
    /// skipped; the batch always runs to the end.
    pub async fn refresh_all(&self, auto_only: bool) -> Result<RefreshSummary, IngestError> {
        let sources = self.read_sources().await?;
        let mut summary = RefreshSummary::default();

        for source in sources
            .iter()
            .filter(|s| !auto_only || s.auto_update)
        {
            match self.refresh_source(source).await {
                Ok(report) => {
                    info!("'{}': {}", source.name, report);
                    summary.sources_ok += 1;
                    summary.report.absorb(report);
                }
                Err(e) => {
                    warn!("Skipping '{}': {}", source.name, e);
                    summary.sources_failed += 1;
                }
            }
        }

        Ok(summary)
    }

    // ------------------------------------------------------------------------
    // Record access and sharing
    // ------------------------------------------------------------------------

    pub async fn list_records(&self) -> Result<Vec<Record>, IngestError> {
        self.read_records().await
    }

    /// Renders the persisted list as share URIs, one per line, or as a
    /// base64 bundle of them.
    pub async fn export_records(&self, legacy: bool, bundle: bool) -> Result<String, IngestError> {
        let records = self.read_records().await?;
        if bundle {
            records_to_bundle(&self.registry, &records, legacy).map_err(|e| {
                IngestError::MalformedPayload {
                    scheme: "export".to_string(),
                    source: e,
                }
            })
        } else {
            let uris = records_to_uris(&self.registry, &records, legacy).map_err(|e| {
                IngestError::MalformedPayload {
                    scheme: "export".to_string(),
                    source: e,
                }
            })?;
            Ok(uris.join("\n"))
        }
    }

    // ------------------------------------------------------------------------
    // Subscription sources
    // ------------------------------------------------------------------------

    pub async fn list_sources(&self) -> Result<Vec<SubscriptionSource>, IngestError> {
        self.read_sources().await
    }

    /// Adds or replaces a source and persists the list.
    pub async fn put_source(
        &self,
        mut source: SubscriptionSource,
        replace_index: Option<usize>,
    ) -> Result<(), IngestError> {
        source
            .prepare(&self.fingerprinter)
            .map_err(IngestError::Persistence)?;

        let mut sources = self.read_sources().await?;
        match replace_index {
            Some(i) if i < sources.len() => sources[i] = source,
            _ => sources.push(source),
        }
        self.save_sources(&sources).await
    }

    /// Renders all sources as `doaySub://` lines.
    pub async fn export_sources(&self) -> Result<String, IngestError> {
        let sources = self.read_sources().await?;
        let lines: Result<Vec<String>> = sources.iter().map(encode_source).collect();
        lines.map(|l| l.join("\n")).map_err(IngestError::Persistence)
    }

    /// Imports `doaySub://` lines and persists the grown list.
    pub async fn import_sources_text(
        &self,
        content: &str,
    ) -> Result<SourceImportReport, IngestError> {
        let mut sources = self.read_sources().await?;
        let report = import_sources(content, &mut sources);
        if report.ok_count > 0 {
            self.save_sources(&sources).await?;
        }
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn read_records(&self) -> Result<Vec<Record>, IngestError> {
        self.records
            .read_records()
            .await
            .map(Option::unwrap_or_default)
            .map_err(IngestError::Persistence)
    }

    async fn read_sources(&self) -> Result<Vec<SubscriptionSource>, IngestError> {
        self.sources
            .read_sources()
            .await
            .map(Option::unwrap_or_default)
            .map_err(IngestError::Persistence)
    }

    async fn save_sources(&self, sources: &[SubscriptionSource]) -> Result<(), IngestError> {
        self.sources
            .save_sources(sources)
            .await
            .map_err(IngestError::Persistence)
    }

    /// Writes the merged list back, but only when the batch added something.
    async fn commit(&self, outcome: &MergeOutcome) -> Result<(), IngestError> {
        if outcome.new_count == 0 {
            info!("No new entries, keeping the stored list as-is");
            return Ok(());
        }
        self.records
            .save_records(&outcome.merged)
            .await
            .map_err(IngestError::Persistence)
    }
}

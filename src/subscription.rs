//! Subscription sources and feed parsing
//!
//! A subscription source points at a remote endpoint serving either an HTML
//! page with share links scattered through it or a JSON feed with a
//! `servers` array. Sources themselves are fingerprinted (hash field blanked
//! first) so they can be exported and re-imported without duplicating.

use std::collections::HashSet;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::codec::base64::{decode_base64_text, encode_base64};
use crate::codec::classify::build_record;
use crate::codec::protocols::{CodecRegistry, LinkCodec, json_str};
use crate::error::IngestError;
use crate::fingerprint::Fingerprinter;
use crate::record::Record;

/// Share links shorter than this are assumed truncated and dropped.
const MIN_SCRAPED_LINK_LEN: usize = 80;

pub const SOURCE_SCHEME: &str = "doaySub://";

// ============================================================================
// Subscription Source
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionSource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub url: String,
    /// Content fingerprint over the source with this field blanked
    #[serde(default)]
    pub hash: String,
    #[serde(rename = "autoUpdate", default)]
    pub auto_update: bool,
    /// Fetch through the configured proxy
    #[serde(rename = "isProxy", default)]
    pub is_proxy: bool,
    /// Endpoint serves an HTML page rather than a JSON feed
    #[serde(rename = "isHtml", default)]
    pub is_html: bool,
}

impl SubscriptionSource {
    /// Trims text fields, normalizes the URL and recomputes the hash.
    /// Runs on every save so edits never leave a stale fingerprint behind.
    pub fn prepare(&mut self, fingerprinter: &Fingerprinter) -> Result<()> {
        self.name = self.name.trim().to_string();
        self.note = self.note.trim().to_string();
        self.url = normalize_url(self.url.trim());

        self.hash = String::new();
        self.hash = fingerprinter.fingerprint(self)?;
        Ok(())
    }
}

/// Lowercases the scheme and host of a URL, leaving unparsable input as-is.
fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => url.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Removes sources by index; returns how many were removed.
pub fn delete_sources(sources: &mut Vec<SubscriptionSource>, indexes: &[usize]) -> usize {
    let before = sources.len();
    let drop: HashSet<usize> = indexes.iter().copied().collect();
    let mut i = 0;
    sources.retain(|_| {
        let keep = !drop.contains(&i);
        i += 1;
        keep
    });
    before - sources.len()
}

// ============================================================================
// Source Export / Import
// ============================================================================

/// Encodes one source as a `doaySub://<base64 JSON>#<name>` line.
pub fn encode_source(source: &SubscriptionSource) -> Result<String> {
    let json = serde_json::to_string(source)?;
    Ok(format!(
        "{}{}#{}",
        SOURCE_SCHEME,
        encode_base64(json),
        urlencoding::encode(&source.name)
    ))
}

/// Decodes one `doaySub://` line. The embedded JSON must carry a `hash`
/// field; anything else is rejected as foreign data.
pub fn decode_source(line: &str) -> Result<SubscriptionSource> {
    let body = line
        .trim()
        .strip_prefix(SOURCE_SCHEME)
        .context("Not a doaySub:// line")?;
    let encoded = body.split_once('#').map(|(b, _)| b).unwrap_or(body);
    let text = decode_base64_text(encoded).context("Invalid base64 in doaySub line")?;
    let value: Value = serde_json::from_str(&text).context("Invalid JSON in doaySub line")?;

    if value.get("hash").and_then(Value::as_str).is_none_or(str::is_empty) {
        anyhow::bail!("doaySub entry is missing its hash");
    }

    serde_json::from_value(value).context("Unrecognized doaySub entry shape")
}

/// Per-line counters from a source import
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceImportReport {
    pub ok_count: usize,
    pub existing_count: usize,
    pub error_count: usize,
}

/// Imports `doaySub://` lines into a source list, deduplicating by hash.
pub fn import_sources(
    content: &str,
    sources: &mut Vec<SubscriptionSource>,
) -> SourceImportReport {
    let mut seen: HashSet<String> = sources.iter().map(|s| s.hash.clone()).collect();
    let mut report = SourceImportReport::default();

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match decode_source(line) {
            Ok(source) => {
                if seen.insert(source.hash.clone()) {
                    sources.push(source);
                    report.ok_count += 1;
                } else {
                    report.existing_count += 1;
                }
            }
            Err(e) => {
                debug!("Skipping source line: {}", e);
                report.error_count += 1;
            }
        }
    }

    report
}

// ============================================================================
// HTML Scraping
// ============================================================================

/// Pulls share links out of arbitrary HTML.
///
/// Matches are deduplicated verbatim before unescaping, `&amp;` is restored
/// and obviously-truncated links are dropped.
pub fn extract_share_links(html: &str) -> Vec<String> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    static AMP: OnceLock<Regex> = OnceLock::new();
    let link_re = LINK.get_or_init(|| {
        Regex::new(r#"(?:vmess|vless|ss|trojan)://[^\s"'<>]+"#).expect("hard-coded regex")
    });
    let amp_re = AMP.get_or_init(|| Regex::new(r"(?i)&amp;").expect("hard-coded regex"));

    let mut seen = HashSet::new();
    link_re
        .find_iter(html)
        .map(|m| m.as_str())
        .filter(|raw| seen.insert(raw.to_string()))
        .map(|raw| amp_re.replace_all(raw, "&").into_owned())
        .filter(|link| link.len() > MIN_SCRAPED_LINK_LEN)
        .collect()
}

// ============================================================================
// JSON Feeds
// ============================================================================

/// Parses a JSON feed body into record candidates.
///
/// Returns `Ok(None)` when the document parses but has no `servers` array,
/// which callers treat as a logged no-op rather than a failure.
pub fn feed_to_records(
    registry: &CodecRegistry,
    fingerprinter: &Fingerprinter,
    body: &str,
) -> Result<Option<Vec<Result<Record, IngestError>>>, IngestError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| IngestError::UnsupportedFeedShape(e.to_string()))?;

    let Some(servers) = value.get("servers").and_then(Value::as_array) else {
        return Ok(None);
    };

    let candidates = servers
        .iter()
        .map(|server| feed_server_to_record(registry, fingerprinter, server))
        .collect();
    Ok(Some(candidates))
}

fn feed_server_to_record(
    registry: &CodecRegistry,
    fingerprinter: &Fingerprinter,
    server: &Value,
) -> Result<Record, IngestError> {
    let scheme = json_str(server, &["type"], "");
    if scheme.is_empty() {
        return Err(IngestError::MalformedUri(
            "feed entry without a type field".to_string(),
        ));
    }

    let codec = registry
        .get(&scheme)
        .ok_or_else(|| IngestError::MalformedUri(format!("unsupported feed type: {}", scheme)))?;

    let link = codec
        .decode_feed(server)
        .map_err(|source| IngestError::MalformedPayload {
            scheme: scheme.clone(),
            source,
        })?;

    build_record(fingerprinter, link).map_err(|source| IngestError::MalformedPayload {
        scheme,
        source,
    })
}

//! URI classification and record construction
//!
//! Entry point for turning raw share-link text into records: pick the codec
//! by scheme, decode, then centrally apply the steps every protocol shares
//! (recursive percent-decode, network-alias normalization, display-name
//! rules, fingerprint, id).

use anyhow::{Context, Result};
use tracing::debug;

use crate::codec::base64::encode_base64;
use crate::codec::protocols::{
    CodecRegistry, DecodedLink, LinkCodec, deep_decode, extract_scheme, safe_decode_uri,
};
use crate::error::IngestError;
use crate::fingerprint::Fingerprinter;
use crate::record::{Payload, Record, UNTITLED_NAME, generate_unique_id, truncate_display_name};

/// Decodes one share URI into a record.
pub fn uri_to_record(
    registry: &CodecRegistry,
    fingerprinter: &Fingerprinter,
    uri: &str,
) -> Result<Record, IngestError> {
    let trimmed = uri.trim();
    let scheme = extract_scheme(trimmed)
        .map_err(|_| IngestError::MalformedUri(preview(trimmed)))?
        .to_string();

    let codec = registry
        .get(&scheme)
        .ok_or_else(|| IngestError::MalformedUri(preview(trimmed)))?;

    let link = codec
        .decode(trimmed)
        .map_err(|source| IngestError::MalformedPayload {
            scheme: scheme.clone(),
            source,
        })?;

    build_record(fingerprinter, link).map_err(|source| IngestError::MalformedPayload {
        scheme,
        source,
    })
}

/// Builds a record from a decoded link: percent-decodes the payload,
/// normalizes network aliases, fingerprints, and settles the display name.
pub fn build_record(fingerprinter: &Fingerprinter, link: DecodedLink) -> Result<Record> {
    let value = serde_json::to_value(&link.payload)
        .context("Failed to serialize decoded payload")?;
    let mut payload: Payload = serde_json::from_value(deep_decode(value))
        .context("Failed to rebuild decoded payload")?;
    payload.normalize();

    let hash = fingerprinter.fingerprint(&payload)?;
    let ps = finalize_display_name(&link.ps, &payload);

    debug!("Built {} record '{}' ({})", payload.protocol(), ps, hash);

    Ok(Record {
        id: generate_unique_id(),
        ps,
        on: 0,
        host: payload.host_summary(),
        scy: payload.security_summary(),
        hash,
        payload,
    })
}

/// Settles the display name: percent-decoded fragment, falling back to
/// `address:port` and then to a placeholder, capped at 50 characters.
pub fn finalize_display_name(raw: &str, payload: &Payload) -> String {
    let name = safe_decode_uri(raw.trim());
    let name = name.trim();
    if !name.is_empty() {
        return truncate_display_name(name);
    }
    if payload.address().is_empty() {
        UNTITLED_NAME.to_string()
    } else {
        truncate_display_name(&payload.host_summary())
    }
}

/// Splits pasted text into candidate link lines.
pub fn parse_link_list(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Decodes every line of pasted text, keeping per-line failures as errors.
pub fn decode_link_lines(
    registry: &CodecRegistry,
    fingerprinter: &Fingerprinter,
    content: &str,
) -> Vec<Result<Record, IngestError>> {
    parse_link_list(content)
        .into_iter()
        .map(|line| uri_to_record(registry, fingerprinter, line))
        .collect()
}

// ============================================================================
// Record Sharing
// ============================================================================

/// Encodes records as share URIs, one per record.
pub fn records_to_uris(
    registry: &CodecRegistry,
    records: &[Record],
    legacy: bool,
) -> Result<Vec<String>> {
    records
        .iter()
        .map(|record| {
            if legacy {
                registry.encode_legacy(&record.payload, &record.ps)
            } else {
                registry.encode(&record.payload, &record.ps)
            }
        })
        .collect()
}

/// Encodes records as a base64 bundle of newline-joined share URIs, the
/// form subscription endpoints serve.
pub fn records_to_bundle(
    registry: &CodecRegistry,
    records: &[Record],
    legacy: bool,
) -> Result<String> {
    let uris = records_to_uris(registry, records, legacy)?;
    Ok(encode_base64(uris.join("\n")))
}

fn preview(uri: &str) -> String {
    const MAX: usize = 60;
    if uri.chars().count() <= MAX {
        uri.to_string()
    } else {
        let head: String = uri.chars().take(MAX).collect();
        format!("{}…", head)
    }
}

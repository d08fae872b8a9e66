//! List merge and edit operations
//!
//! Dedup identity is the content fingerprint: a candidate whose hash matches
//! an existing entry (or an earlier candidate in the same batch) is counted
//! as existing and dropped. New entries land at the front, newest first.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::codec::classify::finalize_display_name;
use crate::error::IngestError;
use crate::fingerprint::Fingerprinter;
use crate::record::{Payload, Record};

/// Result of folding a candidate batch into an existing list
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Existing entries plus accepted candidates, newest first
    pub merged: Vec<Record>,
    /// Candidates accepted into the list
    pub new_count: usize,
    /// Candidates dropped as duplicates
    pub existing_count: usize,
    /// Candidates that failed to decode
    pub error_count: usize,
}

/// Folds decoded candidates into an existing list.
///
/// Errors are counted and logged, never propagated: one bad line in a pasted
/// batch must not sink the rest.
pub fn merge_candidates(
    candidates: impl IntoIterator<Item = Result<Record, IngestError>>,
    existing: &[Record],
) -> MergeOutcome {
    let mut seen: HashSet<String> = existing.iter().map(|r| r.hash.clone()).collect();

    let mut accepted = Vec::new();
    let mut outcome = MergeOutcome::default();

    for candidate in candidates {
        match candidate {
            Ok(record) => {
                if seen.insert(record.hash.clone()) {
                    debug!("Accepted '{}' ({})", record.ps, record.hash);
                    accepted.push(record);
                    outcome.new_count += 1;
                } else {
                    debug!("Duplicate '{}' ({})", record.ps, record.hash);
                    outcome.existing_count += 1;
                }
            }
            Err(e) => {
                warn!("Skipping candidate: {}", e);
                outcome.error_count += 1;
            }
        }
    }

    accepted.extend_from_slice(existing);
    outcome.merged = accepted;
    outcome
}

// ============================================================================
// List Editing
// ============================================================================

/// Replaces the payload and name of one entry, keeping its id and activation
/// flag, and moves it to the front. Summaries and fingerprint are recomputed.
pub fn update_record(
    records: &mut Vec<Record>,
    id: &str,
    mut payload: Payload,
    ps: &str,
    fingerprinter: &Fingerprinter,
) -> anyhow::Result<bool> {
    let Some(pos) = records.iter().position(|r| r.id == id) else {
        return Ok(false);
    };

    payload.normalize();
    let hash = fingerprinter.fingerprint(&payload)?;
    let old = records.remove(pos);

    let updated = Record {
        id: old.id,
        ps: finalize_display_name(ps, &payload),
        on: old.on,
        host: payload.host_summary(),
        scy: payload.security_summary(),
        hash,
        payload,
    };
    records.insert(0, updated);
    Ok(true)
}

/// Deletes entries by id; returns how many were removed.
pub fn delete_records(records: &mut Vec<Record>, ids: &[&str]) -> usize {
    let before = records.len();
    records.retain(|r| !ids.contains(&r.id.as_str()));
    before - records.len()
}

/// Moves the entry with the given id to a new index, clamped to the list.
pub fn move_record(records: &mut Vec<Record>, id: &str, to: usize) -> bool {
    let Some(pos) = records.iter().position(|r| r.id == id) else {
        return false;
    };
    let record = records.remove(pos);
    let to = to.min(records.len());
    records.insert(to, record);
    true
}

/// Sets the activation flag on one entry.
pub fn set_enabled(records: &mut [Record], id: &str, enabled: bool) -> bool {
    match records.iter_mut().find(|r| r.id == id) {
        Some(record) => {
            record.on = u8::from(enabled);
            true
        }
        None => false,
    }
}

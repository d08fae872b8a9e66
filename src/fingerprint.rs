//! Content fingerprinting
//!
//! A fingerprint is the lowercase hex digest of the canonical JSON form of a
//! value: object keys recursively sorted, no whitespace. Two values that
//! differ only in field order produce the same fingerprint, which is what
//! makes the hash usable as a dedup identity.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha384, Sha512};

// ============================================================================
// Algorithm Selection
// ============================================================================

/// Digest algorithm, selected by config
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

// ============================================================================
// Fingerprinter
// ============================================================================

/// Computes canonical-JSON fingerprints with a fixed algorithm
#[derive(Debug, Clone, Copy, Default)]
pub struct Fingerprinter {
    algorithm: HashAlgorithm,
}

impl Fingerprinter {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Fingerprints any serializable value.
    ///
    /// The value is converted to JSON, object keys are sorted recursively and
    /// the compact serialization is hashed.
    pub fn fingerprint<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = serde_json::to_value(value).context("Failed to serialize value for hashing")?;
        let canonical = serde_json::to_string(&canonicalize(json))
            .context("Failed to render canonical JSON")?;

        let digest = match self.algorithm {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(canonical.as_bytes())),
            HashAlgorithm::Sha384 => hex::encode(Sha384::digest(canonical.as_bytes())),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(canonical.as_bytes())),
        };
        Ok(digest)
    }
}

/// Rebuilds a JSON value with all object keys in sorted order.
///
/// `serde_json::Map` preserves insertion order by default, so re-inserting
/// entries sorted by key fixes the serialization order.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

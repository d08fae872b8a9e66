//! Error taxonomy for the ingest pipeline
//!
//! Per-item parse failures inside a batch are counted, not raised; the
//! variants here cover the terminal cases a caller has to react to.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The input is not a recognizable share link at all
    #[error("Malformed URI: {0}")]
    MalformedUri(String),

    /// The scheme was recognized but the body could not be decoded
    #[error("Malformed {scheme} payload")]
    MalformedPayload {
        scheme: String,
        #[source]
        source: anyhow::Error,
    },

    /// A subscription endpoint could not be fetched
    #[error("Failed to fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// The merged list could not be written back
    #[error("Failed to persist list")]
    Persistence(#[source] anyhow::Error),

    /// A JSON feed parsed but had none of the supported shapes
    #[error("Unsupported feed shape: {0}")]
    UnsupportedFeedShape(String),
}

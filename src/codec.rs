//! Share-link codec
//!
//! Converts proxy share links between their wire forms and the canonical
//! record type:
//!
//! - `classify`: scheme dispatch, record construction, link-list splitting
//! - `protocols`: the per-protocol codecs and the registry
//! - `base64`: tolerant base64 helpers for legacy links and bundles

pub mod base64;
pub mod classify;
pub mod protocols;

pub use classify::{decode_link_lines, parse_link_list, uri_to_record};
pub use protocols::{CodecRegistry, DecodedLink, LinkCodec};

//! Base64 helpers for share links
//!
//! Share links in the wild mix standard and URL-safe alphabets and are
//! frequently stripped of padding, so decoding tries several engines before
//! giving up.

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

/// Decodes base64 text, tolerating either alphabet and missing padding.
pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();

    let engines = [STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD];
    for engine in &engines {
        if let Ok(bytes) = engine.decode(trimmed) {
            return Ok(bytes);
        }
    }

    // Some producers strip padding but keep the standard alphabet; retry with
    // padding restored.
    let padded = add_base64_padding(trimmed);
    for engine in &engines {
        if let Ok(bytes) = engine.decode(&padded) {
            return Ok(bytes);
        }
    }

    Err(anyhow!("Invalid base64 data"))
}

/// Decodes base64 text into a UTF-8 string.
pub fn decode_base64_text(input: &str) -> Result<String> {
    let bytes = decode_base64(input)?;
    String::from_utf8(bytes).map_err(|_| anyhow!("Base64 payload is not valid UTF-8"))
}

/// Encodes bytes with the standard padded alphabet, the form other clients
/// expect in legacy links and bundles.
pub fn encode_base64(input: impl AsRef<[u8]>) -> String {
    STANDARD.encode(input)
}

/// Restores `=` padding to a base64 string whose length is not a multiple
/// of four.
fn add_base64_padding(input: &str) -> String {
    let remainder = input.len() % 4;
    if remainder == 0 {
        input.to_string()
    } else {
        let mut padded = input.to_string();
        padded.push_str(&"=".repeat(4 - remainder));
        padded
    }
}

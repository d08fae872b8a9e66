//! Application configuration
//!
//! Loaded from a TOML file. Besides paths and the digest algorithm it
//! carries the editor option lists (network types, security methods, TLS
//! fingerprints); these are data handed to front-ends, never validation
//! rules baked into the codec.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fingerprint::HashAlgorithm;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Digest used for record and source fingerprints
    pub hash_algorithm: HashAlgorithm,
    /// Persisted record list
    pub records_path: PathBuf,
    /// Persisted subscription source list
    pub sources_path: PathBuf,
    /// Proxy used for sources flagged `isProxy`
    pub proxy_url: Option<String>,
    /// Editor option lists
    pub options: OptionLists,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            records_path: PathBuf::from("servers.json"),
            sources_path: PathBuf::from("subscriptions.json"),
            proxy_url: None,
            options: OptionLists::default(),
        }
    }
}

impl AppConfig {
    /// Loads config from a TOML file; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

/// Option lists offered by server editors
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OptionLists {
    pub vmess_networks: Vec<String>,
    pub vmess_security: Vec<String>,
    pub vless_networks: Vec<String>,
    pub vless_security: Vec<String>,
    pub vless_flows: Vec<String>,
    pub ss_methods: Vec<String>,
    pub trojan_networks: Vec<String>,
    pub fingerprints: Vec<String>,
    pub alpn: Vec<String>,
}

impl Default for OptionLists {
    fn default() -> Self {
        fn list(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            vmess_networks: list(&["raw", "kcp", "ws", "http", "grpc", "httpupgrade"]),
            vmess_security: list(&[
                "none",
                "auto",
                "zero",
                "aes-128-gcm",
                "chacha20-poly1305",
            ]),
            vless_networks: list(&["raw", "ws", "grpc", "xhttp"]),
            vless_security: list(&["none", "tls", "reality"]),
            vless_flows: list(&["", "xtls-rprx-vision"]),
            ss_methods: list(&[
                "aes-128-gcm",
                "aes-256-gcm",
                "chacha20-poly1305",
                "2022-blake3-aes-128-gcm",
                "2022-blake3-aes-256-gcm",
                "2022-blake3-chacha20-poly1305",
                "none",
            ]),
            trojan_networks: list(&["ws", "grpc"]),
            fingerprints: list(&[
                "chrome", "firefox", "safari", "edge", "ios", "android", "random",
            ]),
            alpn: list(&["", "h2", "http/1.1", "h2,http/1.1"]),
        }
    }
}

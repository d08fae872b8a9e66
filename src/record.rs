//! Canonical server records
//!
//! This module defines the protocol-tagged record type shared by the link
//! codecs, the dedup/merge engine and the subscription pipeline. A record's
//! serialized shape mirrors the legacy wire format (`id`, `ps`, `on`, `type`,
//! `host`, `scy`, `hash`, `data`) so lists written by other clients load
//! unchanged.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Display names are capped at this many characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 50;

/// Fallback display name when a link carries neither fragment nor host.
pub const UNTITLED_NAME: &str = "untitled";

// ============================================================================
// Protocol Tag
// ============================================================================

/// Supported share-link protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Vmess,
    Vless,
    Shadowsocks,
    Trojan,
}

impl Protocol {
    /// Returns the URI scheme for this protocol (e.g., "ss" for Shadowsocks)
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Shadowsocks => "ss",
            Protocol::Trojan => "trojan",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.scheme())
    }
}

// ============================================================================
// Per-Protocol Payloads
// ============================================================================

/// VMess connection parameters
///
/// Field names follow the legacy share-link JSON keys so the legacy
/// base64-JSON form round-trips through other clients.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VmessPayload {
    /// Server address
    #[serde(default)]
    pub add: String,
    /// Server port
    #[serde(default)]
    pub port: u16,
    /// User UUID
    #[serde(default)]
    pub id: String,
    /// Alter ID (kept as a string, legacy links carry "0")
    #[serde(default = "default_alter_id")]
    pub aid: String,
    /// Network type (raw, kcp, ws, http, grpc, httpupgrade)
    #[serde(default)]
    pub net: String,
    /// Security/encryption method (auto, none, zero, aes-128-gcm, ...)
    #[serde(default)]
    pub scy: String,
    /// Virtual host (WebSocket Host header, HTTP host, kcp domain)
    #[serde(default)]
    pub host: String,
    /// Path / SNI / gRPC service name / kcp seed, depending on network
    #[serde(default)]
    pub path: String,
    /// Header obfuscation type (raw: http, kcp: srtp/utp/...)
    #[serde(rename = "type", default)]
    pub header_type: String,
    /// gRPC mode (gun, multi)
    #[serde(default)]
    pub mode: String,
    /// TLS enabled
    #[serde(default)]
    pub tls: bool,
    /// ALPN list, comma separated
    #[serde(default)]
    pub alpn: String,
    /// uTLS fingerprint
    #[serde(default)]
    pub fp: String,
}

fn default_alter_id() -> String {
    "0".to_string()
}

/// VLESS connection parameters
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VlessPayload {
    /// Server address
    #[serde(default)]
    pub add: String,
    /// Server port
    #[serde(default)]
    pub port: u16,
    /// User UUID
    #[serde(default)]
    pub id: String,
    /// Network type (raw, ws, grpc, xhttp)
    #[serde(default)]
    pub net: String,
    /// Security layer (none, tls, reality)
    #[serde(default)]
    pub scy: String,
    /// Virtual host
    #[serde(default)]
    pub host: String,
    /// Path; doubles as SNI / gRPC service name / reality server name
    #[serde(default)]
    pub path: String,
    /// gRPC or xhttp mode
    #[serde(default)]
    pub mode: String,
    /// xhttp extra settings (JSON text, base64 on the wire)
    #[serde(default)]
    pub extra: String,
    /// ALPN list, comma separated
    #[serde(default)]
    pub alpn: String,
    /// uTLS fingerprint
    #[serde(default)]
    pub fp: String,
    /// Flow control (xtls-rprx-vision, ...)
    #[serde(default)]
    pub flow: String,
    /// Reality public key
    #[serde(default)]
    pub pbk: String,
    /// Reality short id
    #[serde(default)]
    pub sid: String,
    /// Reality spider X
    #[serde(default)]
    pub spx: String,
}

/// Shadowsocks connection parameters
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SsPayload {
    /// Server address
    #[serde(default)]
    pub add: String,
    /// Server port
    #[serde(default)]
    pub port: u16,
    /// Password
    #[serde(default)]
    pub pwd: String,
    /// Encryption method (aes-128-gcm, 2022-blake3-aes-256-gcm, ...)
    #[serde(default)]
    pub scy: String,
}

/// Trojan connection parameters
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TrojanPayload {
    /// Server address
    #[serde(default)]
    pub add: String,
    /// Server port
    #[serde(default)]
    pub port: u16,
    /// Password
    #[serde(default)]
    pub pwd: String,
    /// Network type (ws, grpc), empty for plain TLS
    #[serde(default)]
    pub net: String,
    /// Security layer, always "tls" for trojan
    #[serde(default = "default_trojan_security")]
    pub scy: String,
    /// Virtual host
    #[serde(default)]
    pub host: String,
    /// Path (ws) or gRPC service name
    #[serde(default)]
    pub path: String,
}

fn default_trojan_security() -> String {
    "tls".to_string()
}

// ============================================================================
// Tagged Payload
// ============================================================================

/// Protocol-tagged payload, the fingerprinted part of a record
///
/// Serializes as `{"type": "...", "data": {...}}`, which flattens into a
/// record as the legacy `type`/`data` field pair.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    #[serde(rename = "vmess")]
    Vmess(VmessPayload),
    #[serde(rename = "vless")]
    Vless(VlessPayload),
    #[serde(rename = "ss")]
    Shadowsocks(SsPayload),
    #[serde(rename = "trojan")]
    Trojan(TrojanPayload),
}

impl Payload {
    /// Returns the protocol tag of this payload
    pub fn protocol(&self) -> Protocol {
        match self {
            Payload::Vmess(_) => Protocol::Vmess,
            Payload::Vless(_) => Protocol::Vless,
            Payload::Shadowsocks(_) => Protocol::Shadowsocks,
            Payload::Trojan(_) => Protocol::Trojan,
        }
    }

    /// Returns the server address
    pub fn address(&self) -> &str {
        match self {
            Payload::Vmess(p) => &p.add,
            Payload::Vless(p) => &p.add,
            Payload::Shadowsocks(p) => &p.add,
            Payload::Trojan(p) => &p.add,
        }
    }

    /// Returns the server port
    pub fn port(&self) -> u16 {
        match self {
            Payload::Vmess(p) => p.port,
            Payload::Vless(p) => p.port,
            Payload::Shadowsocks(p) => p.port,
            Payload::Trojan(p) => p.port,
        }
    }

    /// Derived `address:port` summary shown in lists
    pub fn host_summary(&self) -> String {
        format!("{}:{}", self.address(), self.port())
    }

    /// Derived security summary, e.g. `auto+tls+ws` or `aes-128-gcm`
    ///
    /// Display-only: never parsed back, never fingerprinted.
    pub fn security_summary(&self) -> String {
        fn with_net(mut scy: String, net: &str) -> String {
            if !net.is_empty() {
                scy.push('+');
                scy.push_str(net);
            }
            scy
        }

        match self {
            Payload::Vmess(p) => {
                let mut scy = p.scy.clone();
                if p.tls {
                    scy.push_str("+tls");
                }
                with_net(scy, &p.net)
            }
            Payload::Vless(p) => with_net(p.scy.clone(), &p.net),
            Payload::Shadowsocks(p) => p.scy.clone(),
            Payload::Trojan(p) => with_net(p.scy.clone(), &p.net),
        }
    }

    /// Resolves the legacy `tcp` network alias to `raw`
    ///
    /// Must run before the fingerprint is computed so that `net=tcp` and
    /// `net=raw` links collide.
    pub fn normalize(&mut self) {
        match self {
            Payload::Vmess(p) => {
                if p.net == "tcp" {
                    p.net = "raw".to_string();
                }
            }
            Payload::Vless(p) => {
                if p.net == "tcp" {
                    p.net = "raw".to_string();
                }
            }
            Payload::Shadowsocks(_) | Payload::Trojan(_) => {}
        }
    }
}

// ============================================================================
// Record
// ============================================================================

/// One proxy server entry in the persisted list
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Opaque unique token, generated at creation and never recomputed.
    /// A stable UI key, not a content identity.
    pub id: String,
    /// Display name, at most [`MAX_DISPLAY_NAME_CHARS`] characters
    pub ps: String,
    /// Activation flag (0 = inactive)
    #[serde(default)]
    pub on: u8,
    /// Derived `address:port` summary
    pub host: String,
    /// Derived security summary
    pub scy: String,
    /// Content fingerprint over the normalized payload, the dedup identity
    pub hash: String,
    /// Protocol-tagged connection parameters
    #[serde(flatten)]
    pub payload: Payload,
}

impl Record {
    /// Returns the protocol tag of this record
    pub fn protocol(&self) -> Protocol {
        self.payload.protocol()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Generates an opaque unique id: millisecond timestamp mixed with a random
/// salt, rendered in base 36.
pub fn generate_unique_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let salt: u128 = rand::rng().random_range(0..10_000);
    to_base36(millis * 10_000 + salt)
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Truncates a display name to [`MAX_DISPLAY_NAME_CHARS`] characters
pub fn truncate_display_name(name: &str) -> String {
    name.chars().take(MAX_DISPLAY_NAME_CHARS).collect()
}

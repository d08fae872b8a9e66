//! Protocol link codecs
//!
//! One codec per share-link protocol, behind a uniform trait covering the
//! four conversion paths: decode a URI (inline or legacy base64-JSON form),
//! decode a subscription-feed server object, encode a canonical URI, and
//! encode a legacy base64-JSON URI.

mod shadowsocks;
mod trojan;
mod vless;
mod vmess;

pub use shadowsocks::ShadowsocksCodec;
pub use trojan::TrojanCodec;
pub use vless::VlessCodec;
pub use vmess::VmessCodec;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde_json::Value;
use tracing::debug;

use crate::record::Payload;

// ============================================================================
// Link Codec Trait
// ============================================================================

/// A decoded link: the raw display fragment plus the protocol payload.
///
/// `ps` is the untouched fragment (or legacy `ps` field); URL-decoding,
/// truncation and fallback naming happen centrally when the record is built.
#[derive(Debug, Clone)]
pub struct DecodedLink {
    pub ps: String,
    pub payload: Payload,
}

/// Trait for converting one protocol between its link forms and the payload
pub trait LinkCodec: Send + Sync {
    /// Returns the URI scheme this codec handles (e.g., "ss", "vmess")
    fn scheme(&self) -> &'static str;

    /// Decodes a share URI, inline or legacy base64-JSON form
    fn decode(&self, uri: &str) -> Result<DecodedLink>;

    /// Decodes one server object from a clash-like JSON feed
    fn decode_feed(&self, server: &Value) -> Result<DecodedLink>;

    /// Encodes the canonical inline URI form
    fn encode(&self, payload: &Payload, ps: &str) -> Result<String>;

    /// Encodes the legacy base64-JSON URI form
    fn encode_legacy(&self, payload: &Payload, ps: &str) -> Result<String>;

    /// Checks if this codec can handle the given URI
    fn can_parse(&self, uri: &str) -> bool {
        uri.starts_with(&format!("{}://", self.scheme()))
    }
}

// ============================================================================
// Codec Registry
// ============================================================================

/// Registry of link codecs with dynamic dispatch
#[derive(Default, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn LinkCodec>>,
}

impl CodecRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Creates a registry with all built-in codecs registered
    pub fn with_builtin_codecs() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VmessCodec));
        registry.register(Arc::new(VlessCodec));
        registry.register(Arc::new(ShadowsocksCodec));
        registry.register(Arc::new(TrojanCodec));
        registry
    }

    /// Registers a link codec
    pub fn register(&mut self, codec: Arc<dyn LinkCodec>) {
        self.codecs.insert(codec.scheme().to_string(), codec);
    }

    /// Gets a codec for the given scheme
    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn LinkCodec>> {
        self.codecs.get(scheme)
    }

    /// Decodes a URI using the codec registered for its scheme
    pub fn decode_uri(&self, uri: &str) -> Result<DecodedLink> {
        let scheme = extract_scheme(uri)?;
        debug!("Decoding URI with scheme '{}'", scheme);

        let codec = self
            .codecs
            .get(scheme)
            .ok_or_else(|| anyhow!("No codec registered for scheme: {}", scheme))?;

        codec.decode(uri)
    }

    /// Encodes a payload through the codec for its protocol
    pub fn encode(&self, payload: &Payload, ps: &str) -> Result<String> {
        let scheme = payload.protocol().scheme();
        let codec = self
            .codecs
            .get(scheme)
            .ok_or_else(|| anyhow!("No codec registered for scheme: {}", scheme))?;
        codec.encode(payload, ps)
    }

    /// Encodes a payload into the legacy base64-JSON form
    pub fn encode_legacy(&self, payload: &Payload, ps: &str) -> Result<String> {
        let scheme = payload.protocol().scheme();
        let codec = self
            .codecs
            .get(scheme)
            .ok_or_else(|| anyhow!("No codec registered for scheme: {}", scheme))?;
        codec.encode_legacy(payload, ps)
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Extracts the scheme from a URI
pub fn extract_scheme(uri: &str) -> Result<&str> {
    if !uri.contains("://") {
        anyhow::bail!("Invalid URI: missing scheme separator ://");
    }
    uri.split("://")
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("Invalid URI: missing scheme"))
}

/// Returns the URI body after `scheme://`
pub fn strip_scheme<'a>(uri: &'a str, scheme: &str) -> Result<&'a str> {
    let prefix = format!("{}://", scheme);
    uri.strip_prefix(&prefix)
        .ok_or_else(|| anyhow!("URI does not start with {}", prefix))
}

/// Splits a URI body into (rest, fragment); the fragment is returned raw.
pub fn split_fragment(body: &str) -> (&str, &str) {
    match body.split_once('#') {
        Some((rest, frag)) => (rest, frag),
        None => (body, ""),
    }
}

/// Returns true when the body uses the inline authority form.
///
/// A `@` before any fragment marks `userinfo@host:port`; without one the
/// body is legacy base64 JSON.
pub fn has_authority(body: &str) -> bool {
    let (rest, _) = split_fragment(body);
    rest.contains('@')
}

/// Parses a query string into a map; the first occurrence of a key wins,
/// matching how `||` alias chains read repeated parameters.
pub fn query_map(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        params.entry(key.to_string()).or_insert_with(|| {
            urlencoding::decode(value)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| value.to_string())
        });
    }
    params
}

/// Resolves an ordered alias chain against parsed query parameters.
///
/// Empty values are skipped, so `path=&sni=x` resolves to `x` just as the
/// `path || sni` chain would.
pub fn pick(params: &HashMap<String, String>, aliases: &[&str], default: &str) -> String {
    for key in aliases {
        if let Some(value) = params.get(*key)
            && !value.is_empty()
        {
            return value.clone();
        }
    }
    default.to_string()
}

/// Percent-decodes a string, returning the input unchanged when it is not
/// valid percent-encoding.
pub fn safe_decode_uri(input: &str) -> String {
    urlencoding::decode(input)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| input.to_string())
}

/// Recursively percent-decodes every string inside a JSON value.
pub fn deep_decode(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(safe_decode_uri(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(deep_decode).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, deep_decode(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Parses a `host:port` string, handling IPv6 addresses in brackets.
///
/// An unparsable port coerces to 0 rather than failing, matching how feed
/// ports are read.
pub fn parse_host_port(hostport: &str) -> Result<(String, u16)> {
    if hostport.starts_with('[') {
        let bracket_end = hostport
            .find(']')
            .ok_or_else(|| anyhow!("Invalid IPv6 address: missing closing bracket"))?;

        let host = hostport[1..bracket_end].to_string();
        let port = hostport
            .get(bracket_end + 2..)
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);
        return Ok((host, port));
    }

    let colon_pos = hostport
        .rfind(':')
        .ok_or_else(|| anyhow!("Invalid host:port format: missing colon"))?;

    let host = hostport[..colon_pos].to_string();
    let port = hostport[colon_pos + 1..].parse().unwrap_or(0);

    Ok((host, port))
}

// ----------------------------------------------------------------------------
// URI assembly
// ----------------------------------------------------------------------------

/// Appends a query parameter, skipping empty values.
pub fn push_param(query: &mut Vec<(String, String)>, key: &str, value: &str) {
    if !value.is_empty() {
        query.push((key.to_string(), value.to_string()));
    }
}

/// Assembles an inline-form URI from its parts; the query values and the
/// fragment are percent-encoded.
pub fn build_uri(
    scheme: &str,
    userinfo: &str,
    host: &str,
    port: u16,
    query: &[(String, String)],
    fragment: &str,
) -> String {
    let host_part = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };

    let mut uri = format!("{}://{}@{}:{}", scheme, userinfo, host_part, port);

    if !query.is_empty() {
        let rendered: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        uri.push('?');
        uri.push_str(&rendered.join("&"));
    }

    if !fragment.is_empty() {
        uri.push('#');
        uri.push_str(&urlencoding::encode(fragment));
    }

    uri
}

// ----------------------------------------------------------------------------
// Legacy JSON helpers
// ----------------------------------------------------------------------------

/// Drops falsy fields (null, empty string, false, zero) from a JSON object,
/// the pruning other clients apply before base64-encoding legacy links.
pub fn clean_data(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !is_falsy(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

/// Reads a string field from a JSON object, following an alias chain and
/// coercing numbers to their decimal form.
pub fn json_str(obj: &Value, aliases: &[&str], default: &str) -> String {
    for key in aliases {
        match obj.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    default.to_string()
}

/// Reads a port field tolerantly: numbers and numeric strings both work,
/// anything else coerces to 0.
pub fn json_port(obj: &Value, aliases: &[&str]) -> u16 {
    for key in aliases {
        match obj.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(port) = n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                    return port;
                }
            }
            Some(Value::String(s)) => {
                if let Ok(port) = s.trim().parse::<u16>() {
                    return port;
                }
            }
            _ => {}
        }
    }
    0
}

/// JavaScript-style truthiness for feed fields: absent, null, false, 0, ""
/// and "false"/"0"/"none" strings all read as false.
pub fn json_truthy(obj: &Value, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::String(s)) => !s.is_empty() && s != "false" && s != "0" && s != "none",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_with_builtin_codecs() {
        let registry = CodecRegistry::with_builtin_codecs();
        assert!(registry.get("vmess").is_some());
        assert!(registry.get("vless").is_some());
        assert!(registry.get("ss").is_some());
        assert!(registry.get("trojan").is_some());
        assert!(registry.get("hysteria2").is_none());
    }

    #[test]
    fn test_decode_uri_unknown_scheme() {
        let registry = CodecRegistry::with_builtin_codecs();
        assert!(registry.decode_uri("tuic://whatever").is_err());
    }

    #[test]
    fn test_extract_scheme() {
        assert_eq!(extract_scheme("ss://abc").unwrap(), "ss");
        assert!(extract_scheme("no-separator").is_err());
        assert!(extract_scheme("://empty").is_err());
    }

    #[test]
    fn test_has_authority() {
        assert!(has_authority("uuid@host:443?type=ws"));
        assert!(!has_authority("eyJhZGQiOiJ4In0="));
        // `@` only inside the fragment does not make an authority form
        assert!(!has_authority("eyJhZGQiOiJ4In0=#name@home"));
    }

    #[test]
    fn test_query_map_first_wins() {
        let params = query_map("path=%2Fws&path=/other&empty=");
        assert_eq!(params.get("path").map(String::as_str), Some("/ws"));
        assert_eq!(params.get("empty").map(String::as_str), Some(""));
    }

    #[test]
    fn test_pick_skips_empty() {
        let params = query_map("path=&sni=example.com");
        assert_eq!(pick(&params, &["path", "sni"], ""), "example.com");
        assert_eq!(pick(&params, &["missing"], "fallback"), "fallback");
    }

    #[test]
    fn test_build_uri_encodes_fragment_and_values() {
        let mut query = Vec::new();
        push_param(&mut query, "path", "/ws path");
        push_param(&mut query, "empty", "");
        let uri = build_uri("trojan", "pwd", "example.com", 443, &query, "my node");
        assert_eq!(uri, "trojan://pwd@example.com:443?path=%2Fws%20path#my%20node");
    }

    #[test]
    fn test_build_uri_ipv6_brackets() {
        let uri = build_uri("vless", "uuid", "2001:db8::1", 443, &[], "");
        assert_eq!(uri, "vless://uuid@[2001:db8::1]:443");
    }

    #[test]
    fn test_clean_data_drops_falsy() {
        let value = serde_json::json!({
            "add": "host", "port": 0, "tls": false, "path": "", "aid": "0"
        });
        let cleaned = clean_data(value);
        let obj = cleaned.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj.contains_key("add"));
        // the string "0" is truthy
        assert!(obj.contains_key("aid"));
    }

    #[test]
    fn test_json_port_tolerates_strings() {
        let obj = serde_json::json!({"port": "8443"});
        assert_eq!(json_port(&obj, &["port"]), 8443);
        let obj = serde_json::json!({"port": 443});
        assert_eq!(json_port(&obj, &["port"]), 443);
        let obj = serde_json::json!({"port": "junk"});
        assert_eq!(json_port(&obj, &["port"]), 0);
        let obj = serde_json::json!({"port": 70000});
        assert_eq!(json_port(&obj, &["port"]), 0);
    }

    #[test]
    fn test_json_truthy() {
        let obj = serde_json::json!({
            "a": true, "b": "tls", "c": "", "d": "none", "e": 0, "f": 1
        });
        assert!(json_truthy(&obj, "a"));
        assert!(json_truthy(&obj, "b"));
        assert!(!json_truthy(&obj, "c"));
        assert!(!json_truthy(&obj, "d"));
        assert!(!json_truthy(&obj, "e"));
        assert!(json_truthy(&obj, "f"));
        assert!(!json_truthy(&obj, "missing"));
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(
            parse_host_port("example.com:8080").unwrap(),
            ("example.com".to_string(), 8080)
        );
        assert_eq!(
            parse_host_port("[2001:db8::1]:443").unwrap(),
            ("2001:db8::1".to_string(), 443)
        );
        assert_eq!(
            parse_host_port("example.com:junk").unwrap(),
            ("example.com".to_string(), 0)
        );
        assert!(parse_host_port("no-port").is_err());
        assert!(parse_host_port("[::1:443").is_err());
    }

    #[test]
    fn test_deep_decode() {
        let value = serde_json::json!({
            "path": "%2Fws",
            "nested": {"host": "a%2Eb"},
            "list": ["x%20y"],
            "port": 443
        });
        let decoded = deep_decode(value);
        assert_eq!(decoded["path"], "/ws");
        assert_eq!(decoded["nested"]["host"], "a.b");
        assert_eq!(decoded["list"][0], "x y");
        assert_eq!(decoded["port"], 443);
    }
}

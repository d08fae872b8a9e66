//! VLESS link codec
//!
//! Inline form `vless://uuid@host:port?…#name` plus the rarer base64-JSON
//! legacy form. The `path` field doubles as SNI, gRPC service name and
//! reality server name, resolved through the alias chain on ingest. Reality
//! parameters (`pbk`, `sid`, `spx`) and the xhttp `extra` blob ride along;
//! `extra` is base64 on the wire and stored as JSON text.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{Value, json};
use url::Url;

use crate::codec::base64::{decode_base64_text, encode_base64};
use crate::codec::protocols::{
    DecodedLink, LinkCodec, build_uri, clean_data, has_authority, json_port, json_str, pick,
    push_param, query_map, split_fragment, strip_scheme,
};
use crate::record::{Payload, VlessPayload};

pub struct VlessCodec;

impl LinkCodec for VlessCodec {
    fn scheme(&self) -> &'static str {
        "vless"
    }

    fn decode(&self, uri: &str) -> Result<DecodedLink> {
        let body = strip_scheme(uri, self.scheme())?;
        if has_authority(body) {
            decode_inline(uri)
        } else {
            decode_legacy(body)
        }
    }

    fn decode_feed(&self, server: &Value) -> Result<DecodedLink> {
        let payload = VlessPayload {
            add: json_str(server, &["server", "add"], ""),
            port: json_port(server, &["port"]),
            id: json_str(server, &["uuid", "id"], ""),
            net: json_str(server, &["network", "net"], "raw"),
            scy: json_str(server, &["cipher", "scy"], "none"),
            host: json_str(server, &["host"], ""),
            path: json_str(server, &["path"], ""),
            mode: json_str(server, &["mode"], ""),
            extra: json_str(server, &["extra"], ""),
            alpn: json_str(server, &["alpn"], ""),
            fp: json_str(server, &["fp"], ""),
            flow: json_str(server, &["flow"], ""),
            pbk: json_str(server, &["pbk"], ""),
            sid: json_str(server, &["sid"], ""),
            spx: json_str(server, &["spx"], ""),
        };

        Ok(DecodedLink {
            ps: json_str(server, &["name", "ps"], ""),
            payload: Payload::Vless(payload),
        })
    }

    fn encode(&self, payload: &Payload, ps: &str) -> Result<String> {
        let p = expect_vless(payload)?;

        let mut query = Vec::new();
        push_param(&mut query, "encryption", "none");
        push_param(&mut query, "security", &p.scy);
        push_param(&mut query, "type", &p.net);
        push_param(&mut query, "host", &p.host);
        push_param(&mut query, "path", &p.path);
        push_param(&mut query, "mode", &p.mode);
        if !p.extra.is_empty() {
            push_param(&mut query, "extra", &encode_base64(&p.extra));
        }
        if !p.scy.is_empty() && p.scy != "none" {
            push_param(&mut query, "alpn", &p.alpn);
            push_param(&mut query, "fp", &p.fp);
        }
        push_param(&mut query, "flow", &p.flow);
        push_param(&mut query, "pbk", &p.pbk);
        push_param(&mut query, "sid", &p.sid);
        push_param(&mut query, "spx", &p.spx);

        Ok(build_uri("vless", &p.id, &p.add, p.port, &query, ps))
    }

    fn encode_legacy(&self, payload: &Payload, ps: &str) -> Result<String> {
        let p = expect_vless(payload)?;

        let fields = json!({
            "ps": ps,
            "add": p.add,
            "port": p.port,
            "id": p.id,
            "net": p.net,
            "scy": p.scy,
            "host": p.host,
            "path": p.path,
            "mode": p.mode,
            "extra": p.extra,
            "alpn": p.alpn,
            "fp": p.fp,
            "flow": p.flow,
            "pbk": p.pbk,
            "sid": p.sid,
            "spx": p.spx,
        });

        let cleaned = clean_data(fields);
        let text = serde_json::to_string(&cleaned)?;
        Ok(format!("vless://{}", encode_base64(text)))
    }
}

fn decode_inline(uri: &str) -> Result<DecodedLink> {
    let (id, add, port) = match parse_authority(uri) {
        Some(parts) => parts,
        // userinfo with characters the strict parser rejects
        None => parse_authority_fallback(uri)
            .context("Invalid vless URI: unparsable authority")?,
    };

    let (rest, fragment) = split_fragment(strip_scheme(uri, "vless")?);
    let query = rest.split_once('?').map(|(_, q)| q).unwrap_or("");
    let params = query_map(query);

    let extra_raw = pick(&params, &["extra"], "");
    let extra = if extra_raw.is_empty() {
        String::new()
    } else {
        decode_base64_text(&extra_raw).unwrap_or(extra_raw)
    };

    let payload = VlessPayload {
        add,
        port,
        id,
        net: pick(&params, &["net", "type"], "raw"),
        scy: pick(&params, &["scy", "security"], "none"),
        host: pick(&params, &["host"], ""),
        path: pick(&params, &["path", "sni", "serviceName"], ""),
        mode: pick(&params, &["mode"], ""),
        extra,
        alpn: pick(&params, &["alpn"], ""),
        fp: pick(&params, &["fp", "fingerprint"], "chrome"),
        flow: pick(&params, &["flow"], ""),
        pbk: pick(&params, &["pbk"], ""),
        sid: pick(&params, &["sid"], ""),
        spx: pick(&params, &["spx"], ""),
    };

    Ok(DecodedLink {
        ps: fragment.to_string(),
        payload: Payload::Vless(payload),
    })
}

fn parse_authority(uri: &str) -> Option<(String, String, u16)> {
    let url = Url::parse(uri).ok()?;
    let host = url.host_str()?;
    if url.username().is_empty() {
        return None;
    }
    Some((
        url.username().to_string(),
        host.trim_matches(['[', ']']).to_string(),
        url.port().unwrap_or(0),
    ))
}

fn parse_authority_fallback(uri: &str) -> Option<(String, String, u16)> {
    static AUTHORITY: OnceLock<Regex> = OnceLock::new();
    let re = AUTHORITY.get_or_init(|| {
        Regex::new(r"^vless://([^@]+)@(\[[^\]]+\]|[^:/?#]+):(\d+)").expect("hard-coded regex")
    });

    let caps = re.captures(uri)?;
    let add = caps[2].trim_matches(['[', ']']).to_string();
    let port = caps[3].parse().unwrap_or(0);
    Some((caps[1].to_string(), add, port))
}

fn decode_legacy(body: &str) -> Result<DecodedLink> {
    let (encoded, fragment) = split_fragment(body);
    let text = decode_base64_text(encoded).context("Invalid vless base64 payload")?;
    let fields: Value =
        serde_json::from_str(&text).context("Invalid JSON in vless payload")?;

    let payload = VlessPayload {
        add: json_str(&fields, &["add"], ""),
        port: json_port(&fields, &["port"]),
        id: json_str(&fields, &["id"], ""),
        net: json_str(&fields, &["net"], "raw"),
        scy: json_str(&fields, &["scy", "security"], "none"),
        host: json_str(&fields, &["host"], ""),
        path: json_str(&fields, &["path"], ""),
        mode: json_str(&fields, &["mode"], ""),
        extra: json_str(&fields, &["extra"], ""),
        alpn: json_str(&fields, &["alpn"], ""),
        fp: json_str(&fields, &["fp"], ""),
        flow: json_str(&fields, &["flow"], ""),
        pbk: json_str(&fields, &["pbk"], ""),
        sid: json_str(&fields, &["sid"], ""),
        spx: json_str(&fields, &["spx"], ""),
    };

    let ps = if fragment.is_empty() {
        json_str(&fields, &["ps"], "")
    } else {
        fragment.to_string()
    };

    Ok(DecodedLink {
        ps,
        payload: Payload::Vless(payload),
    })
}

fn expect_vless(payload: &Payload) -> Result<&VlessPayload> {
    match payload {
        Payload::Vless(p) => Ok(p),
        other => anyhow::bail!("Expected vless payload, got {}", other.protocol()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> VlessCodec {
        VlessCodec
    }

    #[test]
    fn test_decode_inline_reality() {
        let link = codec()
            .decode("vless://uuid@example.com:443?security=reality&type=raw&flow=xtls-rprx-vision&pbk=pubkey&sid=0123ab&sni=real.example#Reality")
            .unwrap();
        assert_eq!(link.ps, "Reality");
        let Payload::Vless(p) = link.payload else {
            panic!("expected vless");
        };
        assert_eq!(p.scy, "reality");
        assert_eq!(p.flow, "xtls-rprx-vision");
        assert_eq!(p.pbk, "pubkey");
        assert_eq!(p.sid, "0123ab");
        // sni lands in the path field
        assert_eq!(p.path, "real.example");
        assert_eq!(p.fp, "chrome");
    }

    #[test]
    fn test_decode_inline_defaults() {
        let link = codec().decode("vless://uuid@example.com:8080").unwrap();
        let Payload::Vless(p) = link.payload else {
            panic!("expected vless");
        };
        assert_eq!(p.net, "raw");
        assert_eq!(p.scy, "none");
        assert_eq!(p.port, 8080);
    }

    #[test]
    fn test_decode_inline_prefers_short_keys() {
        // when both spellings appear, `net` and `scy` win
        let link = codec()
            .decode("vless://uuid@example.com:443?net=grpc&type=ws&scy=reality&security=tls")
            .unwrap();
        let Payload::Vless(p) = link.payload else {
            panic!("expected vless");
        };
        assert_eq!(p.net, "grpc");
        assert_eq!(p.scy, "reality");
    }

    #[test]
    fn test_decode_feed_flat_keys() {
        let server = json!({
            "type": "vless",
            "name": "Feed",
            "server": "example.com",
            "port": 443,
            "uuid": "uuid",
            "network": "ws",
            "cipher": "tls",
            "host": "cdn.example",
            "path": "/ws",
            "flow": "xtls-rprx-vision"
        });
        let link = codec().decode_feed(&server).unwrap();
        assert_eq!(link.ps, "Feed");
        let Payload::Vless(p) = link.payload else {
            panic!("expected vless");
        };
        assert_eq!(p.scy, "tls");
        assert_eq!(p.host, "cdn.example");
        assert_eq!(p.path, "/ws");
        assert_eq!(p.flow, "xtls-rprx-vision");
        assert_eq!(p.fp, "");
    }

    #[test]
    fn test_decode_inline_ipv6() {
        let link = codec().decode("vless://uuid@[2001:db8::1]:443#v6").unwrap();
        let Payload::Vless(p) = link.payload else {
            panic!("expected vless");
        };
        assert_eq!(p.add, "2001:db8::1");
        assert_eq!(p.port, 443);
    }

    #[test]
    fn test_authority_fallback_regex() {
        let parsed = parse_authority_fallback("vless://us%7Cer@example.com:443?type=ws");
        let (id, add, port) = parsed.unwrap();
        assert_eq!(id, "us%7Cer");
        assert_eq!(add, "example.com");
        assert_eq!(port, 443);
    }

    #[test]
    fn test_decode_inline_extra_base64() {
        let extra_json = r#"{"scMaxEachPostBytes":1000000}"#;
        let uri = format!(
            "vless://uuid@example.com:443?type=xhttp&extra={}",
            urlencoding::encode(&encode_base64(extra_json))
        );
        let link = codec().decode(&uri).unwrap();
        let Payload::Vless(p) = link.payload else {
            panic!("expected vless");
        };
        assert_eq!(p.extra, extra_json);
    }

    #[test]
    fn test_decode_legacy() {
        let json = r#"{"ps":"Legacy","add":"example.com","port":443,"id":"uuid","net":"grpc","scy":"tls","path":"svc"}"#;
        let uri = format!("vless://{}", encode_base64(json));
        let link = codec().decode(&uri).unwrap();
        assert_eq!(link.ps, "Legacy");
        let Payload::Vless(p) = link.payload else {
            panic!("expected vless");
        };
        assert_eq!(p.net, "grpc");
        assert_eq!(p.path, "svc");
        // legacy path leaves the fingerprint empty
        assert_eq!(p.fp, "");
    }

    #[test]
    fn test_encode_round_trip() {
        let payload = Payload::Vless(VlessPayload {
            add: "example.com".to_string(),
            port: 443,
            id: "uuid".to_string(),
            net: "ws".to_string(),
            scy: "tls".to_string(),
            host: "cdn.example".to_string(),
            path: "/ws".to_string(),
            alpn: "h2".to_string(),
            fp: "chrome".to_string(),
            flow: "xtls-rprx-vision".to_string(),
            ..Default::default()
        });
        let uri = codec().encode(&payload, "Node").unwrap();
        let link = codec().decode(&uri).unwrap();
        assert_eq!(link.ps, "Node");
        assert_eq!(link.payload, payload);
    }

    #[test]
    fn test_encode_gates_tls_fields_on_security() {
        let payload = Payload::Vless(VlessPayload {
            add: "example.com".to_string(),
            port: 80,
            id: "uuid".to_string(),
            net: "raw".to_string(),
            scy: "none".to_string(),
            alpn: "h2".to_string(),
            fp: "chrome".to_string(),
            ..Default::default()
        });
        let uri = codec().encode(&payload, "").unwrap();
        assert!(!uri.contains("alpn"));
        assert!(!uri.contains("fp="));
    }

    #[test]
    fn test_encode_extra_round_trip() {
        let payload = Payload::Vless(VlessPayload {
            add: "example.com".to_string(),
            port: 443,
            id: "uuid".to_string(),
            net: "xhttp".to_string(),
            scy: "none".to_string(),
            extra: r#"{"k":"v"}"#.to_string(),
            ..Default::default()
        });
        let uri = codec().encode(&payload, "").unwrap();
        assert!(uri.contains("extra="));
        let link = codec().decode(&uri).unwrap();
        let Payload::Vless(p) = link.payload else {
            panic!("expected vless");
        };
        assert_eq!(p.extra, r#"{"k":"v"}"#);
    }
}

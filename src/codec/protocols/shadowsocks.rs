//! Shadowsocks link codec
//!
//! Inline form `ss://<base64 "method:password">@host:port#name`, with the
//! whole-body legacy forms `ss://<base64 "method:password@host:port">` and
//! `ss://<base64 JSON>` still accepted on ingest.

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

use crate::codec::base64::{decode_base64_text, encode_base64};
use crate::codec::protocols::{
    DecodedLink, LinkCodec, build_uri, clean_data, has_authority, json_port, json_str,
    parse_host_port, safe_decode_uri, split_fragment, strip_scheme,
};
use crate::record::{Payload, SsPayload};

pub struct ShadowsocksCodec;

impl LinkCodec for ShadowsocksCodec {
    fn scheme(&self) -> &'static str {
        "ss"
    }

    fn decode(&self, uri: &str) -> Result<DecodedLink> {
        let body = strip_scheme(uri, self.scheme())?;
        if has_authority(body) {
            decode_inline(body)
        } else {
            decode_legacy(body)
        }
    }

    fn decode_feed(&self, server: &Value) -> Result<DecodedLink> {
        let payload = SsPayload {
            add: json_str(server, &["server", "add"], ""),
            port: json_port(server, &["port"]),
            pwd: json_str(server, &["password", "pwd"], ""),
            scy: json_str(server, &["cipher", "scy", "method"], ""),
        };

        Ok(DecodedLink {
            ps: json_str(server, &["name", "ps"], ""),
            payload: Payload::Shadowsocks(payload),
        })
    }

    fn encode(&self, payload: &Payload, ps: &str) -> Result<String> {
        let p = expect_ss(payload)?;

        let userinfo = encode_base64(format!("{}:{}", p.scy, p.pwd));
        let userinfo = urlencoding::encode(&userinfo).into_owned();
        Ok(build_uri("ss", &userinfo, &p.add, p.port, &[], ps))
    }

    fn encode_legacy(&self, payload: &Payload, ps: &str) -> Result<String> {
        let p = expect_ss(payload)?;

        let fields = json!({
            "ps": ps,
            "add": p.add,
            "port": p.port,
            "pwd": p.pwd,
            "scy": p.scy,
        });

        let cleaned = clean_data(fields);
        let text = serde_json::to_string(&cleaned)?;
        Ok(format!("ss://{}", encode_base64(text)))
    }
}

fn decode_inline(body: &str) -> Result<DecodedLink> {
    let (rest, fragment) = split_fragment(body);
    let (userinfo, hostport) = rest
        .rsplit_once('@')
        .context("Missing @ in ss URI")?;

    let (scy, pwd) = split_userinfo(userinfo)?;
    let (add, port) = parse_host_port(hostport)?;

    Ok(DecodedLink {
        ps: fragment.to_string(),
        payload: Payload::Shadowsocks(SsPayload {
            add,
            port,
            pwd,
            scy,
        }),
    })
}

/// Decodes `base64("method:password")` userinfo, accepting the plain
/// unencoded form some producers emit.
fn split_userinfo(userinfo: &str) -> Result<(String, String)> {
    let decoded = safe_decode_uri(userinfo);
    let text = decode_base64_text(&decoded).unwrap_or(decoded);
    match text.split_once(':') {
        Some((method, password)) => Ok((method.to_string(), password.to_string())),
        None => bail!("Invalid ss userinfo: missing method:password separator"),
    }
}

fn decode_legacy(body: &str) -> Result<DecodedLink> {
    let (encoded, fragment) = split_fragment(body);
    let text = decode_base64_text(encoded).context("Invalid ss base64 payload")?;

    if text.trim_start().starts_with('{') {
        let fields: Value =
            serde_json::from_str(&text).context("Invalid JSON in ss payload")?;
        let payload = SsPayload {
            add: json_str(&fields, &["add"], ""),
            port: json_port(&fields, &["port"]),
            pwd: json_str(&fields, &["pwd", "password"], ""),
            scy: json_str(&fields, &["scy", "method", "cipher"], ""),
        };
        let ps = if fragment.is_empty() {
            json_str(&fields, &["ps"], "")
        } else {
            fragment.to_string()
        };
        return Ok(DecodedLink {
            ps,
            payload: Payload::Shadowsocks(payload),
        });
    }

    // whole-body form: method:password@host:port
    let (userinfo, hostport) = text
        .rsplit_once('@')
        .context("Invalid ss payload: missing @")?;
    let (scy, pwd) = userinfo
        .split_once(':')
        .map(|(m, p)| (m.to_string(), p.to_string()))
        .context("Invalid ss payload: missing method:password separator")?;
    let (add, port) = parse_host_port(hostport)?;

    Ok(DecodedLink {
        ps: fragment.to_string(),
        payload: Payload::Shadowsocks(SsPayload {
            add,
            port,
            pwd,
            scy,
        }),
    })
}

fn expect_ss(payload: &Payload) -> Result<&SsPayload> {
    match payload {
        Payload::Shadowsocks(p) => Ok(p),
        other => anyhow::bail!("Expected ss payload, got {}", other.protocol()),
    }
}

//! VMess link codec
//!
//! Handles both link forms found in the wild: the inline authority form
//! `vmess://uuid@host:port?…#name` and the older base64-JSON form
//! `vmess://<base64 of {"v":"2","ps":…,"add":…,…}>`. The inline form reads
//! its parameters through alias chains because producers disagree on key
//! names (`scy` vs `security` vs `encryption`, `path` vs `sni`, and so on).

use anyhow::{Context, Result};
use serde_json::{Value, json};
use url::Url;

use crate::codec::base64::{decode_base64_text, encode_base64};
use crate::codec::protocols::{
    DecodedLink, LinkCodec, build_uri, clean_data, has_authority, json_port, json_str,
    json_truthy, pick, push_param, query_map, split_fragment, strip_scheme,
};
use crate::record::{Payload, VmessPayload};

pub struct VmessCodec;

impl LinkCodec for VmessCodec {
    fn scheme(&self) -> &'static str {
        "vmess"
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
        let ws_opts = server.get("ws-opts").cloned().unwrap_or(Value::Null);

        // same defaults as the URI paths so the two ingest routes agree
        let payload = VmessPayload {
            add: json_str(server, &["server", "add"], ""),
            port: json_port(server, &["port"]),
            id: json_str(server, &["uuid", "id"], ""),
            aid: json_str(server, &["alterId", "aid"], "0"),
            net: json_str(server, &["network", "net"], "raw"),
            scy: json_str(server, &["cipher", "scy"], "auto"),
            host: json_str(&ws_opts, &["host"], ""),
            path: json_str(&ws_opts, &["path"], ""),
            header_type: String::new(),
            mode: json_str(server, &["mode"], ""),
            tls: json_truthy(server, "tls"),
            alpn: json_str(server, &["alpn"], ""),
            fp: json_str(server, &["fp"], "chrome"),
        };

        Ok(DecodedLink {
            ps: json_str(server, &["name", "ps"], ""),
            payload: Payload::Vmess(payload),
        })
    }

    fn encode(&self, payload: &Payload, ps: &str) -> Result<String> {
        let p = expect_vmess(payload)?;

        let mut query = Vec::new();
        push_param(&mut query, "aid", &p.aid);
        push_param(&mut query, "net", &p.net);
        push_param(&mut query, "scy", &p.scy);
        push_param(&mut query, "host", &p.host);
        push_param(&mut query, "path", &p.path);
        push_param(&mut query, "type", &p.header_type);
        push_param(&mut query, "mode", &p.mode);
        if p.tls {
            push_param(&mut query, "tls", "tls");
            push_param(&mut query, "alpn", &p.alpn);
            push_param(&mut query, "fp", &p.fp);
        }

        Ok(build_uri("vmess", &p.id, &p.add, p.port, &query, ps))
    }

    fn encode_legacy(&self, payload: &Payload, ps: &str) -> Result<String> {
        let p = expect_vmess(payload)?;

        let mut fields = json!({
            "v": "2",
            "ps": ps,
            "add": p.add,
            "port": p.port,
            "id": p.id,
            "aid": p.aid,
            "net": p.net,
            "scy": p.scy,
            "host": p.host,
            "path": p.path,
            "type": p.header_type,
            "mode": p.mode,
        });
        if p.tls {
            // legacy links carry TLS as the string "tls"
            fields["tls"] = Value::String("tls".to_string());
            fields["alpn"] = Value::String(p.alpn.clone());
            fields["fp"] = Value::String(p.fp.clone());
        }

        let cleaned = clean_data(fields);
        let text = serde_json::to_string(&cleaned)?;
        Ok(format!("vmess://{}", encode_base64(text)))
    }
}

fn decode_inline(uri: &str) -> Result<DecodedLink> {
    let url = Url::parse(uri).context("Invalid vmess URI")?;

    let host = url.host_str().context("Missing host in vmess URI")?;
    let params = query_map(url.query().unwrap_or(""));

    let tls_param = pick(&params, &["tls"], "");
    let security = pick(&params, &["security"], "");

    let mut payload = VmessPayload {
        add: host.trim_matches(['[', ']']).to_string(),
        port: url.port().unwrap_or(0),
        id: url.username().to_string(),
        aid: pick(&params, &["aid", "alterId"], "0"),
        net: pick(&params, &["net", "type"], "raw"),
        scy: pick(&params, &["scy", "security", "enc", "encryption"], "auto"),
        host: pick(&params, &["host"], ""),
        path: pick(&params, &["path", "sni", "serviceName", "seed"], ""),
        header_type: pick(&params, &["type", "headerType"], ""),
        mode: pick(&params, &["mode"], ""),
        tls: tls_param == "tls" || security == "tls",
        alpn: pick(&params, &["alpn"], ""),
        fp: pick(&params, &["fp", "fingerprint"], "chrome"),
    };

    // `security=tls` marks the TLS flag, not the cipher
    if payload.scy == "tls" {
        payload.scy = "auto".to_string();
    }

    Ok(DecodedLink {
        ps: url.fragment().unwrap_or("").to_string(),
        payload: Payload::Vmess(payload),
    })
}

fn decode_legacy(body: &str) -> Result<DecodedLink> {
    let (encoded, fragment) = split_fragment(body);
    let text = decode_base64_text(encoded).context("Invalid vmess base64 payload")?;
    let fields: Value =
        serde_json::from_str(&text).context("Invalid JSON in vmess payload")?;

    let payload = VmessPayload {
        add: json_str(&fields, &["add"], ""),
        port: json_port(&fields, &["port"]),
        id: json_str(&fields, &["id"], ""),
        aid: json_str(&fields, &["aid"], "0"),
        net: json_str(&fields, &["net"], "raw"),
        scy: json_str(&fields, &["scy", "security"], "auto"),
        host: json_str(&fields, &["host"], ""),
        path: json_str(&fields, &["path"], ""),
        header_type: json_str(&fields, &["type"], ""),
        mode: json_str(&fields, &["mode"], ""),
        tls: json_truthy(&fields, "tls"),
        alpn: json_str(&fields, &["alpn"], ""),
        fp: json_str(&fields, &["fp"], "chrome"),
    };

    let ps = if fragment.is_empty() {
        json_str(&fields, &["ps"], "")
    } else {
        fragment.to_string()
    };

    Ok(DecodedLink {
        ps,
        payload: Payload::Vmess(payload),
    })
}

fn expect_vmess(payload: &Payload) -> Result<&VmessPayload> {
    match payload {
        Payload::Vmess(p) => Ok(p),
        other => anyhow::bail!("Expected vmess payload, got {}", other.protocol()),
    }
}

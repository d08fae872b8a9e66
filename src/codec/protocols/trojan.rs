//! Trojan link codec
//!
//! Inline form `trojan://password@host:port?…#name`; security is always TLS.
//! gRPC transports spell the path as `serviceName`, everything else uses
//! `path`.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use url::Url;

use crate::codec::base64::{decode_base64_text, encode_base64};
use crate::codec::protocols::{
    DecodedLink, LinkCodec, build_uri, clean_data, has_authority, json_port, json_str, pick,
    push_param, query_map, split_fragment, strip_scheme,
};
use crate::record::{Payload, TrojanPayload};

pub struct TrojanCodec;

impl LinkCodec for TrojanCodec {
    fn scheme(&self) -> &'static str {
        "trojan"
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
        let payload = TrojanPayload {
            add: json_str(server, &["server", "add"], ""),
            port: json_port(server, &["port"]),
            pwd: json_str(server, &["password", "pwd"], ""),
            net: json_str(server, &["network", "net"], ""),
            scy: "tls".to_string(),
            host: json_str(server, &["host"], ""),
            path: json_str(server, &["path"], ""),
        };

        Ok(DecodedLink {
            ps: json_str(server, &["name", "ps"], ""),
            payload: Payload::Trojan(payload),
        })
    }

    fn encode(&self, payload: &Payload, ps: &str) -> Result<String> {
        let p = expect_trojan(payload)?;

        let net = if p.net.is_empty() { "grpc" } else { &p.net };

        let mut query = Vec::new();
        push_param(&mut query, "encryption", "none");
        push_param(&mut query, "security", "tls");
        push_param(&mut query, "type", net);
        push_param(&mut query, "host", &p.host);
        if net == "grpc" {
            push_param(&mut query, "serviceName", &p.path);
        } else {
            push_param(&mut query, "path", &p.path);
        }

        let userinfo = urlencoding::encode(&p.pwd).into_owned();
        Ok(build_uri("trojan", &userinfo, &p.add, p.port, &query, ps))
    }

    fn encode_legacy(&self, payload: &Payload, ps: &str) -> Result<String> {
        let p = expect_trojan(payload)?;

        let fields = json!({
            "ps": ps,
            "add": p.add,
            "port": p.port,
            "pwd": p.pwd,
            "net": p.net,
            "scy": p.scy,
            "host": p.host,
            "path": p.path,
        });

        let cleaned = clean_data(fields);
        let text = serde_json::to_string(&cleaned)?;
        Ok(format!("trojan://{}", encode_base64(text)))
    }
}

fn decode_inline(uri: &str) -> Result<DecodedLink> {
    let url = Url::parse(uri).context("Invalid trojan URI")?;
    let host = url.host_str().context("Missing host in trojan URI")?;
    let params = query_map(url.query().unwrap_or(""));

    let payload = TrojanPayload {
        add: host.trim_matches(['[', ']']).to_string(),
        port: url.port().unwrap_or(0),
        pwd: url.username().to_string(),
        net: pick(&params, &["net", "type"], ""),
        scy: "tls".to_string(),
        host: pick(&params, &["host"], ""),
        path: pick(&params, &["path", "sni", "serviceName"], ""),
    };

    Ok(DecodedLink {
        ps: url.fragment().unwrap_or("").to_string(),
        payload: Payload::Trojan(payload),
    })
}

fn decode_legacy(body: &str) -> Result<DecodedLink> {
    let (encoded, fragment) = split_fragment(body);
    let text = decode_base64_text(encoded).context("Invalid trojan base64 payload")?;
    let fields: Value =
        serde_json::from_str(&text).context("Invalid JSON in trojan payload")?;

    let payload = TrojanPayload {
        add: json_str(&fields, &["add"], ""),
        port: json_port(&fields, &["port"]),
        pwd: json_str(&fields, &["pwd", "password"], ""),
        net: json_str(&fields, &["net"], ""),
        scy: "tls".to_string(),
        host: json_str(&fields, &["host"], ""),
        path: json_str(&fields, &["path"], ""),
    };

    let ps = if fragment.is_empty() {
        json_str(&fields, &["ps"], "")
    } else {
        fragment.to_string()
    };

    Ok(DecodedLink {
        ps,
        payload: Payload::Trojan(payload),
    })
}

fn expect_trojan(payload: &Payload) -> Result<&TrojanPayload> {
    match payload {
        Payload::Trojan(p) => Ok(p),
        other => anyhow::bail!("Expected trojan payload, got {}", other.protocol()),
    }
}

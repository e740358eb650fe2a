//! Clash YAML → sing-box outbound conversion.
//!
//! Only the proxy kinds the panel can represent are converted; anything
//! else is reported as a per-entry error and skipped.

use crate::model::{Format, OutboundMap, ParseOutcome, SubsError};
use crate::parse::prefixed_tag;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Deserialize)]
struct ClashDoc {
    #[serde(default)]
    proxies: Vec<serde_yaml::Value>,
}

pub fn parse_clash(content: &str, name: &str) -> Result<ParseOutcome, SubsError> {
    let doc: ClashDoc =
        serde_yaml::from_str(content).map_err(|e| SubsError::Parse(e.to_string()))?;
    let mut outcome = ParseOutcome {
        format: Some(Format::Clash),
        ..Default::default()
    };
    for proxy in doc.proxies {
        // YAML → JSON so the converters share one value model
        let proxy: Value = match serde_json::to_value(&proxy) {
            Ok(v) => v,
            Err(e) => {
                outcome.errors.push(format!("bad proxy entry: {e}"));
                continue;
            }
        };
        match proxy_to_outbound(&proxy, name) {
            Ok(out) => outcome.outbounds.push(out),
            Err(e) => outcome.errors.push(format!("failed to convert proxy: {e}")),
        }
    }
    Ok(outcome)
}

fn proxy_to_outbound(proxy: &Value, name: &str) -> Result<OutboundMap, SubsError> {
    let kind = str_field(proxy, "type");
    let proxy_name = str_field(proxy, "name");
    let server = str_field(proxy, "server");
    let port = port_field(proxy, "port");

    let mut out = Map::new();
    out.insert(
        "tag".into(),
        Value::String(prefixed_tag(name, &proxy_name)),
    );
    out.insert("server".into(), Value::String(server));
    out.insert("server_port".into(), json!(port));

    match kind.as_str() {
        "vmess" => vmess(proxy, out),
        "vless" => vless(proxy, out),
        "trojan" => trojan(proxy, out),
        "ss" | "shadowsocks" => shadowsocks(proxy, out),
        "socks5" => socks(proxy, out),
        "hysteria2" | "hy2" => hysteria2(proxy, out),
        other => Err(SubsError::Unsupported(other.to_string())),
    }
}

fn vmess(proxy: &Value, mut out: OutboundMap) -> Result<OutboundMap, SubsError> {
    out.insert("type".into(), json!("vmess"));
    out.insert("uuid".into(), json!(str_field(proxy, "uuid")));
    if let Some(aid) = proxy.get("alterId").and_then(as_int) {
        out.insert("alter_id".into(), json!(aid));
    }
    if let Some(cipher) = proxy.get("cipher").and_then(Value::as_str) {
        if !cipher.is_empty() && cipher != "auto" {
            out.insert("security".into(), json!(cipher));
        }
    }
    if let Some(tls) = tls_block(proxy, "servername") {
        out.insert("tls".into(), tls);
    }
    if let Some(transport) = transport_block(proxy) {
        out.insert("transport".into(), transport);
    }
    Ok(out)
}

fn vless(proxy: &Value, mut out: OutboundMap) -> Result<OutboundMap, SubsError> {
    out.insert("type".into(), json!("vless"));
    out.insert("uuid".into(), json!(str_field(proxy, "uuid")));
    if let Some(flow) = proxy.get("flow").and_then(Value::as_str) {
        if !flow.is_empty() {
            out.insert("flow".into(), json!(flow));
        }
    }
    if let Some(tls) = tls_block(proxy, "servername") {
        out.insert("tls".into(), tls);
    }
    if let Some(transport) = transport_block(proxy) {
        out.insert("transport".into(), transport);
    }
    Ok(out)
}

fn trojan(proxy: &Value, mut out: OutboundMap) -> Result<OutboundMap, SubsError> {
    out.insert("type".into(), json!("trojan"));
    out.insert("password".into(), json!(str_field(proxy, "password")));
    // trojan is always TLS
    let mut tls = Map::new();
    tls.insert("enabled".into(), json!(true));
    if let Some(skip) = proxy.get("skip-cert-verify").and_then(Value::as_bool) {
        tls.insert("insecure".into(), json!(skip));
    }
    if let Some(sni) = proxy.get("sni").and_then(Value::as_str) {
        if !sni.is_empty() {
            tls.insert("server_name".into(), json!(sni));
        }
    }
    out.insert("tls".into(), Value::Object(tls));
    Ok(out)
}

fn shadowsocks(proxy: &Value, mut out: OutboundMap) -> Result<OutboundMap, SubsError> {
    out.insert("type".into(), json!("shadowsocks"));
    out.insert("method".into(), json!(str_field(proxy, "cipher")));
    out.insert("password".into(), json!(str_field(proxy, "password")));
    Ok(out)
}

fn socks(proxy: &Value, mut out: OutboundMap) -> Result<OutboundMap, SubsError> {
    out.insert("type".into(), json!("socks"));
    for key in ["username", "password"] {
        if let Some(v) = proxy.get(key).and_then(Value::as_str) {
            if !v.is_empty() {
                out.insert(key.into(), json!(v));
            }
        }
    }
    Ok(out)
}

fn hysteria2(proxy: &Value, mut out: OutboundMap) -> Result<OutboundMap, SubsError> {
    out.insert("type".into(), json!("hysteria2"));
    out.insert("password".into(), json!(str_field(proxy, "password")));

    let mut tls = Map::new();
    tls.insert("enabled".into(), json!(true));
    // h3 unless the document pins something else
    let alpn = match proxy.get("alpn") {
        Some(Value::Array(items)) if !items.is_empty() => {
            items.iter().filter_map(Value::as_str).map(String::from).collect()
        }
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => vec!["h3".to_string()],
    };
    tls.insert("alpn".into(), json!(alpn));
    if let Some(skip) = proxy.get("skip-cert-verify").and_then(Value::as_bool) {
        tls.insert("insecure".into(), json!(skip));
    }
    let sni = proxy
        .get("sni")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .or_else(|| {
            out.get("server")
                .and_then(Value::as_str)
                .map(String::from)
        });
    if let Some(sni) = sni {
        tls.insert("server_name".into(), json!(sni));
    }
    if let Some(fp) = proxy.get("fingerprint").and_then(Value::as_str) {
        if !fp.is_empty() {
            tls.insert("utls".into(), json!({"enabled": true, "fingerprint": fp}));
        }
    }
    out.insert("tls".into(), Value::Object(tls));
    Ok(out)
}

/// TLS block shared by vmess/vless (`tls: true` plus optional SNI and
/// skip-cert-verify).
fn tls_block(proxy: &Value, sni_key: &str) -> Option<Value> {
    if !proxy.get("tls").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let mut tls = Map::new();
    tls.insert("enabled".into(), json!(true));
    if let Some(skip) = proxy.get("skip-cert-verify").and_then(Value::as_bool) {
        tls.insert("insecure".into(), json!(skip));
    }
    if let Some(sni) = proxy.get(sni_key).and_then(Value::as_str) {
        if !sni.is_empty() {
            tls.insert("server_name".into(), json!(sni));
        }
    }
    Some(Value::Object(tls))
}

/// ws/grpc transport block from `network` + `ws-opts`.
fn transport_block(proxy: &Value) -> Option<Value> {
    let network = proxy.get("network").and_then(Value::as_str)?;
    let mut transport = Map::new();
    transport.insert("type".into(), json!(network));
    if network == "ws" {
        if let Some(opts) = proxy.get("ws-opts").and_then(Value::as_object) {
            if let Some(path) = opts.get("path").and_then(Value::as_str) {
                transport.insert("path".into(), json!(path));
            }
            if let Some(headers) = opts.get("headers") {
                transport.insert("headers".into(), headers.clone());
            }
        }
    }
    Some(Value::Object(transport))
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn as_int(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

fn port_field(v: &Value, key: &str) -> u16 {
    match v.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as u16,
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

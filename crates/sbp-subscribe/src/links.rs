//! Share-link decoding: one URI per node, scheme per protocol.
//!
//! Links are parsed by hand rather than through a URL library: the ss
//! legacy form carries base64 where a host would be, and URL normalization
//! (host lowercasing, IDNA) must not touch any of that.

use crate::model::{OutboundMap, SubsError};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use percent_encoding::percent_decode_str;
use serde_json::{json, Map, Value};

/// Decode one link line into a sing-box outbound map plus its display tag.
/// `idx` seeds the fallback tag for links without a fragment.
pub fn decode_link(line: &str, idx: usize) -> Result<(OutboundMap, String), SubsError> {
    let (scheme, rest) = line
        .split_once("://")
        .ok_or_else(|| SubsError::Parse("not a link".into()))?;

    match scheme {
        "vmess" => decode_vmess(rest, idx),
        "vless" => decode_vless(rest, idx),
        "trojan" => decode_trojan(rest, idx),
        "ss" => decode_ss(rest, idx),
        "socks" | "socks5" | "socks4" => decode_socks(rest, idx),
        "hysteria" => decode_hysteria(rest, idx),
        "hysteria2" | "hy2" => decode_hysteria2(rest, idx),
        "tuic" => decode_tuic(rest, idx),
        "anytls" => decode_anytls(rest, idx),
        other => Err(SubsError::Unsupported(other.to_string())),
    }
}

/// The pieces of `userinfo@host:port?query#fragment`.
struct LinkParts {
    userinfo: Option<String>,
    host: String,
    port: u16,
    query: Vec<(String, String)>,
    fragment: Option<String>,
}

impl LinkParts {
    fn query_get(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn tag_or(&self, idx: usize) -> String {
        match &self.fragment {
            Some(f) if !f.is_empty() => f.clone(),
            _ => format!("node-{}", idx + 1),
        }
    }
}

fn split_parts(rest: &str) -> Result<LinkParts, SubsError> {
    let (rest, fragment) = match rest.split_once('#') {
        Some((r, f)) => (r, Some(percent_decode_str(f).decode_utf8_lossy().into_owned())),
        None => (rest, None),
    };
    let (authority, query) = match rest.split_once('?') {
        Some((a, q)) => (a, q),
        None => (rest, ""),
    };
    let (userinfo, hostport) = match authority.rsplit_once('@') {
        Some((u, h)) => (
            Some(percent_decode_str(u).decode_utf8_lossy().into_owned()),
            h,
        ),
        None => (None, authority),
    };

    // host:port, tolerating bracketed IPv6
    let (host, port_s) = if let Some(end) = hostport.strip_prefix('[').and_then(|h| h.find(']')) {
        let host = &hostport[1..end + 1];
        let port = hostport[end + 2..].trim_start_matches(':');
        (host.to_string(), port)
    } else {
        let (h, p) = hostport
            .rsplit_once(':')
            .ok_or_else(|| SubsError::Parse(format!("missing port in {hostport}")))?;
        (h.to_string(), p)
    };
    let port: u16 = port_s
        .parse()
        .map_err(|_| SubsError::Parse(format!("bad port: {port_s}")))?;

    let query = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    Ok(LinkParts {
        userinfo,
        host,
        port,
        query,
        fragment,
    })
}

fn decode_b64(s: &str) -> Option<Vec<u8>> {
    for engine in [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD] {
        if let Ok(raw) = engine.decode(s) {
            return Some(raw);
        }
    }
    None
}

fn base_map(kind: &str, server: &str, port: u16) -> OutboundMap {
    let mut out = Map::new();
    out.insert("type".into(), json!(kind));
    out.insert("server".into(), json!(server));
    out.insert("server_port".into(), json!(port));
    out
}

/// vmess links wrap a base64 JSON document (the v2rayN form).
fn decode_vmess(rest: &str, idx: usize) -> Result<(OutboundMap, String), SubsError> {
    let raw = decode_b64(rest.trim_end_matches('/'))
        .ok_or_else(|| SubsError::Parse("vmess: bad base64".into()))?;
    let doc: Value =
        serde_json::from_slice(&raw).map_err(|e| SubsError::Parse(format!("vmess: {e}")))?;

    let server = doc.get("add").and_then(Value::as_str).unwrap_or_default();
    let port = match doc.get("port") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as u16,
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    };
    let mut out = base_map("vmess", server, port);
    out.insert(
        "uuid".into(),
        json!(doc.get("id").and_then(Value::as_str).unwrap_or_default()),
    );
    if let Some(aid) = doc.get("aid").and_then(Value::as_i64) {
        if aid != 0 {
            out.insert("alter_id".into(), json!(aid));
        }
    }
    if let Some(scy) = doc.get("scy").and_then(Value::as_str) {
        if !scy.is_empty() && scy != "auto" {
            out.insert("security".into(), json!(scy));
        }
    }

    let net = doc.get("net").and_then(Value::as_str).unwrap_or("tcp");
    let host = doc.get("host").and_then(Value::as_str).unwrap_or_default();
    if net != "tcp" {
        let mut transport = Map::new();
        transport.insert("type".into(), json!(net));
        if let Some(path) = doc.get("path").and_then(Value::as_str) {
            if !path.is_empty() {
                transport.insert("path".into(), json!(path));
            }
        }
        if !host.is_empty() {
            transport.insert("headers".into(), json!({ "Host": host }));
        }
        out.insert("transport".into(), Value::Object(transport));
    }

    if doc.get("tls").and_then(Value::as_str) == Some("tls") {
        let mut tls = Map::new();
        tls.insert("enabled".into(), json!(true));
        let sni = doc.get("sni").and_then(Value::as_str).unwrap_or(host);
        if !sni.is_empty() {
            tls.insert("server_name".into(), json!(sni));
        }
        if let Some(alpn) = doc.get("alpn").and_then(Value::as_str) {
            if !alpn.is_empty() {
                tls.insert(
                    "alpn".into(),
                    json!(alpn.split(',').collect::<Vec<_>>()),
                );
            }
        }
        if let Some(fp) = doc.get("fp").and_then(Value::as_str) {
            if !fp.is_empty() {
                tls.insert("utls".into(), json!({"enabled": true, "fingerprint": fp}));
            }
        }
        out.insert("tls".into(), Value::Object(tls));
    }

    let tag = doc
        .get("ps")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("node-{}", idx + 1));
    Ok((out, tag))
}

fn decode_vless(rest: &str, idx: usize) -> Result<(OutboundMap, String), SubsError> {
    let parts = split_parts(rest)?;
    let uuid = parts
        .userinfo
        .clone()
        .ok_or_else(|| SubsError::Parse("vless: missing uuid".into()))?;
    let mut out = base_map("vless", &parts.host, parts.port);
    out.insert("uuid".into(), json!(uuid));
    if let Some(flow) = parts.query_get("flow").filter(|f| !f.is_empty()) {
        out.insert("flow".into(), json!(flow));
    }
    if let Some(transport) = transport_from_query(&parts) {
        out.insert("transport".into(), transport);
    }
    if let Some(tls) = tls_from_query(&parts) {
        out.insert("tls".into(), tls);
    }
    Ok((out, parts.tag_or(idx)))
}

fn decode_trojan(rest: &str, idx: usize) -> Result<(OutboundMap, String), SubsError> {
    let parts = split_parts(rest)?;
    let password = parts
        .userinfo
        .clone()
        .ok_or_else(|| SubsError::Parse("trojan: missing password".into()))?;
    let mut out = base_map("trojan", &parts.host, parts.port);
    out.insert("password".into(), json!(password));
    if let Some(transport) = transport_from_query(&parts) {
        out.insert("transport".into(), transport);
    }
    if let Some(tls) = tls_from_query(&parts) {
        out.insert("tls".into(), tls);
    }
    Ok((out, parts.tag_or(idx)))
}

/// ss links: `ss://base64(method:password)@host:port#tag`, or the legacy
/// form where the whole authority is one base64 blob.
fn decode_ss(rest: &str, idx: usize) -> Result<(OutboundMap, String), SubsError> {
    let (auth_part, fragment) = match rest.split_once('#') {
        Some((a, f)) => (
            a,
            Some(percent_decode_str(f).decode_utf8_lossy().into_owned()),
        ),
        None => (rest, None),
    };

    let (method, password, host, port) = if auth_part.contains('@') {
        let parts = split_parts(rest)?;
        let userinfo = parts.userinfo.clone().unwrap_or_default();
        let decoded = decode_b64(&userinfo)
            .and_then(|raw| String::from_utf8(raw).ok())
            .unwrap_or(userinfo);
        let (method, password) = decoded
            .split_once(':')
            .ok_or_else(|| SubsError::Parse("ss: bad userinfo".into()))?;
        (
            method.to_string(),
            password.to_string(),
            parts.host,
            parts.port,
        )
    } else {
        // legacy: everything base64
        let raw = decode_b64(auth_part).ok_or_else(|| SubsError::Parse("ss: bad base64".into()))?;
        let text = String::from_utf8(raw).map_err(|_| SubsError::Parse("ss: not utf8".into()))?;
        let (creds, hostport) = text
            .rsplit_once('@')
            .ok_or_else(|| SubsError::Parse("ss: bad legacy form".into()))?;
        let (method, password) = creds
            .split_once(':')
            .ok_or_else(|| SubsError::Parse("ss: bad credentials".into()))?;
        let (host, port_s) = hostport
            .rsplit_once(':')
            .ok_or_else(|| SubsError::Parse("ss: missing port".into()))?;
        let port: u16 = port_s
            .parse()
            .map_err(|_| SubsError::Parse("ss: bad port".into()))?;
        (
            method.to_string(),
            password.to_string(),
            host.to_string(),
            port,
        )
    };

    let mut out = base_map("shadowsocks", &host, port);
    out.insert("method".into(), json!(method));
    out.insert("password".into(), json!(password));
    let tag = fragment
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| format!("node-{}", idx + 1));
    Ok((out, tag))
}

fn decode_socks(rest: &str, idx: usize) -> Result<(OutboundMap, String), SubsError> {
    let parts = split_parts(rest)?;
    let mut out = base_map("socks", &parts.host, parts.port);
    if let Some(userinfo) = &parts.userinfo {
        if let Some((user, pass)) = userinfo.split_once(':') {
            out.insert("username".into(), json!(user));
            out.insert("password".into(), json!(pass));
        } else if !userinfo.is_empty() {
            out.insert("username".into(), json!(userinfo));
        }
    }
    Ok((out, parts.tag_or(idx)))
}

fn decode_hysteria(rest: &str, idx: usize) -> Result<(OutboundMap, String), SubsError> {
    let parts = split_parts(rest)?;
    let mut out = base_map("hysteria", &parts.host, parts.port);
    if let Some(auth) = parts.query_get("auth").filter(|a| !a.is_empty()) {
        out.insert("auth_str".into(), json!(auth));
    }
    if let Some(obfs) = parts.query_get("obfsParam").filter(|o| !o.is_empty()) {
        out.insert("obfs".into(), json!(obfs));
    }
    for (key, field) in [("upmbps", "up_mbps"), ("downmbps", "down_mbps")] {
        if let Some(v) = parts.query_get(key).and_then(|v| v.parse::<i64>().ok()) {
            out.insert(field.into(), json!(v));
        }
    }
    let mut tls = Map::new();
    tls.insert("enabled".into(), json!(true));
    if let Some(peer) = parts.query_get("peer").filter(|p| !p.is_empty()) {
        tls.insert("server_name".into(), json!(peer));
    }
    if parts.query_get("insecure") == Some("1") {
        tls.insert("insecure".into(), json!(true));
    }
    if let Some(alpn) = alpn_from_query(&parts) {
        tls.insert("alpn".into(), alpn);
    }
    out.insert("tls".into(), Value::Object(tls));
    Ok((out, parts.tag_or(idx)))
}

fn decode_hysteria2(rest: &str, idx: usize) -> Result<(OutboundMap, String), SubsError> {
    let parts = split_parts(rest)?;
    let password = parts.userinfo.clone().unwrap_or_default();
    let mut out = base_map("hysteria2", &parts.host, parts.port);
    out.insert("password".into(), json!(password));
    if let Some(obfs) = parts.query_get("obfs").filter(|o| !o.is_empty()) {
        let mut block = Map::new();
        block.insert("type".into(), json!(obfs));
        if let Some(pw) = parts.query_get("obfs-password") {
            block.insert("password".into(), json!(pw));
        }
        out.insert("obfs".into(), Value::Object(block));
    }
    let mut tls = Map::new();
    tls.insert("enabled".into(), json!(true));
    if let Some(sni) = parts.query_get("sni").filter(|s| !s.is_empty()) {
        tls.insert("server_name".into(), json!(sni));
    }
    if parts.query_get("insecure") == Some("1") {
        tls.insert("insecure".into(), json!(true));
    }
    if let Some(alpn) = alpn_from_query(&parts) {
        tls.insert("alpn".into(), alpn);
    }
    out.insert("tls".into(), Value::Object(tls));
    Ok((out, parts.tag_or(idx)))
}

fn decode_tuic(rest: &str, idx: usize) -> Result<(OutboundMap, String), SubsError> {
    let parts = split_parts(rest)?;
    let userinfo = parts
        .userinfo
        .clone()
        .ok_or_else(|| SubsError::Parse("tuic: missing credentials".into()))?;
    let (uuid, password) = userinfo.split_once(':').unwrap_or((userinfo.as_str(), ""));
    let mut out = base_map("tuic", &parts.host, parts.port);
    out.insert("uuid".into(), json!(uuid));
    out.insert("password".into(), json!(password));
    for key in ["congestion_control", "udp_relay_mode"] {
        if let Some(v) = parts.query_get(key).filter(|v| !v.is_empty()) {
            out.insert(key.into(), json!(v));
        }
    }
    let mut tls = Map::new();
    tls.insert("enabled".into(), json!(true));
    if let Some(sni) = parts.query_get("sni").filter(|s| !s.is_empty()) {
        tls.insert("server_name".into(), json!(sni));
    }
    if parts.query_get("allow_insecure") == Some("1") {
        tls.insert("insecure".into(), json!(true));
    }
    if let Some(alpn) = alpn_from_query(&parts) {
        tls.insert("alpn".into(), alpn);
    }
    out.insert("tls".into(), Value::Object(tls));
    Ok((out, parts.tag_or(idx)))
}

fn decode_anytls(rest: &str, idx: usize) -> Result<(OutboundMap, String), SubsError> {
    let parts = split_parts(rest)?;
    let password = parts.userinfo.clone().unwrap_or_default();
    let mut out = base_map("anytls", &parts.host, parts.port);
    out.insert("password".into(), json!(password));
    let mut tls = Map::new();
    tls.insert("enabled".into(), json!(true));
    if let Some(sni) = parts.query_get("sni").filter(|s| !s.is_empty()) {
        tls.insert("server_name".into(), json!(sni));
    }
    if parts.query_get("insecure") == Some("1") {
        tls.insert("insecure".into(), json!(true));
    }
    if let Some(alpn) = alpn_from_query(&parts) {
        tls.insert("alpn".into(), alpn);
    }
    out.insert("tls".into(), Value::Object(tls));
    Ok((out, parts.tag_or(idx)))
}

fn alpn_from_query(parts: &LinkParts) -> Option<Value> {
    let alpn = parts.query_get("alpn").filter(|a| !a.is_empty())?;
    Some(json!(alpn.split(',').collect::<Vec<_>>()))
}

/// Transport block from the `type`/`path`/`host`/`serviceName` query keys
/// shared by vless and trojan links.
fn transport_from_query(parts: &LinkParts) -> Option<Value> {
    let kind = parts.query_get("type").unwrap_or("tcp");
    if kind == "tcp" {
        return None;
    }
    let mut transport = Map::new();
    transport.insert("type".into(), json!(kind));
    if let Some(path) = parts.query_get("path").filter(|p| !p.is_empty()) {
        transport.insert("path".into(), json!(path));
    }
    if let Some(service) = parts.query_get("serviceName").filter(|s| !s.is_empty()) {
        transport.insert("service_name".into(), json!(service));
    }
    if let Some(host) = parts.query_get("host").filter(|h| !h.is_empty()) {
        transport.insert("headers".into(), json!({ "Host": host }));
    }
    Some(Value::Object(transport))
}

/// TLS block from `security`/`sni`/`alpn`/`fp`/`pbk`/`sid`.
fn tls_from_query(parts: &LinkParts) -> Option<Value> {
    let security = parts.query_get("security").unwrap_or_default();
    if security != "tls" && security != "reality" {
        return None;
    }
    let mut tls = Map::new();
    tls.insert("enabled".into(), json!(true));
    if let Some(sni) = parts.query_get("sni").filter(|s| !s.is_empty()) {
        tls.insert("server_name".into(), json!(sni));
    }
    if let Some(alpn) = alpn_from_query(parts) {
        tls.insert("alpn".into(), alpn);
    }
    if let Some(fp) = parts.query_get("fp").filter(|f| !f.is_empty()) {
        tls.insert("utls".into(), json!({"enabled": true, "fingerprint": fp}));
    }
    if security == "reality" {
        let mut reality = Map::new();
        reality.insert("enabled".into(), json!(true));
        if let Some(pbk) = parts.query_get("pbk") {
            reality.insert("public_key".into(), json!(pbk));
        }
        if let Some(sid) = parts.query_get("sid") {
            reality.insert("short_id".into(), json!(sid));
        }
        tls.insert("reality".into(), Value::Object(reality));
    }
    Some(Value::Object(tls))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vless_reality_link() {
        let line = "vless://11111111-2222-3333-4444-555555555555@r.example.com:443?flow=xtls-rprx-vision&pbk=KEY&security=reality&sid=0123&sni=cdn.example.com&type=tcp#jp%20reality";
        let (out, tag) = decode_link(line, 0).unwrap();
        assert_eq!(tag, "jp reality");
        assert_eq!(out.get("type").unwrap(), "vless");
        assert_eq!(out.get("server").unwrap(), "r.example.com");
        assert_eq!(out.get("server_port").unwrap(), 443);
        assert_eq!(out.get("flow").unwrap(), "xtls-rprx-vision");
        let tls = out.get("tls").unwrap();
        assert_eq!(tls.get("server_name").unwrap(), "cdn.example.com");
        let reality = tls.get("reality").unwrap();
        assert_eq!(reality.get("public_key").unwrap(), "KEY");
        assert_eq!(reality.get("short_id").unwrap(), "0123");
    }

    #[test]
    fn trojan_ws_link() {
        let line =
            "trojan://s3cret@t.example.com:443?host=cdn.example.com&path=%2Ftunnel&security=tls&sni=cdn.example.com&type=ws#hk-1";
        let (out, tag) = decode_link(line, 0).unwrap();
        assert_eq!(tag, "hk-1");
        assert_eq!(out.get("password").unwrap(), "s3cret");
        let transport = out.get("transport").unwrap();
        assert_eq!(transport.get("type").unwrap(), "ws");
        assert_eq!(transport.get("path").unwrap(), "/tunnel");
        assert_eq!(
            transport.get("headers").unwrap().get("Host").unwrap(),
            "cdn.example.com"
        );
    }

    #[test]
    fn ss_modern_and_legacy_forms() {
        let userinfo = STANDARD.encode("aes-256-gcm:pass123");
        let line = format!("ss://{userinfo}@s.example.com:8388#ss-node");
        let (out, tag) = decode_link(&line, 0).unwrap();
        assert_eq!(tag, "ss-node");
        assert_eq!(out.get("type").unwrap(), "shadowsocks");
        assert_eq!(out.get("method").unwrap(), "aes-256-gcm");
        assert_eq!(out.get("password").unwrap(), "pass123");

        let legacy = STANDARD.encode("rc4-md5:pw@legacy.example.com:8389");
        let line = format!("ss://{legacy}#old");
        let (out, _) = decode_link(&line, 0).unwrap();
        assert_eq!(out.get("server").unwrap(), "legacy.example.com");
        assert_eq!(out.get("server_port").unwrap(), 8389);
        assert_eq!(out.get("method").unwrap(), "rc4-md5");
    }

    #[test]
    fn vmess_base64_json() {
        let doc = r#"{"v":"2","ps":"us-1","add":"v.example.com","port":"443","id":"uuid-1","aid":0,"net":"ws","path":"/ws","host":"cdn.example.com","tls":"tls","type":"none"}"#;
        let line = format!("vmess://{}", STANDARD.encode(doc));
        let (out, tag) = decode_link(&line, 0).unwrap();
        assert_eq!(tag, "us-1");
        assert_eq!(out.get("uuid").unwrap(), "uuid-1");
        assert_eq!(out.get("server_port").unwrap(), 443);
        let transport = out.get("transport").unwrap();
        assert_eq!(transport.get("type").unwrap(), "ws");
        let tls = out.get("tls").unwrap();
        assert_eq!(tls.get("server_name").unwrap(), "cdn.example.com");
    }

    #[test]
    fn hysteria2_with_obfs() {
        let line = "hy2://pw@h.example.com:8443?insecure=1&obfs=salamander&obfs-password=opw&sni=h.example.com#hy2";
        let (out, _) = decode_link(line, 0).unwrap();
        assert_eq!(out.get("type").unwrap(), "hysteria2");
        let obfs = out.get("obfs").unwrap();
        assert_eq!(obfs.get("type").unwrap(), "salamander");
        assert_eq!(obfs.get("password").unwrap(), "opw");
        assert_eq!(out.get("tls").unwrap().get("insecure").unwrap(), true);
    }

    #[test]
    fn tuic_credentials() {
        let line = "tuic://uuid-9:pw@q.example.com:443?alpn=h3&congestion_control=bbr&udp_relay_mode=native#tuic";
        let (out, _) = decode_link(line, 0).unwrap();
        assert_eq!(out.get("uuid").unwrap(), "uuid-9");
        assert_eq!(out.get("password").unwrap(), "pw");
        assert_eq!(out.get("congestion_control").unwrap(), "bbr");
        assert_eq!(
            out.get("tls").unwrap().get("alpn").unwrap(),
            &json!(["h3"])
        );
    }

    #[test]
    fn socks_with_and_without_credentials() {
        let (out, _) = decode_link("socks5://u:p@s.example.com:1080#sx", 0).unwrap();
        assert_eq!(out.get("username").unwrap(), "u");
        assert_eq!(out.get("password").unwrap(), "p");
        let (out, tag) = decode_link("socks5://s.example.com:1080", 4).unwrap();
        assert!(out.get("username").is_none());
        assert_eq!(tag, "node-5");
    }

    #[test]
    fn unknown_scheme_is_unsupported() {
        assert!(matches!(
            decode_link("snell://x@y:1#z", 0),
            Err(SubsError::Unsupported(_))
        ));
    }
}

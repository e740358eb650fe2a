//! Share-link encoding: the inverse of [`crate::links`], one URI per row,
//! suitable for the panel's export endpoint and client subscriptions.

use crate::model::{OutboundMap, SubsError};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Bytes escaped in the `#tag` fragment.
const FRAGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Encode one outbound map (tag included) into its share link.
pub fn outbound_to_link(out: &OutboundMap) -> Result<String, SubsError> {
    let kind = get_str(out, "type");
    match kind.as_str() {
        "vmess" => vmess_link(out),
        "vless" => Ok(vless_link(out)),
        "trojan" => Ok(trojan_link(out)),
        "shadowsocks" => Ok(ss_link(out)),
        "socks" => Ok(socks_link(out)),
        "hysteria2" => Ok(hysteria2_link(out)),
        "hysteria" => Ok(hysteria_link(out)),
        "tuic" => Ok(tuic_link(out)),
        "anytls" => Ok(anytls_link(out)),
        other => Err(SubsError::Unsupported(other.to_string())),
    }
}

fn vmess_link(out: &OutboundMap) -> Result<String, SubsError> {
    let mut doc = Map::new();
    doc.insert("v".into(), json!("2"));
    doc.insert("ps".into(), json!(get_str(out, "tag")));
    doc.insert("add".into(), json!(get_str(out, "server")));
    doc.insert("port".into(), json!(get_port(out)));
    doc.insert("id".into(), json!(get_str(out, "uuid")));
    doc.insert("aid".into(), json!(out.get("alter_id").and_then(Value::as_i64).unwrap_or(0)));
    doc.insert("net".into(), json!("tcp"));
    doc.insert("type".into(), json!("none"));

    if let Some(transport) = out.get("transport").and_then(Value::as_object) {
        doc.insert("net".into(), json!(get_str_v(transport, "type")));
        if let Some(path) = transport.get("path").and_then(Value::as_str) {
            doc.insert("path".into(), json!(path));
        }
        if let Some(host) = transport.get("host").and_then(Value::as_str) {
            doc.insert("host".into(), json!(host));
        }
        if let Some(host) = transport
            .get("headers")
            .and_then(Value::as_object)
            .and_then(|h| h.get("Host"))
            .and_then(Value::as_str)
        {
            doc.insert("host".into(), json!(host));
        }
        if let Some(service) = transport.get("service_name").and_then(Value::as_str) {
            doc.insert("path".into(), json!(service));
        }
    }

    if let Some(tls) = enabled_tls(out) {
        doc.insert("tls".into(), json!("tls"));
        if let Some(sni) = tls.get("server_name").and_then(Value::as_str) {
            doc.insert("sni".into(), json!(sni));
        }
        if let Some(alpn) = joined_alpn(tls) {
            doc.insert("alpn".into(), json!(alpn));
        }
        if let Some(fp) = utls_fingerprint(tls) {
            doc.insert("fp".into(), json!(fp));
        }
    }

    let body = serde_json::to_string(&doc).map_err(|e| SubsError::Parse(e.to_string()))?;
    Ok(format!("vmess://{}", STANDARD.encode(body)))
}

fn vless_link(out: &OutboundMap) -> String {
    let mut query = BTreeMap::new();
    query.insert("type".to_string(), "tcp".to_string());
    let flow = get_str(out, "flow");
    if !flow.is_empty() {
        query.insert("flow".into(), flow);
    }
    transport_query(out, &mut query);
    tls_query(out, &mut query);
    format!(
        "vless://{}@{}:{}?{}#{}",
        get_str(out, "uuid"),
        get_str(out, "server"),
        get_port(out),
        encode_query(&query),
        frag(out)
    )
}

fn trojan_link(out: &OutboundMap) -> String {
    let mut query = BTreeMap::new();
    query.insert("type".to_string(), "tcp".to_string());
    transport_query(out, &mut query);
    if let Some(tls) = enabled_tls(out) {
        query.insert("security".into(), "tls".into());
        if let Some(sni) = tls.get("server_name").and_then(Value::as_str) {
            query.insert("sni".into(), sni.into());
        }
        if let Some(alpn) = joined_alpn(tls) {
            query.insert("alpn".into(), alpn);
        }
    }
    format!(
        "trojan://{}@{}:{}?{}#{}",
        get_str(out, "password"),
        get_str(out, "server"),
        get_port(out),
        encode_query(&query),
        frag(out)
    )
}

fn ss_link(out: &OutboundMap) -> String {
    let userinfo = URL_SAFE.encode(format!(
        "{}:{}",
        get_str(out, "method"),
        get_str(out, "password")
    ));
    format!(
        "ss://{}@{}:{}#{}",
        userinfo,
        get_str(out, "server"),
        get_port(out),
        frag(out)
    )
}

fn socks_link(out: &OutboundMap) -> String {
    let user = get_str(out, "username");
    let pass = get_str(out, "password");
    if !user.is_empty() && !pass.is_empty() {
        format!(
            "socks5://{}:{}@{}:{}#{}",
            utf8_percent_encode(&user, FRAGMENT),
            utf8_percent_encode(&pass, FRAGMENT),
            get_str(out, "server"),
            get_port(out),
            frag(out)
        )
    } else {
        format!(
            "socks5://{}:{}#{}",
            get_str(out, "server"),
            get_port(out),
            frag(out)
        )
    }
}

fn hysteria2_link(out: &OutboundMap) -> String {
    let mut query = BTreeMap::new();
    if let Some(tls) = out.get("tls").and_then(Value::as_object) {
        if let Some(sni) = tls.get("server_name").and_then(Value::as_str) {
            query.insert("sni".to_string(), sni.to_string());
        }
        if tls.get("insecure").and_then(Value::as_bool).unwrap_or(false) {
            query.insert("insecure".into(), "1".into());
        }
        if let Some(alpn) = joined_alpn(tls) {
            query.insert("alpn".into(), alpn);
        }
    }
    if let Some(obfs) = out.get("obfs").and_then(Value::as_object) {
        if let Some(kind) = obfs.get("type").and_then(Value::as_str) {
            query.insert("obfs".into(), kind.into());
            if let Some(pw) = obfs.get("password").and_then(Value::as_str) {
                query.insert("obfs-password".into(), pw.into());
            }
        }
    }
    let query_str = if query.is_empty() {
        String::new()
    } else {
        format!("?{}", encode_query(&query))
    };
    format!(
        "hy2://{}@{}:{}{}#{}",
        get_str(out, "password"),
        get_str(out, "server"),
        get_port(out),
        query_str,
        frag(out)
    )
}

fn hysteria_link(out: &OutboundMap) -> String {
    let mut query = BTreeMap::new();
    let auth = get_str(out, "auth_str");
    if !auth.is_empty() {
        query.insert("auth".to_string(), auth);
    }
    if let Some(obfs) = out.get("obfs").and_then(Value::as_str) {
        if !obfs.is_empty() {
            query.insert("obfsParam".into(), obfs.into());
        }
    }
    if let Some(tls) = out.get("tls").and_then(Value::as_object) {
        if let Some(sni) = tls.get("server_name").and_then(Value::as_str) {
            query.insert("peer".into(), sni.into());
        }
        if tls.get("insecure").and_then(Value::as_bool).unwrap_or(false) {
            query.insert("insecure".into(), "1".into());
        }
        if let Some(alpn) = joined_alpn(tls) {
            query.insert("alpn".into(), alpn);
        }
    }
    for (field, key) in [("down_mbps", "downmbps"), ("up_mbps", "upmbps")] {
        if let Some(v) = out.get(field).and_then(Value::as_i64) {
            if v > 0 {
                query.insert(key.into(), v.to_string());
            }
        }
    }
    format!(
        "hysteria://{}:{}?{}#{}",
        get_str(out, "server"),
        get_port(out),
        encode_query(&query),
        frag(out)
    )
}

fn tuic_link(out: &OutboundMap) -> String {
    let mut query = BTreeMap::new();
    for key in ["congestion_control", "udp_relay_mode"] {
        let v = get_str(out, key);
        if !v.is_empty() {
            query.insert(key.to_string(), v);
        }
    }
    if let Some(tls) = out.get("tls").and_then(Value::as_object) {
        if let Some(sni) = tls.get("server_name").and_then(Value::as_str) {
            query.insert("sni".into(), sni.into());
        }
        if tls.get("insecure").and_then(Value::as_bool).unwrap_or(false) {
            query.insert("allow_insecure".into(), "1".into());
        }
        if let Some(alpn) = joined_alpn(tls) {
            query.insert("alpn".into(), alpn);
        }
    }
    format!(
        "tuic://{}:{}@{}:{}?{}#{}",
        get_str(out, "uuid"),
        get_str(out, "password"),
        get_str(out, "server"),
        get_port(out),
        encode_query(&query),
        frag(out)
    )
}

fn anytls_link(out: &OutboundMap) -> String {
    let mut query = BTreeMap::new();
    if let Some(tls) = out.get("tls").and_then(Value::as_object) {
        if let Some(sni) = tls.get("server_name").and_then(Value::as_str) {
            query.insert("sni".to_string(), sni.to_string());
        }
        if tls.get("insecure").and_then(Value::as_bool).unwrap_or(false) {
            query.insert("insecure".into(), "1".into());
        }
        if let Some(alpn) = joined_alpn(tls) {
            query.insert("alpn".into(), alpn);
        }
    }
    let query_str = if query.is_empty() {
        String::new()
    } else {
        format!("?{}", encode_query(&query))
    };
    format!(
        "anytls://{}@{}:{}{}#{}",
        get_str(out, "password"),
        get_str(out, "server"),
        get_port(out),
        query_str,
        frag(out)
    )
}

// -- small field helpers ----------------------------------------------------

fn get_str(out: &OutboundMap, key: &str) -> String {
    out.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn get_str_v(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn get_port(out: &OutboundMap) -> u64 {
    match out.get("server_port") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn frag(out: &OutboundMap) -> String {
    utf8_percent_encode(&get_str(out, "tag"), FRAGMENT).to_string()
}

fn enabled_tls(out: &OutboundMap) -> Option<&Map<String, Value>> {
    let tls = out.get("tls")?.as_object()?;
    tls.get("enabled")
        .and_then(Value::as_bool)
        .unwrap_or(false)
        .then_some(tls)
}

fn joined_alpn(tls: &Map<String, Value>) -> Option<String> {
    let items = tls.get("alpn")?.as_array()?;
    let joined = items
        .iter()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(",");
    (!joined.is_empty()).then_some(joined)
}

fn utls_fingerprint(tls: &Map<String, Value>) -> Option<String> {
    tls.get("utls")?
        .as_object()?
        .get("fingerprint")?
        .as_str()
        .map(String::from)
}

fn transport_query(out: &OutboundMap, query: &mut BTreeMap<String, String>) {
    let Some(transport) = out.get("transport").and_then(Value::as_object) else {
        return;
    };
    query.insert("type".to_string(), get_str_v(transport, "type"));
    if let Some(path) = transport.get("path").and_then(Value::as_str) {
        query.insert("path".into(), path.into());
    }
    if let Some(host) = transport.get("host").and_then(Value::as_str) {
        query.insert("host".into(), host.into());
    }
    if let Some(host) = transport
        .get("headers")
        .and_then(Value::as_object)
        .and_then(|h| h.get("Host"))
        .and_then(Value::as_str)
    {
        query.insert("host".into(), host.into());
    }
    if let Some(service) = transport.get("service_name").and_then(Value::as_str) {
        query.insert("serviceName".into(), service.into());
    }
}

fn tls_query(out: &OutboundMap, query: &mut BTreeMap<String, String>) {
    let Some(tls) = enabled_tls(out) else {
        return;
    };
    let reality_enabled = tls
        .get("reality")
        .and_then(Value::as_object)
        .and_then(|r| r.get("enabled"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if reality_enabled {
        query.insert("security".to_string(), "reality".to_string());
        let reality = tls.get("reality").and_then(Value::as_object).unwrap();
        if let Some(pbk) = reality.get("public_key").and_then(Value::as_str) {
            query.insert("pbk".into(), pbk.into());
        }
        if let Some(sid) = reality.get("short_id").and_then(Value::as_str) {
            query.insert("sid".into(), sid.into());
        }
    } else {
        query.insert("security".to_string(), "tls".to_string());
    }
    if let Some(sni) = tls.get("server_name").and_then(Value::as_str) {
        query.insert("sni".into(), sni.into());
    }
    if let Some(alpn) = joined_alpn(tls) {
        query.insert("alpn".into(), alpn);
    }
    if let Some(fp) = utls_fingerprint(tls) {
        query.insert("fp".into(), fp);
    }
}

fn encode_query(query: &BTreeMap<String, String>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in query {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

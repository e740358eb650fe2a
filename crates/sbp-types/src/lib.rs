//! Shared domain types for the panel: outbound rows, probe results and the
//! geolocation record exchanged between the probing engine and its callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Protocol discriminant of an outbound row. Closed set; anything else is
/// rejected at import time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundType {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    Socks,
    Hysteria,
    Hysteria2,
    Tuic,
    Wireguard,
    Anytls,
    Direct,
    Block,
    Selector,
    Urltest,
    Dns,
}

impl OutboundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundType::Vmess => "vmess",
            OutboundType::Vless => "vless",
            OutboundType::Trojan => "trojan",
            OutboundType::Shadowsocks => "shadowsocks",
            OutboundType::Socks => "socks",
            OutboundType::Hysteria => "hysteria",
            OutboundType::Hysteria2 => "hysteria2",
            OutboundType::Tuic => "tuic",
            OutboundType::Wireguard => "wireguard",
            OutboundType::Anytls => "anytls",
            OutboundType::Direct => "direct",
            OutboundType::Block => "block",
            OutboundType::Selector => "selector",
            OutboundType::Urltest => "urltest",
            OutboundType::Dns => "dns",
        }
    }

    /// Synthetic outbounds never terminate traffic at a proxy server and are
    /// not probe targets.
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            OutboundType::Direct
                | OutboundType::Block
                | OutboundType::Selector
                | OutboundType::Urltest
                | OutboundType::Dns
        )
    }

    /// UDP-only transports: a TCP handshake against `server:port` says
    /// nothing about them, so reachability is recorded without one.
    pub fn is_udp_transport(&self) -> bool {
        matches!(
            self,
            OutboundType::Hysteria
                | OutboundType::Hysteria2
                | OutboundType::Tuic
                | OutboundType::Wireguard
        )
    }
}

impl fmt::Display for OutboundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboundType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vmess" => Ok(OutboundType::Vmess),
            "vless" => Ok(OutboundType::Vless),
            "trojan" => Ok(OutboundType::Trojan),
            "shadowsocks" | "ss" => Ok(OutboundType::Shadowsocks),
            "socks" | "socks5" => Ok(OutboundType::Socks),
            "hysteria" => Ok(OutboundType::Hysteria),
            "hysteria2" | "hy2" => Ok(OutboundType::Hysteria2),
            "tuic" => Ok(OutboundType::Tuic),
            "wireguard" => Ok(OutboundType::Wireguard),
            "anytls" => Ok(OutboundType::Anytls),
            "direct" => Ok(OutboundType::Direct),
            "block" => Ok(OutboundType::Block),
            "selector" => Ok(OutboundType::Selector),
            "urltest" => Ok(OutboundType::Urltest),
            "dns" => Ok(OutboundType::Dns),
            other => Err(format!("unknown outbound type: {other}")),
        }
    }
}

/// Classification of a landing IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpType {
    Hosting,
    #[serde(rename = "ISP")]
    Isp,
    Business,
}

impl fmt::Display for IpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IpType::Hosting => "Hosting",
            IpType::Isp => "ISP",
            IpType::Business => "Business",
        })
    }
}

impl FromStr for IpType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Hosting" => Ok(IpType::Hosting),
            "ISP" => Ok(IpType::Isp),
            "Business" => Ok(IpType::Business),
            other => Err(format!("unknown ip type: {other}")),
        }
    }
}

/// A persisted outbound row. `options` carries the protocol-specific
/// dictionary verbatim (server, port, credentials, tls, transport, ...);
/// the typed accessors below cover the few keys the engine needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outbound {
    pub id: i64,
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: OutboundType,
    #[serde(default)]
    pub options: serde_json::Value,

    #[serde(default, rename = "landingIP")]
    pub landing_ip: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub isp: String,
    #[serde(default, rename = "ipType")]
    pub ip_type: Option<IpType>,
    #[serde(default, rename = "fraudScore")]
    pub fraud_score: u8,
    #[serde(default)]
    pub available: bool,
    #[serde(default, rename = "lastTestTime")]
    pub last_test_time: i64,
    #[serde(default)]
    pub latency: i64,
    #[serde(default, rename = "realLatency")]
    pub real_latency: i64,

    #[serde(default, rename = "subscriptionId")]
    pub subscription_id: Option<i64>,
}

impl Outbound {
    pub fn new(tag: impl Into<String>, kind: OutboundType, options: serde_json::Value) -> Self {
        Self {
            id: 0,
            tag: tag.into(),
            kind,
            options,
            landing_ip: String::new(),
            country: String::new(),
            region: String::new(),
            city: String::new(),
            isp: String::new(),
            ip_type: None,
            fraud_score: 0,
            available: false,
            last_test_time: 0,
            latency: 0,
            real_latency: 0,
            subscription_id: None,
        }
    }

    pub fn server(&self) -> Option<&str> {
        self.options.get("server").and_then(|v| v.as_str())
    }

    pub fn server_port(&self) -> Option<u16> {
        let v = self.options.get("server_port")?;
        // Subscription sources are sloppy: the port shows up as a number or
        // a quoted string depending on the generator.
        if let Some(n) = v.as_u64() {
            return u16::try_from(n).ok();
        }
        v.as_str().and_then(|s| s.parse().ok())
    }

    pub fn username(&self) -> Option<&str> {
        self.options.get("username").and_then(|v| v.as_str())
    }

    pub fn password(&self) -> Option<&str> {
        self.options.get("password").and_then(|v| v.as_str())
    }

    /// Build a row from a raw sing-box outbound dictionary (`type` and
    /// `tag` inline with the protocol options, as subscription documents
    /// carry them).
    pub fn from_singbox(map: &serde_json::Map<String, serde_json::Value>) -> Result<Self, String> {
        let kind_s = map
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "outbound missing type".to_string())?;
        let kind: OutboundType = kind_s.parse()?;
        let tag = map
            .get("tag")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "outbound missing tag".to_string())?
            .to_string();
        let mut options = map.clone();
        options.remove("type");
        options.remove("tag");
        Ok(Outbound::new(tag, kind, serde_json::Value::Object(options)))
    }

    /// The inverse: the sing-box dictionary for this row, probe-derived
    /// fields excluded.
    pub fn singbox_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("type".into(), serde_json::Value::String(self.kind.as_str().into()));
        map.insert("tag".into(), serde_json::Value::String(self.tag.clone()));
        if let serde_json::Value::Object(options) = &self.options {
            for (k, v) in options {
                if k == "type" || k == "tag" {
                    continue;
                }
                map.insert(k.clone(), v.clone());
            }
        }
        map
    }
}

/// Result of probing a single outbound. Mirrors the probe-derived subset of
/// [`Outbound`] plus the addressing triple and an optional error string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub tag: String,
    pub server: String,
    pub port: u16,
    /// TCP handshake latency in ms; -1 when the reachability dial failed,
    /// 0 for UDP-only transports.
    pub latency: i64,
    /// End-to-end HTTP latency through the node (true delay); 0 = unknown.
    pub real_latency: i64,
    pub available: bool,
    #[serde(rename = "landingIP")]
    pub landing_ip: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub isp: String,
    pub ip_type: Option<IpType>,
    pub fraud_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Fold a geolocation record into this result. The caller guarantees the
    /// record came from a single provider; fields are never mixed across
    /// providers.
    pub fn merge_geo(&mut self, geo: &GeoInfo) {
        self.landing_ip = geo.ip.clone();
        self.country = geo.country.clone();
        self.region = geo.region.clone();
        self.city = geo.city.clone();
        self.isp = geo.isp.clone();
    }
}

/// Normalized output of a geolocation provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoInfo {
    pub ip: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub isp: String,
    pub hostname: String,
}

/// A remote subscription feeding outbound rows into the panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    /// Refresh interval in minutes; 0 disables auto-update.
    pub update_interval: i64,
    pub update_mode: UpdateMode,
    pub last_update: i64,
    pub node_count: i64,
}

/// How a subscription refresh treats rows from a previous import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Drop the subscription's previous rows, then import.
    #[default]
    Replace,
    /// Keep existing tags, only add new ones.
    Incremental,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_type_roundtrip() {
        for s in [
            "vmess",
            "vless",
            "trojan",
            "shadowsocks",
            "socks",
            "hysteria",
            "hysteria2",
            "tuic",
            "wireguard",
            "anytls",
            "direct",
            "block",
            "selector",
            "urltest",
            "dns",
        ] {
            let t: OutboundType = s.parse().unwrap();
            assert_eq!(t.as_str(), s);
        }
        assert!("quux".parse::<OutboundType>().is_err());
    }

    #[test]
    fn type_aliases_accepted() {
        assert_eq!(
            "hy2".parse::<OutboundType>().unwrap(),
            OutboundType::Hysteria2
        );
        assert_eq!(
            "ss".parse::<OutboundType>().unwrap(),
            OutboundType::Shadowsocks
        );
        assert_eq!("socks5".parse::<OutboundType>().unwrap(), OutboundType::Socks);
    }

    #[test]
    fn synthetic_and_udp_sets() {
        let synthetic = [
            OutboundType::Direct,
            OutboundType::Block,
            OutboundType::Selector,
            OutboundType::Urltest,
            OutboundType::Dns,
        ];
        for t in synthetic {
            assert!(t.is_synthetic(), "{t} should be synthetic");
            assert!(!t.is_udp_transport());
        }
        let udp = [
            OutboundType::Hysteria,
            OutboundType::Hysteria2,
            OutboundType::Tuic,
            OutboundType::Wireguard,
        ];
        for t in udp {
            assert!(t.is_udp_transport(), "{t} should be udp-only");
            assert!(!t.is_synthetic());
        }
        assert!(!OutboundType::Vmess.is_synthetic());
        assert!(!OutboundType::Vmess.is_udp_transport());
    }

    #[test]
    fn options_accessors() {
        let ob = Outbound::new(
            "node-1",
            OutboundType::Socks,
            json!({
                "server": "10.0.0.1",
                "server_port": 1080,
                "username": "u",
                "password": "p"
            }),
        );
        assert_eq!(ob.server(), Some("10.0.0.1"));
        assert_eq!(ob.server_port(), Some(1080));
        assert_eq!(ob.username(), Some("u"));
        assert_eq!(ob.password(), Some("p"));
    }

    #[test]
    fn port_accepts_string_form() {
        let ob = Outbound::new(
            "n",
            OutboundType::Vmess,
            json!({"server": "a.example.com", "server_port": "8443"}),
        );
        assert_eq!(ob.server_port(), Some(8443));

        let bad = Outbound::new("n2", OutboundType::Vmess, json!({"server_port": 99999}));
        assert_eq!(bad.server_port(), None);
    }

    #[test]
    fn singbox_map_roundtrip() {
        let mut map = serde_json::Map::new();
        map.insert("type".into(), json!("vless"));
        map.insert("tag".into(), json!("jp-1"));
        map.insert("server".into(), json!("a.example.com"));
        map.insert("server_port".into(), json!(443));
        map.insert("uuid".into(), json!("u"));

        let ob = Outbound::from_singbox(&map).unwrap();
        assert_eq!(ob.tag, "jp-1");
        assert_eq!(ob.kind, OutboundType::Vless);
        assert_eq!(ob.server(), Some("a.example.com"));
        // type/tag live in the typed fields, not in options
        assert!(ob.options.get("type").is_none());

        assert_eq!(ob.singbox_map(), map);
    }

    #[test]
    fn from_singbox_rejects_incomplete_maps() {
        let mut map = serde_json::Map::new();
        map.insert("type".into(), json!("vless"));
        assert!(Outbound::from_singbox(&map).is_err());

        let mut map = serde_json::Map::new();
        map.insert("type".into(), json!("teleport"));
        map.insert("tag".into(), json!("x"));
        assert!(Outbound::from_singbox(&map).is_err());
    }

    #[test]
    fn probe_result_merge_takes_single_source() {
        let mut r = ProbeResult::new("t");
        r.merge_geo(&GeoInfo {
            ip: "203.0.113.9".into(),
            country: "DE".into(),
            region: "BY".into(),
            city: "Nuremberg".into(),
            isp: "Hetzner Online".into(),
            hostname: String::new(),
        });
        assert_eq!(r.landing_ip, "203.0.113.9");
        assert_eq!(r.country, "DE");
        assert_eq!(r.isp, "Hetzner Online");
    }

    #[test]
    fn probe_result_json_shape() {
        let r = ProbeResult::new("t");
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("landingIP").is_some());
        assert!(v.get("realLatency").is_some());
        // error is omitted when unset
        assert!(v.get("error").is_none());
    }
}

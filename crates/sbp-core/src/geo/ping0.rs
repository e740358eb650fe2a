//! ping0.cc provider. Plain-text body, larger than the JSON services:
//!
//! ```text
//! 203.0.113.9 (host.example.net)      line 1: IP, optional hostname
//! 美国 弗吉尼亚州 阿什本 — 甲骨文云    line 2: country region city — ISP (zh)
//! AS31898
//! Oracle Cloud                         line 4: ISP (en), preferred
//! ```
//!
//! The markup drifts; parsing is best-effort and anything unexpected is this
//! provider's failure, not the probe's.

use super::{GeoProvider, GeoSample};
use crate::adapter::OutboundDialer;
use crate::error::ProbeError;
use crate::http_probe::{self, ProbeRequest, BUF_SIZE_LARGE};
use sbp_types::GeoInfo;

pub struct Ping0;

const REQUEST: ProbeRequest<'static> = ProbeRequest {
    addr_host: "104.21.16.196",
    addr_port: 80,
    method: "GET",
    path: "/geo",
    host: "ping0.cc",
    extra_headers: &[("User-Agent", "curl/7.68.0")],
    buf_size: BUF_SIZE_LARGE,
};

#[async_trait::async_trait]
impl GeoProvider for Ping0 {
    fn name(&self) -> &'static str {
        "ping0"
    }

    async fn query(&self, dialer: &dyn OutboundDialer) -> Result<GeoSample, ProbeError> {
        let resp = http_probe::fetch(dialer, &REQUEST)
            .await
            .map_err(ProbeError::Dial)?;
        let text = String::from_utf8_lossy(&resp.body);
        Ok(GeoSample {
            info: parse_body(&text)?,
            rtt: resp.elapsed,
        })
    }
}

fn parse_body(text: &str) -> Result<GeoInfo, ProbeError> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 2 {
        return Err(ProbeError::Parse("geo text too short".into()));
    }

    let mut info = GeoInfo::default();

    // Line 1: "IP (hostname)" or a bare IP.
    let line1 = lines[0].trim();
    if let Some(open) = line1.find('(') {
        if open > 0 && line1.ends_with(')') {
            info.ip = line1[..open].trim().to_string();
            info.hostname = line1[open + 1..line1.len() - 1].trim().to_string();
        } else {
            info.ip = line1.to_string();
        }
    } else {
        info.ip = line1.to_string();
    }

    // Line 2: location, with the Chinese ISP name after an em dash.
    let location = lines[1].split('—').next().unwrap_or(lines[1]).trim();
    let mut fields = location.split_whitespace();
    info.country = fields.next().unwrap_or_default().to_string();
    info.region = fields.next().unwrap_or_default().to_string();
    info.city = fields.next().unwrap_or_default().to_string();

    // Line 4 carries the English ISP name when present.
    if let Some(isp_en) = lines.get(3).map(|l| l.trim()).filter(|l| !l.is_empty()) {
        info.isp = isp_en.to_string();
    }

    Ok(info)
}

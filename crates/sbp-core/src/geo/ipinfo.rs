//! ipinfo.io provider. The free tier reports the ISP inside `org`.

use super::{json_str, parse_json, GeoProvider, GeoSample};
use crate::adapter::OutboundDialer;
use crate::error::ProbeError;
use crate::http_probe::{self, ProbeRequest, BUF_SIZE};
use sbp_types::GeoInfo;

pub struct IpInfo;

const REQUEST: ProbeRequest<'static> = ProbeRequest {
    addr_host: "34.117.59.81",
    addr_port: 80,
    method: "GET",
    path: "/json",
    host: "ipinfo.io",
    extra_headers: &[],
    buf_size: BUF_SIZE,
};

#[async_trait::async_trait]
impl GeoProvider for IpInfo {
    fn name(&self) -> &'static str {
        "ipinfo"
    }

    async fn query(&self, dialer: &dyn OutboundDialer) -> Result<GeoSample, ProbeError> {
        let resp = http_probe::fetch(dialer, &REQUEST)
            .await
            .map_err(ProbeError::Dial)?;
        Ok(GeoSample {
            info: parse_body(&resp.body)?,
            rtt: resp.elapsed,
        })
    }
}

fn parse_body(body: &[u8]) -> Result<GeoInfo, ProbeError> {
    let v = parse_json(body)?;
    Ok(GeoInfo {
        ip: json_str(&v, "ip"),
        country: json_str(&v, "country"),
        region: json_str(&v, "region"),
        city: json_str(&v, "city"),
        isp: json_str(&v, "org"),
        hostname: json_str(&v, "hostname"),
    })
}

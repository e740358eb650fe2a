//! ip-api.com provider (JSON over plain HTTP, pinned endpoint IP).

use super::{json_str, parse_json, GeoProvider, GeoSample};
use crate::adapter::OutboundDialer;
use crate::error::ProbeError;
use crate::http_probe::{self, ProbeRequest, BUF_SIZE};
use sbp_types::GeoInfo;

pub struct IpApi;

const REQUEST: ProbeRequest<'static> = ProbeRequest {
    addr_host: "208.95.112.1",
    addr_port: 80,
    method: "GET",
    path: "/json/?fields=status,message,country,regionName,city,isp,query,reverse",
    host: "ip-api.com",
    extra_headers: &[],
    buf_size: BUF_SIZE,
};

#[async_trait::async_trait]
impl GeoProvider for IpApi {
    fn name(&self) -> &'static str {
        "ip-api"
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
        ip: json_str(&v, "query"),
        country: json_str(&v, "country"),
        region: json_str(&v, "regionName"),
        city: json_str(&v, "city"),
        isp: json_str(&v, "isp"),
        hostname: json_str(&v, "reverse"),
    })
}

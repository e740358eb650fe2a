//! ipwhois.app provider (behind Cloudflare; one of the anycast IPs is
//! pinned and the real name travels in the Host header).

use super::{json_str, parse_json, GeoProvider, GeoSample};
use crate::adapter::OutboundDialer;
use crate::error::ProbeError;
use crate::http_probe::{self, ProbeRequest, BUF_SIZE};
use sbp_types::GeoInfo;

pub struct IpWhois;

const REQUEST: ProbeRequest<'static> = ProbeRequest {
    addr_host: "104.21.14.178",
    addr_port: 80,
    method: "GET",
    path: "/json/",
    host: "ipwhois.app",
    extra_headers: &[],
    buf_size: BUF_SIZE,
};

#[async_trait::async_trait]
impl GeoProvider for IpWhois {
    fn name(&self) -> &'static str {
        "ipwhois"
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
        isp: json_str(&v, "isp"),
        // no reverse-lookup field on the free endpoint
        hostname: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_body() {
        let body = br#"{"ip":"192.0.2.4","success":true,"country":"Netherlands","region":"North Holland","city":"Amsterdam","isp":"Comcast Cable Communications"}"#;
        let info = parse_body(body).unwrap();
        assert_eq!(info.ip, "192.0.2.4");
        assert_eq!(info.city, "Amsterdam");
        assert!(info.hostname.is_empty());
    }

    #[test]
    fn request_bytes() {
        assert_eq!(
            crate::http_probe::build_request(&REQUEST),
            b"GET /json/ HTTP/1.1\r\nHost: ipwhois.app\r\nConnection: close\r\n\r\n".to_vec()
        );
    }
}

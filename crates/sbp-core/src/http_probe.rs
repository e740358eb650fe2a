//! Minimal HTTP/1.1 issued over a pre-dialled stream.
//!
//! The probes write literal request bytes and read whatever comes back into
//! a fixed buffer; there is no client library, no redirect handling and no
//! connection reuse on this path. Remote endpoints are unstable third-party
//! services, so parsing stays byte-level and tolerant.

use crate::adapter::OutboundDialer;
use std::io;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// End-to-end budget for one probe round trip.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default response buffer; providers with larger text bodies bump it.
pub const BUF_SIZE: usize = 4096;
pub const BUF_SIZE_LARGE: usize = 8192;

/// One HTTP request to issue through a dialer.
#[derive(Debug, Clone, Copy)]
pub struct ProbeRequest<'a> {
    /// Dial target; a pinned literal IP for the geo services so the egress
    /// route's DNS posture never skews the lookup.
    pub addr_host: &'a str,
    pub addr_port: u16,
    pub method: &'a str,
    pub path: &'a str,
    /// `Host` header (the real service name behind the pinned IP).
    pub host: &'a str,
    /// Extra headers between `Host` and `Connection: close`.
    pub extra_headers: &'a [(&'a str, &'a str)],
    pub buf_size: usize,
}

/// Response payload plus the time from write-complete to first read.
#[derive(Debug)]
pub struct ProbeResponse {
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

/// Render the literal request bytes.
pub fn build_request(req: &ProbeRequest<'_>) -> Vec<u8> {
    let mut out = Vec::with_capacity(160);
    out.extend_from_slice(req.method.as_bytes());
    out.push(b' ');
    out.extend_from_slice(req.path.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\nHost: ");
    out.extend_from_slice(req.host.as_bytes());
    out.extend_from_slice(b"\r\n");
    for (k, v) in req.extra_headers {
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(v.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"Connection: close\r\n\r\n");
    out
}

/// Dial, send, and read one response. Reads stop at EOF or a full buffer;
/// EOF after payload counts as success. The whole exchange is bounded by
/// [`PROBE_TIMEOUT`].
pub async fn fetch(
    dialer: &dyn OutboundDialer,
    req: &ProbeRequest<'_>,
) -> io::Result<ProbeResponse> {
    tokio::time::timeout(PROBE_TIMEOUT, fetch_inner(dialer, req))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "probe timeout"))?
}

async fn fetch_inner(
    dialer: &dyn OutboundDialer,
    req: &ProbeRequest<'_>,
) -> io::Result<ProbeResponse> {
    let mut conn = dialer.dial(req.addr_host, req.addr_port).await?;
    conn.write_all(&build_request(req)).await?;
    conn.flush().await?;

    let start = Instant::now();
    let mut elapsed = None;
    let mut buf = vec![0u8; req.buf_size];
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = conn.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        if elapsed.is_none() {
            elapsed = Some(start.elapsed());
        }
        filled += n;
    }
    buf.truncate(filled);

    let body_at = find_body(&buf).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "invalid HTTP response")
    })?;
    Ok(ProbeResponse {
        body: buf.split_off(body_at),
        elapsed: elapsed.unwrap_or_default(),
    })
}

/// Dial, send, and wait for a single byte: the true-delay measurement. EOF
/// without payload still proves the round trip completed.
pub async fn first_byte_latency(
    dialer: &dyn OutboundDialer,
    req: &ProbeRequest<'_>,
) -> io::Result<Duration> {
    tokio::time::timeout(PROBE_TIMEOUT, async {
        let mut conn = dialer.dial(req.addr_host, req.addr_port).await?;
        conn.write_all(&build_request(req)).await?;
        conn.flush().await?;
        let start = Instant::now();
        let mut byte = [0u8; 1];
        let _ = conn.read(&mut byte).await?;
        Ok(start.elapsed())
    })
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "probe timeout"))?
}

/// Offset of the body after the first blank line, if any.
fn find_body(raw: &[u8]) -> Option<usize> {
    raw.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .filter(|&i| i <= raw.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_bytes_generate_204() {
        let req = ProbeRequest {
            addr_host: "www.gstatic.com",
            addr_port: 80,
            method: "HEAD",
            path: "/generate_204",
            host: "www.gstatic.com",
            extra_headers: &[],
            buf_size: BUF_SIZE,
        };
        assert_eq!(
            build_request(&req),
            b"HEAD /generate_204 HTTP/1.1\r\nHost: www.gstatic.com\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn request_bytes_with_extra_header() {
        let req = ProbeRequest {
            addr_host: "104.21.16.196",
            addr_port: 80,
            method: "GET",
            path: "/geo",
            host: "ping0.cc",
            extra_headers: &[("User-Agent", "curl/7.68.0")],
            buf_size: BUF_SIZE_LARGE,
        };
        assert_eq!(
            build_request(&req),
            b"GET /geo HTTP/1.1\r\nHost: ping0.cc\r\nUser-Agent: curl/7.68.0\r\nConnection: close\r\n\r\n"
                .to_vec()
        );
    }

    #[test]
    fn body_split() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello";
        let at = find_body(raw).unwrap();
        assert_eq!(&raw[at..], b"hello");
        assert!(find_body(b"HTTP/1.1 200 OK\r\n").is_none());
        // header-only response: body is empty but present
        let raw = b"HTTP/1.1 204 No Content\r\n\r\n";
        assert_eq!(find_body(raw), Some(raw.len()));
    }
}

//! Client-side SOCKS5 dialer (RFC 1928, RFC 1929 user/pass auth).
//!
//! Self-contained: SOCKS5 rows are probed without the proxy engine, so this
//! dialer builds the handshake itself instead of delegating to an adapter.

use crate::adapter::{BoxedStream, OutboundDialer};
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Socks5Dialer {
    server: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

impl Socks5Dialer {
    pub fn new(
        server: impl Into<String>,
        port: u16,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            // Empty credentials mean NOAUTH, same as absent ones.
            username: username.filter(|s| !s.is_empty()),
            password: password.filter(|s| !s.is_empty()),
        }
    }

    fn wants_auth(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }
}

#[async_trait]
impl OutboundDialer for Socks5Dialer {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxedStream> {
        let upstream = format!("{}:{}", self.server, self.port);
        let mut s = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&upstream))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "socks5: connect timeout"))??;
        let _ = s.set_nodelay(true);

        // Method negotiation.
        s.write_all(&greeting(self.wants_auth())).await?;
        let mut rsp = [0u8; 2];
        s.read_exact(&mut rsp).await?;
        if rsp[0] != 0x05 {
            return Err(proto_err("socks5: bad version"));
        }
        match rsp[1] {
            0x00 => {}
            0x02 => {
                let u = self.username.as_deref().unwrap_or_default();
                let p = self.password.as_deref().unwrap_or_default();
                let req = auth_request(u, p).ok_or_else(|| proto_err("socks5: creds too long"))?;
                s.write_all(&req).await?;
                let mut vr = [0u8; 2];
                s.read_exact(&mut vr).await?;
                if vr[1] != 0x00 {
                    return Err(proto_err("socks5: auth failed"));
                }
            }
            _ => return Err(proto_err("socks5: no acceptable methods")),
        }

        // CONNECT.
        let req =
            connect_request(host, port).ok_or_else(|| proto_err("socks5: host too long"))?;
        s.write_all(&req).await?;

        let mut head = [0u8; 4];
        s.read_exact(&mut head).await?;
        if head[1] != 0x00 {
            return Err(proto_err(format!(
                "socks5: connect failed, rep={:#04x}",
                head[1]
            )));
        }

        // Drain BND.ADDR + BND.PORT so the stream starts at the payload.
        match head[3] {
            0x01 => {
                let mut b = [0u8; 4 + 2];
                s.read_exact(&mut b).await?;
            }
            0x03 => {
                let mut l = [0u8; 1];
                s.read_exact(&mut l).await?;
                let mut dom = vec![0u8; l[0] as usize + 2];
                s.read_exact(&mut dom).await?;
            }
            0x04 => {
                let mut b = [0u8; 16 + 2];
                s.read_exact(&mut b).await?;
            }
            _ => return Err(proto_err("socks5: bad atyp")),
        }

        Ok(Box::new(s))
    }
}

fn proto_err(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// VER=5 greeting offering either NOAUTH or USER/PASS.
fn greeting(auth: bool) -> [u8; 3] {
    if auth {
        [0x05, 0x01, 0x02]
    } else {
        [0x05, 0x01, 0x00]
    }
}

/// RFC 1929 subnegotiation request. `None` if either field exceeds 255 bytes.
fn auth_request(user: &str, pass: &str) -> Option<Vec<u8>> {
    if user.len() > 255 || pass.len() > 255 {
        return None;
    }
    let mut buf = Vec::with_capacity(3 + user.len() + pass.len());
    buf.extend_from_slice(&[0x01, user.len() as u8]);
    buf.extend_from_slice(user.as_bytes());
    buf.push(pass.len() as u8);
    buf.extend_from_slice(pass.as_bytes());
    Some(buf)
}

/// CONNECT request. IPv4 literals use ATYP=1, everything else is sent as a
/// domain (ATYP=3) and left to the proxy to resolve; the probing host's own
/// DNS posture must not leak into the measurement.
fn connect_request(host: &str, port: u16) -> Option<Vec<u8>> {
    let mut msg = Vec::with_capacity(22);
    msg.extend_from_slice(&[0x05, 0x01, 0x00]);
    if let Ok(v4) = host.parse::<std::net::Ipv4Addr>() {
        msg.push(0x01);
        msg.extend_from_slice(&v4.octets());
    } else {
        if host.len() > 255 {
            return None;
        }
        msg.push(0x03);
        msg.push(host.len() as u8);
        msg.extend_from_slice(host.as_bytes());
    }
    msg.extend_from_slice(&port.to_be_bytes());
    Some(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_bytes() {
        assert_eq!(greeting(false), [0x05, 0x01, 0x00]);
        assert_eq!(greeting(true), [0x05, 0x01, 0x02]);
    }

    #[test]
    fn auth_request_layout() {
        let req = auth_request("u", "pw").unwrap();
        assert_eq!(req, vec![0x01, 1, b'u', 2, b'p', b'w']);
        assert!(auth_request(&"x".repeat(256), "p").is_none());
    }

    #[test]
    fn connect_request_ipv4() {
        let req = connect_request("1.2.3.4", 80).unwrap();
        assert_eq!(req, vec![0x05, 0x01, 0x00, 0x01, 1, 2, 3, 4, 0, 80]);
    }

    #[test]
    fn connect_request_domain() {
        let req = connect_request("ip-api.com", 80).unwrap();
        let mut want = vec![0x05, 0x01, 0x00, 0x03, 10];
        want.extend_from_slice(b"ip-api.com");
        want.extend_from_slice(&80u16.to_be_bytes());
        assert_eq!(req, want);
    }

    #[test]
    fn empty_credentials_mean_noauth() {
        let d = Socks5Dialer::new("10.0.0.1", 1080, Some(String::new()), Some(String::new()));
        assert!(!d.wants_auth());
        let d = Socks5Dialer::new("10.0.0.1", 1080, Some("u".into()), None);
        assert!(d.wants_auth());
    }
}

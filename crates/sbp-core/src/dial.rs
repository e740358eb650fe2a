//! Dial-capability resolution and the raw reachability dial.
//!
//! This is the only module that knows about the co-running proxy engine:
//! SOCKS5 rows get the self-contained client dialer, every other proxy type
//! needs an adapter from the injected registry. Callers downstream only ever
//! see an [`OutboundDialer`].

use crate::adapter::{OutboundDialer, OutboundRegistry};
use crate::error::ProbeError;
use crate::socks5::Socks5Dialer;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sbp_types::{Outbound, OutboundType};
use tokio::net::TcpStream;

/// Reachability handshake budget.
pub const REACH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Default)]
pub struct DialProvider {
    registry: Option<Arc<dyn OutboundRegistry>>,
}

impl DialProvider {
    pub fn new(registry: Option<Arc<dyn OutboundRegistry>>) -> Self {
        Self { registry }
    }

    /// Resolve an outbound row to a dial capability.
    pub fn resolve(&self, ob: &Outbound) -> Result<Arc<dyn OutboundDialer>, ProbeError> {
        if ob.kind == OutboundType::Socks {
            let server = ob.server().ok_or(ProbeError::InvalidConfig)?;
            let port = ob.server_port().ok_or(ProbeError::InvalidConfig)?;
            return Ok(Arc::new(Socks5Dialer::new(
                server,
                port,
                ob.username().map(str::to_owned),
                ob.password().map(str::to_owned),
            )));
        }
        let registry = self.registry.as_ref().ok_or(ProbeError::EngineUnavailable)?;
        registry.lookup(&ob.tag).ok_or(ProbeError::UnknownOutbound)
    }
}

/// TCP-connect to `server:port` and report the handshake time. The stream is
/// dropped immediately; only the latency matters.
pub async fn tcp_ping(server: &str, port: u16) -> io::Result<Duration> {
    let start = Instant::now();
    let addr = format!("{server}:{port}");
    let conn = tokio::time::timeout(REACH_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "tcp connect timeout"))??;
    drop(conn);
    Ok(start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn socks_rows_resolve_without_registry() {
        let provider = DialProvider::new(None);
        let ob = Outbound::new(
            "sx",
            OutboundType::Socks,
            json!({"server": "10.0.0.1", "server_port": 1080}),
        );
        assert!(provider.resolve(&ob).is_ok());
    }

    #[test]
    fn socks_row_without_server_is_invalid() {
        let provider = DialProvider::new(None);
        let ob = Outbound::new("sx", OutboundType::Socks, json!({}));
        assert!(matches!(
            provider.resolve(&ob),
            Err(ProbeError::InvalidConfig)
        ));
    }

    #[test]
    fn non_socks_needs_engine() {
        let provider = DialProvider::new(None);
        let ob = Outbound::new(
            "v1",
            OutboundType::Vless,
            json!({"server": "a.example.com", "server_port": 443}),
        );
        let err = provider.resolve(&ob).unwrap_err();
        assert_eq!(
            err.to_string(),
            "sing-box not running (required for non-SOCKS5 protocols)"
        );
    }
}

//! Per-tag probe orchestration.
//!
//! One probe is a strictly sequential state machine: row lookup →
//! reachability → dial-capability resolution → true-delay measurement →
//! geolocation race → classification and fraud scoring. Each stage catches
//! its own failure class and either stops the pipeline (reachability,
//! configuration) or degrades the output (true delay, fraud score).

use crate::adapter::{OutboundDialer, OutboundRegistry};
use crate::dial::{tcp_ping, DialProvider};
use crate::error::ProbeError;
use crate::geo;
use crate::http_probe::{self, ProbeRequest, BUF_SIZE};
use crate::iptype::infer_ip_type;
use crate::store::OutboundStore;
use crate::fraud;
use sbp_types::{Outbound, ProbeResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// True-delay endpoint: fixed-size, fast, and served everywhere.
const GSTATIC: ProbeRequest<'static> = ProbeRequest {
    addr_host: "www.gstatic.com",
    addr_port: 80,
    method: "HEAD",
    path: "/generate_204",
    host: "www.gstatic.com",
    extra_headers: &[],
    buf_size: BUF_SIZE,
};

#[derive(Clone)]
pub struct ProbeEngine {
    store: Arc<dyn OutboundStore>,
    dial_provider: DialProvider,
    geo_providers: Arc<Vec<Arc<dyn geo::GeoProvider>>>,
}

impl ProbeEngine {
    /// The registry handle comes from the co-running proxy engine; `None`
    /// restricts landing-IP probes to SOCKS5 rows.
    pub fn new(
        store: Arc<dyn OutboundStore>,
        registry: Option<Arc<dyn OutboundRegistry>>,
    ) -> Self {
        Self {
            store,
            dial_provider: DialProvider::new(registry),
            geo_providers: Arc::new(geo::default_providers()),
        }
    }

    /// Swap the geolocation provider set (tests script their own).
    pub fn with_geo_providers(mut self, providers: Vec<Arc<dyn geo::GeoProvider>>) -> Self {
        self.geo_providers = Arc::new(providers);
        self
    }

    pub fn store(&self) -> &Arc<dyn OutboundStore> {
        &self.store
    }

    /// Reachability-only probe. Does not persist; combine with
    /// [`ProbeEngine::save_result`] when the row should be updated.
    pub async fn test_outbound(&self, tag: &str) -> Result<ProbeResult, ProbeError> {
        let ob = self.lookup(tag).await?;
        Ok(self.reachability(&ob).await)
    }

    /// Full pipeline: reachability, then landing-IP discovery and
    /// enrichment through the node itself. Does not persist.
    pub async fn test_outbound_with_landing(
        &self,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<ProbeResult, ProbeError> {
        let ob = self.lookup(tag).await?;
        let mut result = self.reachability(&ob).await;

        // UDP-only transports skipped the TCP check, and an enrichment probe
        // would need the QUIC stack of the proxy engine anyway; they are
        // reported reachable and left unenriched.
        if ob.kind.is_udp_transport() || !result.available {
            return Ok(result);
        }

        let dialer = match self.dial_provider.resolve(&ob) {
            Ok(d) => d,
            Err(e) => {
                // Reachability stands; only the landing-IP leg is lost.
                result.error = Some(e.to_string());
                return Ok(result);
            }
        };

        self.enrich(&mut result, dialer, cancel).await;
        Ok(result)
    }

    /// Persist a result. Failures are logged and swallowed: probes are
    /// idempotent and the next run will retry.
    pub async fn save_result(&self, result: &ProbeResult) {
        if let Err(e) = self.store.apply_probe_update(&result.tag, result).await {
            debug!(tag = %result.tag, error = %e, "probe result not persisted");
        }
    }

    async fn lookup(&self, tag: &str) -> Result<Outbound, ProbeError> {
        self.store
            .get_by_tag(tag)
            .await
            .map_err(|e| ProbeError::Persist(e.to_string()))?
            .ok_or_else(|| ProbeError::NotFound(tag.to_string()))
    }

    async fn reachability(&self, ob: &Outbound) -> ProbeResult {
        let mut result = ProbeResult::new(&ob.tag);
        let (server, port) = match (ob.server(), ob.server_port()) {
            (Some(s), Some(p)) if !s.is_empty() && p != 0 => (s.to_string(), p),
            _ => {
                result.available = false;
                result.latency = -1;
                result.error = Some(ProbeError::InvalidConfig.to_string());
                return result;
            }
        };
        result.server = server.clone();
        result.port = port;

        if ob.kind.is_udp_transport() {
            result.available = true;
            result.latency = 0;
            return result;
        }

        match tcp_ping(&server, port).await {
            Ok(elapsed) => {
                result.latency = elapsed.as_millis() as i64;
                result.available = true;
            }
            Err(e) => {
                result.latency = -1;
                result.available = false;
                result.error = Some(ProbeError::Dial(e).to_string());
            }
        }
        result
    }

    async fn enrich(
        &self,
        result: &mut ProbeResult,
        dialer: Arc<dyn OutboundDialer>,
        cancel: &CancellationToken,
    ) {
        // True delay: one HEAD through the node, one byte back.
        tokio::select! {
            _ = cancel.cancelled() => return,
            latency = http_probe::first_byte_latency(dialer.as_ref(), &GSTATIC) => {
                match latency {
                    Ok(elapsed) => result.real_latency = elapsed.as_millis() as i64,
                    Err(e) => debug!(tag = %result.tag, error = %e, "true-delay probe failed"),
                }
            }
        }

        let winner = tokio::select! {
            _ = cancel.cancelled() => return,
            w = geo::race(&self.geo_providers, dialer.clone()) => w,
        };

        let Some(sample) = winner else {
            result.error = Some(ProbeError::GeoExhausted.to_string());
            return;
        };

        result.merge_geo(&sample.info);
        result.ip_type = infer_ip_type(&sample.info.isp, &sample.info.hostname);
        if result.real_latency == 0 {
            // the winning lookup already measured a round trip through the node
            result.real_latency = sample.rtt.as_millis() as i64;
        }

        if !result.landing_ip.is_empty() {
            let landing_ip = result.landing_ip.clone();
            tokio::select! {
                _ = cancel.cancelled() => {}
                score = fraud::fraud_score(dialer.as_ref(), &landing_ip) => {
                    if let Some(score) = score {
                        result.fraud_score = score;
                    }
                }
            }
        }
    }
}

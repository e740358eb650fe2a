//! Landing-IP discovery: four interchangeable geolocation services, raced.
//!
//! Every provider tunnels its request through the node under test, pins the
//! service's literal IP (DNS through an unknown egress route is not trusted)
//! and normalizes the answer into a [`GeoInfo`]. The four are equivalent for
//! merging purposes: the first to come back with a non-empty IP wins and the
//! losers are cancelled. Results are never mixed across providers.

mod ip_api;
mod ipinfo;
mod ipwhois;
mod ping0;

pub use ip_api::IpApi;
pub use ipinfo::IpInfo;
pub use ipwhois::IpWhois;
pub use ping0::Ping0;

use crate::adapter::OutboundDialer;
use crate::error::ProbeError;
use sbp_types::GeoInfo;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::debug;

/// Budget for the whole race; mirrors the per-probe budget.
pub const RACE_TIMEOUT: Duration = Duration::from_secs(15);

/// A provider answer plus its time-to-first-byte, which doubles as the
/// true-delay fallback when the dedicated latency probe failed.
#[derive(Debug, Clone)]
pub struct GeoSample {
    pub info: GeoInfo,
    pub rtt: Duration,
}

#[async_trait::async_trait]
pub trait GeoProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn query(&self, dialer: &dyn OutboundDialer) -> Result<GeoSample, ProbeError>;
}

/// The production provider set, in no particular order: the race is decided
/// by arrival, not position.
pub fn default_providers() -> Vec<Arc<dyn GeoProvider>> {
    vec![
        Arc::new(IpApi),
        Arc::new(IpInfo),
        Arc::new(IpWhois),
        Arc::new(Ping0),
    ]
}

/// Fan out all providers and take the first sample carrying a non-empty IP.
/// Returns `None` when every provider failed or the deadline fired; dropping
/// the join set aborts whatever is still in flight.
pub async fn race(
    providers: &[Arc<dyn GeoProvider>],
    dialer: Arc<dyn OutboundDialer>,
) -> Option<GeoSample> {
    let mut set = JoinSet::new();
    for provider in providers {
        let provider = provider.clone();
        let dialer = dialer.clone();
        set.spawn(async move {
            let out = provider.query(dialer.as_ref()).await;
            (provider.name(), out)
        });
    }

    let winner = tokio::time::timeout(RACE_TIMEOUT, async {
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, Ok(sample))) if !sample.info.ip.is_empty() => {
                    debug!(provider = name, ip = %sample.info.ip, "geo race won");
                    return Some(sample);
                }
                Ok((name, Ok(_))) => debug!(provider = name, "geo provider returned empty ip"),
                Ok((name, Err(e))) => debug!(provider = name, error = %e, "geo provider failed"),
                Err(_) => {}
            }
        }
        None
    })
    .await;
    winner.unwrap_or(None)
}

/// Shared helper: pull a string field out of a provider's JSON body.
pub(crate) fn json_str(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|f| f.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Shared helper: decode a JSON body, mapping failures to [`ProbeError::Parse`].
pub(crate) fn parse_json(body: &[u8]) -> Result<serde_json::Value, ProbeError> {
    serde_json::from_slice(body).map_err(|e| ProbeError::Parse(e.to_string()))
}

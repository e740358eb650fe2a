use sbp_core::{OutboundStore, ProbeEngine};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OutboundStore>,
    pub engine: ProbeEngine,
    /// Root cancellation for batch probes; tripped on shutdown.
    pub shutdown: CancellationToken,
    /// Subscription downloads may skip TLS verification (operator opt-in).
    pub insecure_subs: bool,
}

impl AppState {
    pub fn new(store: Arc<dyn OutboundStore>, engine: ProbeEngine, insecure_subs: bool) -> Self {
        Self {
            store,
            engine,
            shutdown: CancellationToken::new(),
            insecure_subs,
        }
    }
}

//! Node probing engine for the panel.
//!
//! Given the outbound rows in the store, the engine measures reachability
//! and TCP latency, discovers each node's landing IP by tunnelling HTTP
//! probes through the node itself, enriches the row with geolocation, ISP,
//! IP classification and a fraud score, and merges the outcome back
//! idempotently. It speaks no proxy protocol of its own: SOCKS5 rows get a
//! built-in client dialer, everything else borrows an adapter from the
//! co-running proxy engine through the [`adapter::OutboundRegistry`] seam.

pub mod adapter;
pub mod batch;
pub mod dial;
pub mod error;
pub mod fraud;
pub mod geo;
pub mod http_probe;
pub mod iptype;
pub mod probe;
pub mod socks5;
pub mod store;

pub use adapter::{BoxedStream, OutboundDialer, OutboundRegistry};
pub use batch::{DEFAULT_ENRICH_CONCURRENCY, DEFAULT_REACH_CONCURRENCY};
pub use error::ProbeError;
pub use probe::ProbeEngine;
pub use store::{MemoryStore, OutboundStore, SqliteStore, StoreError};

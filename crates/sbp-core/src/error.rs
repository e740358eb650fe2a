use thiserror::Error;

/// Failure taxonomy of a single probe run. None of these abort a batch; the
/// batch scheduler records them per tag and keeps going.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// No row with this tag. Surfaced to single-tag callers, dropped in
    /// batches (missing tags are silently skipped there).
    #[error("outbound not found: {0}")]
    NotFound(String),

    /// The options dictionary lacks a usable `server`/`server_port`.
    #[error("invalid server or port")]
    InvalidConfig,

    /// Reachability dial failed.
    #[error("dial failed: {0}")]
    Dial(#[source] std::io::Error),

    /// A non-SOCKS5 row needs the co-running proxy engine, which is absent.
    #[error("sing-box not running (required for non-SOCKS5 protocols)")]
    EngineUnavailable,

    /// The proxy engine is up but has no adapter registered for this tag.
    #[error("outbound not found in sing-box (load node first or use SOCKS5)")]
    UnknownOutbound,

    /// Every geolocation provider failed or the race deadline fired.
    #[error("all IP lookup services failed")]
    GeoExhausted,

    /// A provider answered with something we could not parse. Treated as
    /// that provider's failure; the race keeps waiting on the others.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Persisting the result failed. Swallowed by callers: probes are
    /// idempotent and the next run retries.
    #[error("persist failed: {0}")]
    Persist(String),
}

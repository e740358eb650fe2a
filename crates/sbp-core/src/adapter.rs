//! Seam between the probing engine and the co-running proxy engine.
//!
//! The engine never speaks the proxy protocols itself; it asks an injected
//! [`OutboundRegistry`] for a dial capability bound to a tag and then runs
//! plain HTTP over whatever stream comes back. The registry handle is passed
//! in at construction so the engine stays testable with mock adapters.

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// A full-duplex byte stream routed via some outbound.
pub trait ConnStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> ConnStream for T {}

/// Boxed stream returned by dialers; may be a raw TCP stream, a SOCKS5
/// tunnel or anything the proxy engine layers underneath.
pub type BoxedStream = Box<dyn ConnStream>;

/// A dial capability: opens a stream to `host:port` routed through one
/// specific outbound. Stateless from the caller's perspective; per-dial
/// timeouts are the dialer's own concern.
#[async_trait]
pub trait OutboundDialer: Send + Sync + std::fmt::Debug {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxedStream>;
}

/// Tag-indexed view of the proxy engine's loaded outbounds. Lookups are
/// read-only and safe to issue concurrently.
pub trait OutboundRegistry: Send + Sync {
    fn lookup(&self, tag: &str) -> Option<Arc<dyn OutboundDialer>>;
}

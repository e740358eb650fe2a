//! Shared fixtures: scripted dialers, registries and geo providers, plus a
//! loopback listener that counts accepted sockets.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sbp_core::adapter::{BoxedStream, OutboundDialer, OutboundRegistry};
use sbp_core::error::ProbeError;
use sbp_core::geo::{GeoProvider, GeoSample};
use sbp_types::GeoInfo;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// What a scripted route does when dialled.
#[derive(Clone, Debug)]
pub enum Route {
    /// Connection refused.
    Refuse,
    /// Never answers; only a cancel or timeout gets rid of it.
    Hang,
    /// Serve these raw bytes after an optional delay, then close.
    Respond { delay: Duration, payload: Vec<u8> },
}

#[derive(Default, Debug)]
pub struct MockDialer {
    routes: Mutex<HashMap<String, Route>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: Mutex<HashMap<String, usize>>,
    dials: AtomicUsize,
}

impl MockDialer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(self: Arc<Self>, host: &str, port: u16, route: Route) -> Arc<Self> {
        self.routes.lock().insert(format!("{host}:{port}"), route);
        self
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent dials observed for one route.
    pub fn max_in_flight(&self, host: &str, port: u16) -> usize {
        self.max_in_flight
            .lock()
            .get(&format!("{host}:{port}"))
            .copied()
            .unwrap_or(0)
    }

    fn enter(&self, key: &str) {
        let mut current = self.in_flight.lock();
        let n = current.entry(key.to_string()).or_insert(0);
        *n += 1;
        let mut max = self.max_in_flight.lock();
        let m = max.entry(key.to_string()).or_insert(0);
        *m = (*m).max(*n);
    }

    fn leave(&self, key: &str) {
        if let Some(n) = self.in_flight.lock().get_mut(key) {
            *n = n.saturating_sub(1);
        }
    }
}

#[async_trait]
impl OutboundDialer for MockDialer {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxedStream> {
        let key = format!("{host}:{port}");
        self.dials.fetch_add(1, Ordering::SeqCst);
        let route = self
            .routes
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or(Route::Refuse);
        self.enter(&key);
        let out = match route {
            Route::Refuse => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "scripted refusal",
            )),
            Route::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(io::Error::new(io::ErrorKind::TimedOut, "unreachable"))
            }
            Route::Respond { delay, payload } => {
                tokio::time::sleep(delay).await;
                let (client, mut server) = tokio::io::duplex(16 * 1024);
                tokio::spawn(async move {
                    use tokio::io::AsyncWriteExt;
                    // swallow the request, then answer and close
                    let mut sink = [0u8; 2048];
                    let _ = server.read(&mut sink).await;
                    let _ = server.write_all(&payload).await;
                    let _ = server.shutdown().await;
                });
                Ok(Box::new(client) as BoxedStream)
            }
        };
        self.leave(&key);
        out
    }
}

#[derive(Default)]
pub struct MockRegistry {
    dialers: Mutex<HashMap<String, Arc<dyn OutboundDialer>>>,
}

impl MockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, tag: &str, dialer: Arc<dyn OutboundDialer>) {
        self.dialers.lock().insert(tag.to_string(), dialer);
    }
}

impl OutboundRegistry for MockRegistry {
    fn lookup(&self, tag: &str) -> Option<Arc<dyn OutboundDialer>> {
        self.dialers.lock().get(tag).cloned()
    }
}

/// Geo provider with a scripted answer and artificial latency.
pub struct ScriptedGeo {
    pub name: &'static str,
    pub delay: Duration,
    pub outcome: Option<GeoInfo>,
}

#[async_trait]
impl GeoProvider for ScriptedGeo {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn query(&self, _dialer: &dyn OutboundDialer) -> Result<GeoSample, ProbeError> {
        tokio::time::sleep(self.delay).await;
        match &self.outcome {
            Some(info) => Ok(GeoSample {
                info: info.clone(),
                rtt: self.delay,
            }),
            None => Err(ProbeError::Parse("scripted failure".into())),
        }
    }
}

/// Bind a loopback listener that accepts (and drops) connections, counting
/// each accept.
pub async fn counting_listener() -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = accepts.clone();
    tokio::spawn(async move {
        loop {
            if let Ok((conn, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(conn);
            }
        }
    });
    (port, accepts)
}

/// A canned HTTP/1.1 response wrapping `body`.
pub fn http_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{body}"
    )
    .into_bytes()
}

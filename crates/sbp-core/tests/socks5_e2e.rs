//! SOCKS5 rows are probed without the proxy engine: the client dialer
//! handshakes with the proxy itself. These tests run a miniature SOCKS5
//! server on loopback that answers geolocation requests dest-aware.

mod support;

use sbp_core::{MemoryStore, ProbeEngine};
use sbp_types::{Outbound, OutboundType};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

const IP_API_BODY: &str = r#"{"status":"success","country":"Germany","regionName":"Hesse","city":"Frankfurt","isp":"Example Hosting GmbH","query":"203.0.113.20"}"#;

/// Accept loop for a scripted SOCKS5 server. Knows three destinations:
/// ip-api answers with a canned body, gstatic answers 204, everything else
/// is closed right after the CONNECT succeeds.
async fn spawn_socks5_server(creds: Option<(&'static str, &'static str)>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        loop {
            let Ok((conn, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(handle_conn(conn, creds));
        }
    });
    port
}

async fn handle_conn(mut conn: TcpStream, creds: Option<(&str, &str)>) {
    // greeting
    let mut head = [0u8; 2];
    if conn.read_exact(&mut head).await.is_err() || head[0] != 0x05 {
        return;
    }
    let mut methods = vec![0u8; head[1] as usize];
    if conn.read_exact(&mut methods).await.is_err() {
        return;
    }

    if let Some((user, pass)) = creds {
        if !methods.contains(&0x02) {
            let _ = conn.write_all(&[0x05, 0xff]).await;
            return;
        }
        let _ = conn.write_all(&[0x05, 0x02]).await;
        // RFC 1929 subnegotiation
        let mut ver = [0u8; 2];
        if conn.read_exact(&mut ver).await.is_err() {
            return;
        }
        let mut u = vec![0u8; ver[1] as usize];
        if conn.read_exact(&mut u).await.is_err() {
            return;
        }
        let mut plen = [0u8; 1];
        if conn.read_exact(&mut plen).await.is_err() {
            return;
        }
        let mut p = vec![0u8; plen[0] as usize];
        if conn.read_exact(&mut p).await.is_err() {
            return;
        }
        let ok = u == user.as_bytes() && p == pass.as_bytes();
        let _ = conn.write_all(&[0x01, if ok { 0x00 } else { 0x01 }]).await;
        if !ok {
            return;
        }
    } else {
        if !methods.contains(&0x00) {
            let _ = conn.write_all(&[0x05, 0xff]).await;
            return;
        }
        let _ = conn.write_all(&[0x05, 0x00]).await;
    }

    // CONNECT
    let mut req = [0u8; 4];
    if conn.read_exact(&mut req).await.is_err() || req[1] != 0x01 {
        return;
    }
    let dest_host = match req[3] {
        0x01 => {
            let mut b = [0u8; 4];
            if conn.read_exact(&mut b).await.is_err() {
                return;
            }
            format!("{}.{}.{}.{}", b[0], b[1], b[2], b[3])
        }
        0x03 => {
            let mut l = [0u8; 1];
            if conn.read_exact(&mut l).await.is_err() {
                return;
            }
            let mut d = vec![0u8; l[0] as usize];
            if conn.read_exact(&mut d).await.is_err() {
                return;
            }
            String::from_utf8_lossy(&d).into_owned()
        }
        _ => return,
    };
    let mut port_b = [0u8; 2];
    if conn.read_exact(&mut port_b).await.is_err() {
        return;
    }

    let _ = conn
        .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
        .await;

    // dest-aware payloads
    let payload: Option<Vec<u8>> = match dest_host.as_str() {
        "208.95.112.1" => Some(support::http_response(IP_API_BODY)),
        "www.gstatic.com" => Some(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec()),
        _ => None,
    };
    let Some(payload) = payload else {
        return; // close: the probe sees EOF before any response
    };

    let mut sink = [0u8; 2048];
    let _ = conn.read(&mut sink).await;
    let _ = conn.write_all(&payload).await;
}

fn socks_row(tag: &str, port: u16, auth: bool) -> Outbound {
    let mut options = json!({"server": "127.0.0.1", "server_port": port});
    if auth {
        options["username"] = json!("probe");
        options["password"] = json!("secret");
    }
    Outbound::new(tag, OutboundType::Socks, options)
}

#[tokio::test]
async fn socks5_row_is_enriched_without_proxy_engine() {
    let port = spawn_socks5_server(None).await;
    let store = Arc::new(MemoryStore::with_outbounds([socks_row("sx", port, false)]));
    // registry deliberately absent: SOCKS5 must be self-contained
    let engine = ProbeEngine::new(store.clone(), None);

    let cancel = CancellationToken::new();
    let result = engine.test_outbound_with_landing("sx", &cancel).await.unwrap();

    assert!(result.available);
    assert!(result.latency >= 0);
    assert_eq!(result.landing_ip, "203.0.113.20");
    assert_eq!(result.country, "Germany");
    assert_eq!(result.isp, "Example Hosting GmbH");
    assert!(
        result.error.is_none(),
        "a missing proxy engine must not surface for SOCKS5 rows: {:?}",
        result.error
    );
}

#[tokio::test]
async fn socks5_auth_subnegotiation() {
    let port = spawn_socks5_server(Some(("probe", "secret"))).await;
    let store = Arc::new(MemoryStore::with_outbounds([socks_row("sx", port, true)]));
    let engine = ProbeEngine::new(store, None);

    let cancel = CancellationToken::new();
    let result = engine.test_outbound_with_landing("sx", &cancel).await.unwrap();
    assert!(result.available);
    assert_eq!(result.landing_ip, "203.0.113.20");
}

#[tokio::test]
async fn socks5_wrong_credentials_fail_enrichment_only() {
    let port = spawn_socks5_server(Some(("probe", "secret"))).await;
    let mut row = socks_row("sx", port, true);
    row.options["password"] = json!("wrong");
    let store = Arc::new(MemoryStore::with_outbounds([row]));
    let engine = ProbeEngine::new(store, None);

    let cancel = CancellationToken::new();
    let result = engine.test_outbound_with_landing("sx", &cancel).await.unwrap();
    // the proxy port itself accepted the TCP handshake
    assert!(result.available);
    assert_eq!(result.landing_ip, "");
    assert_eq!(result.error.as_deref(), Some("all IP lookup services failed"));
}
